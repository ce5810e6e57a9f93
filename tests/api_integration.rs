mod common;

use axum::http::StatusCode;
use axum_test::multipart::{MultipartForm, Part};
use common::{admin_token, create_item, item_body, spawn_app, spawn_app_with};
use serde_json::{Value, json};

#[tokio::test]
async fn health_checks_report_ok() {
    let app = spawn_app().await;

    app.server.get("/healthz").await.assert_status_ok();

    let ready = app.server.get("/readyz").await;
    ready.assert_status_ok();
    let body = ready.json::<Value>();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["bucket"], "walnut-images");
}

#[tokio::test]
async fn categories_are_served_statically() {
    let app = spawn_app().await;
    let body = app.server.get("/categories").await.json::<Value>();

    let ids: Vec<_> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids.first().map(String::as_str), Some("all"));
    assert!(ids.iter().any(|id| id == "lion-head"));
    assert_eq!(body["pageSize"], 12);
}

#[tokio::test]
async fn item_crud_round_trip() {
    let app = spawn_app().await;
    let token = admin_token(&app.server).await;

    let created = create_item(&app.server, &token, "Lion head pair", "lion-head").await;
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["likes"], 0);
    assert_eq!(created["ownerName"], "老王");
    assert!(created.get("detailImages").is_none());

    let fetched = app.server.get(&format!("/items/{}", id)).await;
    fetched.assert_status_ok();
    assert_eq!(fetched.json::<Value>()["data"]["title"], "Lion head pair");

    let mut update = item_body("Renamed pair", "tiger-head");
    update["detailImages"] = json!([{ "url": "https://cdn.test/d/1.jpg", "width": 10, "height": 20 }]);
    let updated = app
        .server
        .put(&format!("/items/{}", id))
        .add_header("Authorization", format!("Bearer {}", token))
        .json(&update)
        .await;
    updated.assert_status_ok();
    let updated = updated.json::<Value>()["data"].clone();
    assert_eq!(updated["title"], "Renamed pair");
    assert_eq!(updated["variety"], "tiger-head");
    assert_eq!(updated["detailImages"].as_array().unwrap().len(), 1);
    assert_eq!(updated["createdAt"], created["createdAt"]);

    let deleted = app
        .server
        .delete(&format!("/items/{}", id))
        .add_header("Authorization", format!("Bearer {}", token))
        .await;
    deleted.assert_status_ok();
    assert_eq!(deleted.json::<Value>()["success"], true);

    app.server
        .get(&format!("/items/{}", id))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_ids_are_not_found() {
    let app = spawn_app().await;
    let token = admin_token(&app.server).await;

    app.server
        .get("/items/missing")
        .await
        .assert_status(StatusCode::NOT_FOUND);
    app.server
        .put("/items/missing")
        .add_header("Authorization", format!("Bearer {}", token))
        .json(&item_body("x", "other"))
        .await
        .assert_status(StatusCode::NOT_FOUND);
    app.server
        .patch("/items/missing")
        .json(&json!({ "likesIncrement": 1 }))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn mutations_require_admin_session() {
    let app = spawn_app().await;

    app.server
        .post("/items")
        .json(&item_body("x", "other"))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
    app.server
        .post("/items")
        .add_header("Authorization", "Bearer not-a-token")
        .json(&item_body("x", "other"))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
    app.server
        .post("/admin/session")
        .json(&json!({ "password": "wrong" }))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
    app.server
        .get("/upload-token")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn invalid_payload_is_rejected() {
    let app = spawn_app().await;
    let token = admin_token(&app.server).await;

    let response = app
        .server
        .post("/items")
        .add_header("Authorization", format!("Bearer {}", token))
        .json(&item_body("   ", "other"))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["error"], "title is required");
}

#[tokio::test]
async fn likes_patch_validates_and_clamps() {
    let app = spawn_app().await;
    let token = admin_token(&app.server).await;
    let id = create_item(&app.server, &token, "pair", "other").await["id"]
        .as_str()
        .unwrap()
        .to_string();
    let path = format!("/items/{}", id);

    for body in [json!({}), json!({ "likesIncrement": "one" }), json!({ "likesIncrement": 0 })] {
        app.server
            .patch(&path)
            .json(&body)
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    let liked = app.server.patch(&path).json(&json!({ "likesIncrement": 3 })).await;
    liked.assert_status_ok();
    assert_eq!(liked.json::<Value>()["data"]["likes"], 3);

    let unliked = app.server.patch(&path).json(&json!({ "likesIncrement": -10 })).await;
    assert_eq!(unliked.json::<Value>()["data"]["likes"], 0);
}

#[tokio::test]
async fn list_pages_by_likes() {
    let app = spawn_app().await;
    let token = admin_token(&app.server).await;

    for i in 0..30i64 {
        let variety = if i % 2 == 0 { "lion-head" } else { "other" };
        let id = create_item(&app.server, &token, &format!("walnut {}", i), variety).await["id"]
            .as_str()
            .unwrap()
            .to_string();
        if i > 0 {
            app.server
                .patch(&format!("/items/{}", id))
                .json(&json!({ "likesIncrement": i }))
                .await
                .assert_status_ok();
        }
    }

    let page = |skip: usize| {
        app.server
            .get("/items")
            .add_query_param("limit", 12)
            .add_query_param("skip", skip)
            .add_query_param("sort", "likes")
    };

    let first = page(0).await.json::<Value>();
    assert_eq!(first["total"], 30);
    let likes: Vec<i64> = first["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["likes"].as_i64().unwrap())
        .collect();
    assert_eq!(likes, (18..30).rev().collect::<Vec<_>>());

    let third = page(24).await.json::<Value>();
    assert_eq!(third["data"].as_array().unwrap().len(), 6);
    assert_eq!(third["data"][5]["likes"], 0);

    let lion = app
        .server
        .get("/items")
        .add_query_param("variety", "lion-head")
        .await
        .json::<Value>();
    assert_eq!(lion["total"], 15);
    assert!(
        lion["data"]
            .as_array()
            .unwrap()
            .iter()
            .all(|item| item["variety"] == "lion-head")
    );

    app.server
        .get("/items")
        .add_query_param("sort", "random")
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn equal_likes_list_newest_first() {
    let app = spawn_app().await;
    let token = admin_token(&app.server).await;

    let mut ids = Vec::new();
    for (title, likes) in [("a", 2), ("b", 0), ("c", 2), ("d", 0), ("e", 0)] {
        let id = create_item(&app.server, &token, title, "other").await["id"]
            .as_str()
            .unwrap()
            .to_string();
        if likes > 0 {
            app.server
                .patch(&format!("/items/{}", id))
                .json(&json!({ "likesIncrement": likes }))
                .await
                .assert_status_ok();
        }
        ids.push(id);
        // keep creation timestamps strictly increasing
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    let body = app
        .server
        .get("/items")
        .add_query_param("sort", "likes")
        .await
        .json::<Value>();
    let titles: Vec<_> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["title"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(titles, ["c", "a", "e", "d", "b"]);
}

#[tokio::test]
async fn upload_token_requires_configured_storage() {
    let app = spawn_app_with(None).await;
    let token = admin_token(&app.server).await;

    let response = app
        .server
        .get("/upload-token")
        .add_header("Authorization", format!("Bearer {}", token))
        .await;
    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        response.json::<Value>()["error"],
        "upload storage is not configured"
    );
}

#[tokio::test]
async fn uploaded_object_is_served_back() {
    let app = spawn_app().await;
    let admin = admin_token(&app.server).await;

    let grant = app
        .server
        .get("/upload-token")
        .add_header("Authorization", format!("Bearer {}", admin))
        .await
        .json::<Value>();
    assert_eq!(grant["domain"], "https://cdn.test");
    assert_eq!(grant["bucket"], "walnut-images");
    assert_eq!(grant["expires"], 3600);
    let credential = grant["token"].as_str().unwrap().to_string();

    let bytes = b"not really a png".to_vec();
    let form = MultipartForm::new()
        .add_text("token", credential)
        .add_text("key", "walnuts/covers/pair.png")
        .add_part(
            "file",
            Part::bytes(bytes.clone())
                .file_name("pair.png")
                .mime_type("image/png"),
        );
    let uploaded = app.server.post("/upload").multipart(form).await;
    uploaded.assert_status_ok();
    let body = uploaded.json::<Value>();
    assert_eq!(body["key"], "walnuts/covers/pair.png");
    assert_eq!(body["size"], bytes.len());
    assert_eq!(body["mimeType"], "image/png");

    let served = app.server.get("/files/walnuts/covers/pair.png").await;
    served.assert_status_ok();
    assert_eq!(served.as_bytes().as_ref(), bytes.as_slice());
    assert_eq!(served.header("content-type"), "image/png");

    app.server
        .get("/files/walnuts/covers/other.png")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn upload_with_bad_credential_is_rejected() {
    let app = spawn_app().await;

    let form = MultipartForm::new()
        .add_text("token", "test-access:forged:e30")
        .add_text("key", "walnuts/covers/pair.png")
        .add_part("file", Part::bytes(vec![1, 2, 3]).file_name("pair.png"));
    app.server
        .post("/upload")
        .multipart(form)
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    app.server
        .get("/files/walnuts/covers/pair.png")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}
