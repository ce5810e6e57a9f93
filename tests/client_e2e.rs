//! Drives the client controllers against a real listening server.

mod common;

use std::{io::Cursor, sync::Arc};
use tokio::net::TcpListener;
use walnut_gallery::{
    client::{
        ItemSource, ItemStore, LocalFile, TokenIssuer,
        api::{GalleryApi, HttpObjectTransport},
        form::UploadForm,
        gallery::{GalleryController, LoadOutcome},
        token_cache::UploadTokenCache,
        uploader::Uploader,
    },
    create_app,
    services::item_service::SortOrder,
};

struct Running {
    base_url: String,
    // dropped at the end of the test
    _storage: tempfile::TempDir,
}

async fn serve() -> Running {
    let storage = tempfile::TempDir::new().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let base_url = format!("http://{}", addr);

    let mut config = common::test_config(&storage, Some("e2e-secret"));
    config.upload.public_domain = Some(format!("{}/files", base_url));
    let state = common::build_state(&config).await;

    tokio::spawn(async move {
        axum::serve(listener, create_app(state)).await.unwrap();
    });

    Running {
        base_url,
        _storage: storage,
    }
}

fn png(name: &str, width: u32, height: u32) -> LocalFile {
    let mut bytes = Vec::new();
    image::RgbImage::new(width, height)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    LocalFile::new(name, "image/png", bytes)
}

#[tokio::test]
async fn form_submission_shows_up_in_gallery() {
    let server = serve().await;
    let api = Arc::new(GalleryApi::new(&server.base_url).unwrap());
    api.login(common::ADMIN_PASSWORD).await.unwrap();

    let tokens = Arc::new(UploadTokenCache::new(api.clone() as Arc<dyn TokenIssuer>));
    let transport = Arc::new(HttpObjectTransport::new(&server.base_url).unwrap());
    let uploader = Arc::new(Uploader::new(tokens, transport));

    let form = UploadForm::new(uploader.clone(), api.clone() as Arc<dyn ItemStore>);
    form.update_fields(|f| {
        f.title = "Official hat pair".into();
        f.variety = "official-hat".into();
        f.weight = "30".into();
    })
    .unwrap();
    form.select_cover(png("cover.png", 40, 30)).await.unwrap();
    form.add_details(vec![png("d1.png", 10, 20)]).await.unwrap();

    let saved = form.submit().await.unwrap();
    assert_eq!(saved.cover_image.width, 40);
    assert_eq!(saved.cover_image.height, 30);
    assert!(
        saved
            .cover_image
            .url
            .starts_with(&format!("{}/files/walnuts/covers/", server.base_url))
    );

    let cover = reqwest::get(&saved.cover_image.url).await.unwrap();
    assert!(cover.status().is_success());
    assert_eq!(
        cover.headers()["content-type"].to_str().unwrap(),
        "image/png"
    );

    let gallery = GalleryController::new(api.clone() as Arc<dyn ItemSource>);
    assert_eq!(gallery.start().await, LoadOutcome::Loaded(1));
    let snap = gallery.snapshot();
    assert!(!snap.has_more);
    assert_eq!(snap.items[0].id, saved.id);

    let liked = api.like_item(&saved.id, 2).await.unwrap();
    assert_eq!(liked.likes, 2);
    gallery.set_sort(SortOrder::Likes).await;
    assert_eq!(gallery.snapshot().items[0].likes, 2);

    gallery.set_category("lion-head");
    assert!(gallery.visible_items().is_empty());

    api.delete_item(&saved.id).await.unwrap();
    assert!(gallery.remove(&saved.id));
    assert!(api.get_item(&saved.id).await.is_err());
}

#[tokio::test]
async fn credential_errors_surface_server_message() {
    let server = serve().await;
    let api = Arc::new(GalleryApi::new(&server.base_url).unwrap());

    let tokens = UploadTokenCache::new(api.clone() as Arc<dyn TokenIssuer>);
    let err = tokens.get_token().await.unwrap_err();
    assert_eq!(err.to_string(), "admin session required");

    let categories = api.categories().await.unwrap();
    assert_eq!(categories[0].id, "all");
}
