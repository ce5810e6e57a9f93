use anyhow::{Context, Result};
use clap::Parser;
use std::{env, str::FromStr};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    pub upload: UploadConfig,
    pub admin: AdminConfig,
}

/// Settings for the object bucket and the credentials handed to uploaders.
#[derive(Clone)]
pub struct UploadConfig {
    pub bucket: String,
    /// Base URL objects are served from. Defaults to this server's `/files`.
    pub public_domain: Option<String>,
    pub access_key: String,
    /// Signing key for upload credentials. Uploads are disabled without it.
    pub secret_key: Option<String>,
    pub token_ttl_secs: i64,
}

/// Settings for the admin capability check.
#[derive(Clone)]
pub struct AdminConfig {
    /// Password exchanged for a session. Admin endpoints are closed without it.
    pub password: Option<String>,
    pub session_secret: String,
    pub session_ttl_secs: i64,
}

// Secrets stay out of the startup log line.
impl std::fmt::Debug for UploadConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadConfig")
            .field("bucket", &self.bucket)
            .field("public_domain", &self.public_domain)
            .field("access_key", &self.access_key)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<set>"))
            .field("token_ttl_secs", &self.token_ttl_secs)
            .finish()
    }
}

impl std::fmt::Debug for AdminConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminConfig")
            .field("password", &self.password.as_ref().map(|_| "<set>"))
            .field("session_ttl_secs", &self.session_ttl_secs)
            .finish_non_exhaustive()
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Walnut collection gallery API")]
pub struct Args {
    /// Host to bind to (overrides WALNUT_GALLERY_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides WALNUT_GALLERY_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where uploaded images are stored (overrides WALNUT_GALLERY_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides WALNUT_GALLERY_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Bucket name for uploaded images (overrides WALNUT_GALLERY_BUCKET)
    #[arg(long)]
    pub bucket: Option<String>,

    /// Public base URL of the image delivery domain (overrides WALNUT_GALLERY_PUBLIC_DOMAIN)
    #[arg(long)]
    pub public_domain: Option<String>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        // Parse CLI once
        let args = Args::parse();

        // --- Environment fallback ---
        let env_host = env::var("WALNUT_GALLERY_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = env_parse("WALNUT_GALLERY_PORT", 3000u16)?;
        let env_storage =
            env::var("WALNUT_GALLERY_STORAGE_DIR").unwrap_or_else(|_| "./data/objects".into());
        let env_db = env::var("WALNUT_GALLERY_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/walnut_gallery.db".into());
        let env_bucket =
            env::var("WALNUT_GALLERY_BUCKET").unwrap_or_else(|_| "walnut-images".into());

        let upload = UploadConfig {
            bucket: args.bucket.unwrap_or(env_bucket),
            public_domain: args
                .public_domain
                .or_else(|| env_non_empty("WALNUT_GALLERY_PUBLIC_DOMAIN")),
            access_key: env::var("WALNUT_GALLERY_ACCESS_KEY")
                .unwrap_or_else(|_| "walnut-gallery".into()),
            secret_key: env_non_empty("WALNUT_GALLERY_SECRET_KEY"),
            token_ttl_secs: env_parse("WALNUT_GALLERY_TOKEN_TTL_SECS", 3600i64)?,
        };

        let admin = AdminConfig {
            password: env_non_empty("WALNUT_GALLERY_ADMIN_PASSWORD"),
            session_secret: env_non_empty("WALNUT_GALLERY_ADMIN_SECRET")
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            session_ttl_secs: env_parse("WALNUT_GALLERY_ADMIN_SESSION_TTL_SECS", 86_400i64)?,
        };

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            upload,
            admin,
        };

        Ok((cfg, args.migrate))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Base URL uploaded objects are reachable under.
    pub fn delivery_domain(&self) -> String {
        match &self.upload.public_domain {
            Some(domain) => domain.trim_end_matches('/').to_string(),
            None => format!("http://{}/files", self.addr()),
        }
    }
}

fn env_non_empty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(public_domain: Option<&str>) -> AppConfig {
        AppConfig {
            host: "127.0.0.1".into(),
            port: 8080,
            storage_dir: "./data".into(),
            database_url: "sqlite::memory:".into(),
            upload: UploadConfig {
                bucket: "walnut-images".into(),
                public_domain: public_domain.map(String::from),
                access_key: "ak".into(),
                secret_key: Some("very-secret".into()),
                token_ttl_secs: 3600,
            },
            admin: AdminConfig {
                password: Some("hunter2".into()),
                session_secret: "s".into(),
                session_ttl_secs: 60,
            },
        }
    }

    #[test]
    fn delivery_domain_defaults_to_local_files_route() {
        assert_eq!(config(None).delivery_domain(), "http://127.0.0.1:8080/files");
        assert_eq!(
            config(Some("https://cdn.example.com/")).delivery_domain(),
            "https://cdn.example.com"
        );
    }

    #[test]
    fn debug_output_hides_secrets() {
        let rendered = format!("{:?}", config(None));
        assert!(!rendered.contains("very-secret"));
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("walnut-images"));
    }
}
