//! Single-file and batch image uploads.
//!
//! Uploads are best effort with respect to the records that reference them:
//! an object uploaded before a later step fails stays in storage, and no
//! cleanup is attempted here.

use super::{
    ClientError, ClientResult, LocalFile, ObjectTransport, ProgressFn, UPLOAD_FAILED,
    token_cache::UploadTokenCache,
};
use std::sync::{
    Arc,
    atomic::{AtomicU8, Ordering},
};
use uuid::Uuid;

/// How the destination key of an upload is derived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NamingMode {
    /// Random v4 UUID plus the original extension; never collides.
    #[default]
    Uuid,
    /// Sanitized original (or custom) name; may overwrite an existing object.
    Original,
}

#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    pub naming: NamingMode,
    pub folder: Option<String>,
    pub custom_name: Option<String>,
}

impl UploadOptions {
    pub fn in_folder(folder: impl Into<String>) -> Self {
        Self {
            folder: Some(folder.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    pub url: String,
    pub key: String,
    pub size: u64,
    pub mime_type: String,
}

/// Receives `(file index, percent)` during a batch upload.
pub type BatchProgressFn<'a> = dyn Fn(usize, u8) + Send + Sync + 'a;

fn is_cjk_ideograph(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}'
        | '\u{3400}'..='\u{4DBF}'
        | '\u{F900}'..='\u{FAFF}'
        | '\u{20000}'..='\u{2A6DF}')
}

/// Replace every character outside word characters, CJK ideographs, `.`
/// and `-` with `_`.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') || is_cjk_ideograph(c) {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Derive the destination key for `file` under `options`.
pub fn object_key(file: &LocalFile, options: &UploadOptions) -> String {
    let name = match options.naming {
        NamingMode::Uuid => format!("{}{}", Uuid::new_v4(), file.extension()),
        NamingMode::Original => {
            sanitize_file_name(options.custom_name.as_deref().unwrap_or(&file.name))
        }
    };

    match options
        .folder
        .as_deref()
        .map(|f| f.trim_matches('/'))
        .filter(|f| !f.is_empty())
    {
        Some(folder) => format!("{}/{}", folder, name),
        None => name,
    }
}

pub fn public_url(domain: &str, key: &str) -> String {
    format!("{}/{}", domain.trim_end_matches('/'), key)
}

pub struct Uploader {
    tokens: Arc<UploadTokenCache>,
    transport: Arc<dyn ObjectTransport>,
}

impl Uploader {
    pub fn new(tokens: Arc<UploadTokenCache>, transport: Arc<dyn ObjectTransport>) -> Self {
        Self { tokens, transport }
    }

    /// Upload one file and resolve its public URL.
    ///
    /// Progress is clamped to 100 and only ever reported when it increases.
    pub async fn upload(
        &self,
        file: &LocalFile,
        options: &UploadOptions,
        progress: Option<&ProgressFn<'_>>,
    ) -> ClientResult<UploadResult> {
        let key = object_key(file, options);
        let token = self.tokens.get_token().await?;

        let last = AtomicU8::new(0);
        let report = |percent: u8| {
            let percent = percent.min(100);
            if last.fetch_max(percent, Ordering::SeqCst) < percent
                && let Some(cb) = progress
            {
                cb(percent);
            }
        };

        tracing::debug!(key = %key, size = file.size(), "uploading image");
        let stored_key = self
            .transport
            .put_object(file, &key, &token.credential, &report)
            .await
            .map_err(|err| {
                tracing::warn!(key = %key, error = %err, "image upload failed");
                match err {
                    ClientError::Transfer(msg) if !msg.is_empty() => ClientError::Transfer(msg),
                    _ => ClientError::Transfer(UPLOAD_FAILED.into()),
                }
            })?;
        report(100);

        Ok(UploadResult {
            url: public_url(&token.domain, &stored_key),
            key: stored_key,
            size: file.size(),
            mime_type: file.mime_type.clone(),
        })
    }

    /// Upload files one at a time, in order, stopping at the first failure.
    ///
    /// Files uploaded before a failure are not removed.
    pub async fn upload_many(
        &self,
        files: &[LocalFile],
        options: &UploadOptions,
        on_file_progress: Option<&BatchProgressFn<'_>>,
    ) -> ClientResult<Vec<UploadResult>> {
        let mut results = Vec::with_capacity(files.len());
        for (index, file) in files.iter().enumerate() {
            let forward = |percent: u8| {
                if let Some(cb) = on_file_progress {
                    cb(index, percent);
                }
            };
            results.push(self.upload(file, options, Some(&forward as &ProgressFn<'_>)).await?);
        }
        Ok(results)
    }
}
