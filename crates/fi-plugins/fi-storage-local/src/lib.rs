//! # fi-storage-local
//!
//! Local filesystem implementation of `ImageStore`.
//! Features: timestamp-prefixed flat naming, format whitelisting, and
//! idempotent deletion.

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use fi_core::config::has_allowed_extension;
use fi_core::error::FileDeleteFailure;
use fi_core::traits::ImageStore;
use image::ImageFormat;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

pub struct LocalImageStore {
    /// Root directory for all uploads (e.g., "./data/uploads")
    root_path: PathBuf,
    /// Public URL prefix (e.g., "/static/uploads")
    url_prefix: String,
}

impl LocalImageStore {
    pub fn new(root: PathBuf, url_prefix: String) -> Self {
        Self {
            root_path: root,
            url_prefix: url_prefix.trim_end_matches('/').to_string(),
        }
    }

    /// Creates the upload directory if it does not exist yet.
    pub async fn ensure_root(&self) -> anyhow::Result<()> {
        fs::create_dir_all(&self.root_path).await?;
        Ok(())
    }

    fn path_for(&self, filename: &str) -> PathBuf {
        self.root_path.join(filename)
    }
}

/// Reduces a client-supplied name to `[A-Za-z0-9._-]`, dropping any
/// directory part, so it can never escape the upload root.
pub fn sanitize_filename(original: &str) -> String {
    let base = original
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

#[async_trait]
impl ImageStore for LocalImageStore {
    /// Both the extension and the sniffed content must be png, jpeg or webp.
    fn accepts(&self, original_name: &str, data: &[u8]) -> bool {
        has_allowed_extension(original_name)
            && matches!(
                image::guess_format(data),
                Ok(ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::WebP)
            )
    }

    /// Saves an upload as `<YYYYmmddHHMMSSffffff>_<sanitized name>`.
    /// Never overwrites: a clash gets a random suffix.
    async fn save_image(&self, original_name: &str, data: Vec<u8>) -> anyhow::Result<String> {
        fs::create_dir_all(&self.root_path).await?;

        let stamp = Utc::now().format("%Y%m%d%H%M%S%6f");
        let clean = sanitize_filename(original_name);
        let mut filename = format!("{stamp}_{clean}");

        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.path_for(&filename))
            .await
        {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                filename = format!("{stamp}_{}_{clean}", Uuid::new_v4().simple());
                fs::OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .open(self.path_for(&filename))
                    .await?
            }
            Err(e) => return Err(e.into()),
        };

        file.write_all(&data).await?;
        file.flush().await?;
        log::debug!("stored upload {} ({} bytes)", filename, data.len());
        Ok(filename)
    }

    async fn delete_image(&self, filename: &str) -> Result<(), FileDeleteFailure> {
        match fs::remove_file(self.path_for(&sanitize_filename(filename))).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(FileDeleteFailure {
                filename: filename.to_string(),
                source,
            }),
        }
    }

    fn url_for(&self, filename: &str) -> String {
        format!("{}/{}", self.url_prefix, filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    fn store(dir: &tempfile::TempDir) -> LocalImageStore {
        LocalImageStore::new(dir.path().to_path_buf(), "/static/uploads/".into())
    }

    #[test]
    fn test_sanitize_strips_paths_and_odd_chars() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\Users\\me\\my photo.png"), "my_photo.png");
        assert_eq!(sanitize_filename(".hidden.jpg"), "hidden.jpg");
        assert_eq!(sanitize_filename(""), "upload");
    }

    #[test]
    fn test_accepts_requires_extension_and_content() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        assert!(store.accepts("wallet.PNG", PNG_MAGIC));
        assert!(!store.accepts("wallet.gif", PNG_MAGIC));
        assert!(!store.accepts("wallet.png", b"GIF89a not really"));
    }

    #[tokio::test]
    async fn test_save_then_delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        let name = store.save_image("my keys.png", PNG_MAGIC.to_vec()).await.unwrap();
        assert!(name.ends_with("_my_keys.png"));
        assert_eq!(name.find('_'), Some(20));
        assert!(dir.path().join(&name).exists());
        assert_eq!(store.url_for(&name), format!("/static/uploads/{name}"));

        store.delete_image(&name).await.unwrap();
        assert!(!dir.path().join(&name).exists());
        // Second delete finds nothing and still succeeds
        store.delete_image(&name).await.unwrap();
    }

    #[tokio::test]
    async fn test_same_name_twice_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        let a = store.save_image("x.png", PNG_MAGIC.to_vec()).await.unwrap();
        let b = store.save_image("x.png", PNG_MAGIC.to_vec()).await.unwrap();
        assert_ne!(a, b);
        assert!(dir.path().join(&a).exists());
        assert!(dir.path().join(&b).exists());
    }
}
