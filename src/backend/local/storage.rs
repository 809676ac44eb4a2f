use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::signer::UrlSigner;
use crate::backend::ObjectStore;
use crate::error::{BackendError, BackendResult};

/// Local file system object store
pub struct LocalObjectStore {
    base_path: PathBuf,
    signer: UrlSigner,
}

impl LocalObjectStore {
    pub fn new(base_path: impl Into<PathBuf>, signing_secret: &str) -> Self {
        Self {
            base_path: base_path.into(),
            signer: UrlSigner::new(signing_secret),
        }
    }

    /// Resolve an object key under the base directory, rejecting keys that escape it
    fn get_full_path(&self, path: &str) -> BackendResult<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if path.trim().is_empty() || escapes {
            return Err(BackendError::new(format!("Invalid object path: {}", path)).with_status(400));
        }
        Ok(self.base_path.join(relative))
    }

    async fn delete_one(&self, path: &str) -> BackendResult<()> {
        let full_path = self.get_full_path(path)?;

        if !full_path.exists() {
            return Ok(());
        }

        fs::remove_file(&full_path).await?;
        tracing::debug!("Deleted object {:?}", full_path);

        // Try to remove empty parent directories
        let mut current_dir = full_path.parent().map(|p| p.to_path_buf());
        while let Some(dir) = current_dir {
            if dir == self.base_path {
                break;
            }
            match fs::read_dir(&dir).await {
                Ok(mut entries) => {
                    if entries.next_entry().await?.is_some() {
                        break; // Not empty
                    }
                    let _ = fs::remove_dir(&dir).await;
                }
                Err(_) => break,
            }
            current_dir = dir.parent().map(|p| p.to_path_buf());
        }

        Ok(())
    }
}

async fn write_all(file: &mut fs::File, data: &[u8]) -> std::io::Result<()> {
    file.write_all(data).await?;
    file.flush().await
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn upload(&self, path: &str, data: Bytes, content_type: &str) -> BackendResult<()> {
        let full_path = self.get_full_path(path)?;

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // create_new makes the existence check and the create one step
        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&full_path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(BackendError::with_code(
                    "409",
                    format!("The resource already exists: {}", path),
                )
                .with_status(409));
            }
            Err(e) => return Err(e.into()),
        };

        if let Err(e) = write_all(&mut file, &data).await {
            drop(file);
            let _ = fs::remove_file(&full_path).await;
            return Err(e.into());
        }

        tracing::debug!(
            "Saved object to {:?} ({} bytes, {})",
            full_path,
            data.len(),
            content_type
        );
        Ok(())
    }

    async fn remove(&self, paths: &[String]) -> BackendResult<()> {
        for path in paths {
            self.delete_one(path).await?;
        }
        Ok(())
    }

    async fn create_signed_url(&self, path: &str, ttl: Duration) -> BackendResult<String> {
        let full_path = self.get_full_path(path)?;
        if !full_path.exists() {
            return Err(BackendError::not_found(format!("Object not found: {}", path)));
        }

        let encoded: Vec<String> = full_path
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(urlencoding::encode(&part.to_string_lossy()).into_owned()),
                _ => None,
            })
            .collect();

        Ok(format!(
            "file:///{}?{}",
            encoded.join("/"),
            self.signer.sign(path, ttl)
        ))
    }

    async fn download(&self, path: &str) -> BackendResult<Bytes> {
        let full_path = self.get_full_path(path)?;

        let data = fs::read(&full_path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BackendError::not_found(format!("Object not found: {}", path))
            } else {
                BackendError::new(format!("Failed to read object: {}", e))
            }
        })?;

        Ok(Bytes::from(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &tempfile::TempDir) -> LocalObjectStore {
        LocalObjectStore::new(dir.path(), "secret")
    }

    #[tokio::test]
    async fn upload_download_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        store
            .upload("u1/1-a.pdf", Bytes::from_static(b"%PDF-1.4"), "application/pdf")
            .await
            .unwrap();
        assert_eq!(store.download("u1/1-a.pdf").await.unwrap().as_ref(), b"%PDF-1.4");

        store.remove(&["u1/1-a.pdf".to_string()]).await.unwrap();
        assert!(store.download("u1/1-a.pdf").await.unwrap_err().is_not_found());
        // empty owner directory is cleaned up
        assert!(!dir.path().join("u1").exists());
        // removing again is not an error
        store.remove(&["u1/1-a.pdf".to_string()]).await.unwrap();
    }

    #[tokio::test]
    async fn upload_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let data = Bytes::from_static(b"x");
        store.upload("u1/a.pdf", data.clone(), "application/pdf").await.unwrap();
        let err = store.upload("u1/a.pdf", data, "application/pdf").await.unwrap_err();
        assert_eq!(err.status, Some(409));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_uploads_to_one_key_keep_a_single_writer() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        let (first, second) = tokio::join!(
            store.upload("u1/a.pdf", Bytes::from_static(b"first"), "application/pdf"),
            store.upload("u1/a.pdf", Bytes::from_static(b"second"), "application/pdf"),
        );

        let winner: &[u8] = match (&first, &second) {
            (Ok(()), Err(e)) | (Err(e), Ok(())) if e.status == Some(409) => {
                if first.is_ok() {
                    b"first"
                } else {
                    b"second"
                }
            }
            other => panic!("expected exactly one upload to win, got {:?}", other),
        };
        assert_eq!(store.download("u1/a.pdf").await.unwrap().as_ref(), winner);
    }

    #[tokio::test]
    async fn rejects_paths_outside_base() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let err = store.download("../etc/passwd").await.unwrap_err();
        assert_eq!(err.status, Some(400));
    }

    #[tokio::test]
    async fn signed_url_points_at_object() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        store
            .upload("u1/1-my file.pdf", Bytes::from_static(b"x"), "application/pdf")
            .await
            .unwrap();

        let url = store
            .create_signed_url("u1/1-my file.pdf", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(url.starts_with("file:///"));
        assert!(url.contains("u1/1-my%20file.pdf?q-sign-time="));
        assert!(url.contains("&q-signature="));

        let missing = store
            .create_signed_url("u1/missing.pdf", Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(missing.is_not_found());
    }
}
