//! Short-lived read access to private objects, renewed while a preview is open.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::backend::ObjectStore;
use crate::config::PreviewConfig;
use crate::error::{AppError, Result};
use crate::models::{display_name, AccessGrant, GrantArtifact, PreviewMode};

/// Issues grants for one object store with a fixed TTL and renewal interval
#[derive(Clone)]
pub struct AccessUrlManager {
    storage: Arc<dyn ObjectStore>,
    ttl: Duration,
    renew_interval: Duration,
}

impl AccessUrlManager {
    pub fn new(storage: Arc<dyn ObjectStore>, ttl: Duration, renew_interval: Duration) -> Self {
        Self {
            storage,
            ttl,
            renew_interval,
        }
    }

    pub fn from_config(storage: Arc<dyn ObjectStore>, config: &PreviewConfig) -> Self {
        Self::new(storage, config.signed_url_ttl(), config.renew_interval())
    }

    /// One grant for `storage_path`: a signed URL, or the downloaded bytes
    pub async fn acquire(&self, storage_path: &str, mode: PreviewMode) -> Result<AccessGrant> {
        let issued_at = Utc::now();
        let grant = match mode {
            PreviewMode::SignedUrl => {
                let url = self.storage.create_signed_url(storage_path, self.ttl).await?;
                AccessGrant {
                    target_path: storage_path.to_string(),
                    artifact: GrantArtifact::Url(url),
                    issued_at,
                    ttl: Some(self.ttl),
                }
            }
            PreviewMode::InMemory => {
                let data = self.storage.download(storage_path).await?;
                AccessGrant {
                    target_path: storage_path.to_string(),
                    artifact: GrantArtifact::Bytes(data),
                    issued_at,
                    ttl: None,
                }
            }
        };
        tracing::debug!("Acquired {:?} grant for {}", mode, storage_path);
        Ok(grant)
    }

    /// Acquire the first grant and, for signed URLs, start renewing it.
    /// A failed first acquisition is returned as is; nothing is retried.
    pub async fn open(&self, storage_path: &str, mode: PreviewMode) -> Result<PreviewSession> {
        let grant = self.acquire(storage_path, mode).await?;
        let (tx, rx) = watch::channel(grant);
        let cancel = CancellationToken::new();

        let task = match mode {
            PreviewMode::SignedUrl => Some(self.spawn_renewal(storage_path, tx, cancel.clone())),
            PreviewMode::InMemory => None,
        };

        tracing::info!("Opened preview of {}", storage_path);
        Ok(PreviewSession {
            grants: rx,
            cancel,
            task,
        })
    }

    fn spawn_renewal(
        &self,
        storage_path: &str,
        tx: watch::Sender<AccessGrant>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let manager = self.clone();
        let path = storage_path.to_string();

        tokio::spawn(async move {
            let period = manager.renew_interval;
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        tracing::debug!("Renewal for {} cancelled", path);
                        break;
                    }
                    _ = ticker.tick() => {
                        match manager.acquire(&path, PreviewMode::SignedUrl).await {
                            Ok(grant) => {
                                if tx.send(grant).is_err() {
                                    tracing::debug!("Preview of {} gone, stopping renewal", path);
                                    break;
                                }
                            }
                            // Keep the previous grant; the next tick tries again
                            Err(e) => tracing::warn!("Failed to renew access to {}: {}", path, e),
                        }
                    }
                }
            }
        })
    }

    /// Single-shot fetch for content that is not previewed: download, hand the
    /// bytes to `sink`, drop them.
    pub async fn download_once(
        &self,
        storage_path: &str,
        file_name: &str,
        sink: &dyn DownloadSink,
    ) -> Result<PathBuf> {
        let grant = self.acquire(storage_path, PreviewMode::InMemory).await?;
        let data = match grant.artifact {
            GrantArtifact::Bytes(data) => data,
            GrantArtifact::Url(_) => {
                return Err(AppError::Internal("Expected object bytes".to_string()))
            }
        };
        let saved = sink.save(file_name, data).await?;
        tracing::info!("Downloaded {} to {}", storage_path, saved.display());
        Ok(saved)
    }
}

/// An open preview surface and the grant it is currently showing.
/// Closing or dropping it stops renewal.
pub struct PreviewSession {
    grants: watch::Receiver<AccessGrant>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PreviewSession {
    pub fn current(&self) -> AccessGrant {
        self.grants.borrow().clone()
    }

    pub fn is_renewing(&self) -> bool {
        self.task.is_some() && !self.cancel.is_cancelled()
    }

    /// Wait for the next renewed grant
    pub async fn changed(&mut self) -> Result<AccessGrant> {
        self.grants
            .changed()
            .await
            .map_err(|_| AppError::Internal("Preview is no longer renewing".to_string()))?;
        Ok(self.grants.borrow_and_update().clone())
    }

    /// Cancel renewal and wait for the task to stop
    pub async fn close(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!("Renewal task panicked: {:?}", e);
            }
        }
        tracing::debug!("Closed preview of {}", self.grants.borrow().target_path);
    }
}

impl Drop for PreviewSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Destination for a one-off download
#[async_trait]
pub trait DownloadSink: Send + Sync {
    async fn save(&self, file_name: &str, data: Bytes) -> Result<PathBuf>;
}

/// Saves downloads into a directory, named after the document
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl DownloadSink for DirectorySink {
    async fn save(&self, file_name: &str, data: Bytes) -> Result<PathBuf> {
        let name = display_name(file_name);
        if name.is_empty() || name == "." || name == ".." {
            return Err(AppError::Validation(format!("Invalid file name: {}", file_name)));
        }

        tokio::fs::create_dir_all(&self.dir).await?;
        let target = self.dir.join(name);
        tokio::fs::write(&target, &data).await?;
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use std::sync::atomic::Ordering;

    const TTL: Duration = Duration::from_secs(60);
    const RENEW: Duration = Duration::from_secs(45);

    fn manager(mem: &Arc<MemoryBackend>) -> AccessUrlManager {
        AccessUrlManager::new(mem.clone(), TTL, RENEW)
    }

    #[tokio::test]
    async fn acquire_signed_url_carries_ttl() {
        let mem = MemoryBackend::new();
        mem.put_object("u1/1-a.pdf", b"%PDF");

        let grant = manager(&mem)
            .acquire("u1/1-a.pdf", PreviewMode::SignedUrl)
            .await
            .unwrap();
        assert_eq!(grant.ttl, Some(TTL));
        assert!(grant.url().unwrap().contains("ttl=60"));
        assert_eq!(grant.target_path, "u1/1-a.pdf");
    }

    #[tokio::test]
    async fn acquire_in_memory_holds_bytes() {
        let mem = MemoryBackend::new();
        mem.put_object("u1/1-a.pdf", b"%PDF");

        let grant = manager(&mem)
            .acquire("u1/1-a.pdf", PreviewMode::InMemory)
            .await
            .unwrap();
        assert_eq!(&grant.bytes().unwrap()[..], b"%PDF");
        assert_eq!(grant.ttl, None);
        assert_eq!(mem.sign_count(), 0);
    }

    #[tokio::test]
    async fn missing_object_is_reported() {
        let mem = MemoryBackend::new();
        let err = manager(&mem)
            .open("u1/missing.pdf", PreviewMode::SignedUrl)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AppError::Backend(ref e) if e.is_not_found()));
        assert_eq!(mem.sign_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn renews_on_interval_while_open() {
        let mem = MemoryBackend::new();
        mem.put_object("u1/1-a.pdf", b"%PDF");
        let start = Instant::now();

        let mut preview = manager(&mem)
            .open("u1/1-a.pdf", PreviewMode::SignedUrl)
            .await
            .unwrap();
        assert_eq!(mem.sign_count(), 1);
        assert!(preview.current().url().unwrap().ends_with("n=1"));

        for n in 2..=4 {
            let grant = preview.changed().await.unwrap();
            assert_eq!(mem.sign_count(), n);
            assert!(grant.url().unwrap().ends_with(&format!("n={}", n)));
        }
        assert!(start.elapsed() >= RENEW * 3 && start.elapsed() < RENEW * 4);

        preview.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn close_stops_renewal() {
        let mem = MemoryBackend::new();
        mem.put_object("u1/1-a.pdf", b"%PDF");

        let mut preview = manager(&mem)
            .open("u1/1-a.pdf", PreviewMode::SignedUrl)
            .await
            .unwrap();
        preview.changed().await.unwrap();
        assert_eq!(mem.sign_count(), 2);

        preview.close().await;
        tokio::time::advance(RENEW * 10).await;
        tokio::task::yield_now().await;
        assert_eq!(mem.sign_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn drop_stops_renewal() {
        let mem = MemoryBackend::new();
        mem.put_object("u1/1-a.pdf", b"%PDF");

        let preview = manager(&mem)
            .open("u1/1-a.pdf", PreviewMode::SignedUrl)
            .await
            .unwrap();
        assert!(preview.is_renewing());
        drop(preview);

        tokio::time::sleep(RENEW * 10).await;
        assert_eq!(mem.sign_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_renewal_keeps_previous_grant() {
        let mem = MemoryBackend::new();
        mem.put_object("u1/1-a.pdf", b"%PDF");

        let mut preview = manager(&mem)
            .open("u1/1-a.pdf", PreviewMode::SignedUrl)
            .await
            .unwrap();
        let first = preview.current();

        mem.fail_sign.store(true, Ordering::SeqCst);
        tokio::time::sleep(RENEW + Duration::from_secs(1)).await;
        assert_eq!(mem.sign_count(), 2);
        assert_eq!(preview.current(), first);

        mem.fail_sign.store(false, Ordering::SeqCst);
        let renewed = preview.changed().await.unwrap();
        assert_eq!(mem.sign_count(), 3);
        assert_ne!(renewed, first);

        preview.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn in_memory_preview_does_not_renew() {
        let mem = MemoryBackend::new();
        mem.put_object("u1/1-a.pdf", b"%PDF");

        let preview = manager(&mem)
            .open("u1/1-a.pdf", PreviewMode::InMemory)
            .await
            .unwrap();
        assert!(!preview.is_renewing());

        tokio::time::sleep(RENEW * 4).await;
        assert_eq!(mem.download_calls.load(Ordering::SeqCst), 1);
        assert_eq!(mem.sign_count(), 0);
        preview.close().await;
    }

    #[tokio::test]
    async fn download_once_saves_file() {
        let mem = MemoryBackend::new();
        mem.put_object("u1/1-notes.txt", b"hello");
        let dir = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(dir.path().join("downloads"));

        let saved = manager(&mem)
            .download_once("u1/1-notes.txt", "notes.txt", &sink)
            .await
            .unwrap();
        assert_eq!(saved, dir.path().join("downloads").join("notes.txt"));
        assert_eq!(tokio::fs::read(&saved).await.unwrap(), b"hello");
        assert_eq!(mem.sign_count(), 0);
    }
}
