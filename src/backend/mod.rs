pub mod local;
pub mod rest;
pub mod token_store;

#[cfg(test)]
pub mod memory;

pub use local::{LocalBackend, LocalIdentity};
pub use rest::RestBackend;
pub use token_store::TokenStore;

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{BackendKind, Config};
use crate::error::BackendResult;
use crate::models::{DocumentRecord, NewDocument, NewsletterEntry, Session, WaitlistEntry};

/// Identity provider: who is signed in right now
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Current session, or `None` when nobody is signed in or the token is no longer valid
    async fn get_session(&self) -> BackendResult<Option<Session>>;

    /// Forget the current session
    async fn sign_out(&self) -> BackendResult<()>;
}

/// The `documents` metadata table
#[async_trait]
pub trait DocumentTable: Send + Sync {
    /// Rows owned by `owner_id`, newest `created_at` first
    async fn select_by_owner(
        &self,
        owner_id: &str,
        limit: Option<usize>,
    ) -> BackendResult<Vec<DocumentRecord>>;

    /// Insert a row; the store assigns `id` and `created_at`
    async fn insert(&self, doc: NewDocument) -> BackendResult<DocumentRecord>;

    /// Delete one row owned by `owner_id`
    async fn delete(&self, owner_id: &str, id: &str) -> BackendResult<()>;
}

/// Private object storage for document bytes
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write an object; fails if the path is already taken
    async fn upload(&self, path: &str, data: Bytes, content_type: &str) -> BackendResult<()>;

    /// Remove objects; missing paths are not an error
    async fn remove(&self, paths: &[String]) -> BackendResult<()>;

    /// Short-lived URL granting read access to one object
    async fn create_signed_url(&self, path: &str, ttl: Duration) -> BackendResult<String>;

    /// Full object bytes
    async fn download(&self, path: &str) -> BackendResult<Bytes>;
}

/// Mailing list tables (`presignup`, `newsletter`), unique by email
#[async_trait]
pub trait SignupTable: Send + Sync {
    async fn insert_waitlist(&self, entry: &WaitlistEntry) -> BackendResult<()>;

    async fn insert_newsletter(&self, entry: &NewsletterEntry) -> BackendResult<()>;
}

/// Handles to every backend collaborator, passed explicitly to services
#[derive(Clone)]
pub struct Backend {
    pub auth: Arc<dyn IdentityProvider>,
    pub documents: Arc<dyn DocumentTable>,
    pub storage: Arc<dyn ObjectStore>,
    pub signups: Arc<dyn SignupTable>,
}

impl Backend {
    /// Build the backend selected by configuration
    pub async fn connect(config: &Config) -> anyhow::Result<Self> {
        match config.backend.kind {
            BackendKind::Local => {
                let local = LocalBackend::open(config).await?;
                tracing::info!("Using local backend at {}", config.database.path);
                Ok(local.into_backend())
            }
            BackendKind::Rest => {
                let rest = RestBackend::new(config)?;
                tracing::info!("Using hosted backend at {}", config.backend.url);
                Ok(rest.into_backend())
            }
        }
    }
}
