//! Self-hosted backend: SQLite tables, filesystem objects, locally issued sessions

pub mod db;
pub mod identity;
pub mod signer;
pub mod storage;
pub mod table;

pub use db::Database;
pub use identity::LocalIdentity;
pub use storage::LocalObjectStore;
pub use table::{SqliteDocumentTable, SqliteSignupTable};

use std::path::Path;
use std::sync::Arc;

use super::{Backend, TokenStore};
use crate::config::Config;

pub struct LocalBackend {
    pub identity: Arc<LocalIdentity>,
    pub documents: Arc<SqliteDocumentTable>,
    pub storage: Arc<LocalObjectStore>,
    pub signups: Arc<SqliteSignupTable>,
}

impl LocalBackend {
    pub async fn open(config: &Config) -> anyhow::Result<Self> {
        let db = Database::new(&config.database.path).await?;
        db.run_migrations().await?;

        tokio::fs::create_dir_all(&config.storage.local_path).await?;
        let base_path = tokio::fs::canonicalize(Path::new(&config.storage.local_path)).await?;

        let identity = LocalIdentity::new(
            TokenStore::new(&config.session.token_path),
            config.session.jwt_secret.clone(),
            config.session.token_ttl_hours,
        );

        Ok(Self {
            identity: Arc::new(identity),
            documents: Arc::new(SqliteDocumentTable::new(db.clone())),
            storage: Arc::new(LocalObjectStore::new(base_path, &config.session.jwt_secret)),
            signups: Arc::new(SqliteSignupTable::new(db)),
        })
    }

    pub fn into_backend(self) -> Backend {
        Backend {
            auth: self.identity,
            documents: self.documents,
            storage: self.storage,
            signups: self.signups,
        }
    }
}
