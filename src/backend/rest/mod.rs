//! Hosted backend-as-a-service reached over HTTP

pub mod client;
pub mod identity;
pub mod storage;
pub mod table;

pub use client::RestClient;
pub use identity::RestIdentity;
pub use storage::RestObjectStore;
pub use table::{RestDocumentTable, RestSignupTable};

use std::sync::Arc;

use super::{Backend, TokenStore};
use crate::config::Config;

pub struct RestBackend {
    client: Arc<RestClient>,
    bucket: String,
}

impl RestBackend {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        if config.backend.url.trim().is_empty() {
            anyhow::bail!("backend.url is required for the rest backend");
        }
        let client = RestClient::new(
            &config.backend.url,
            &config.backend.anon_key,
            TokenStore::new(&config.session.token_path),
        );
        Ok(Self {
            client: Arc::new(client),
            bucket: config.backend.bucket.clone(),
        })
    }

    pub fn into_backend(self) -> Backend {
        Backend {
            auth: Arc::new(RestIdentity::new(self.client.clone())),
            documents: Arc::new(RestDocumentTable::new(self.client.clone())),
            storage: Arc::new(RestObjectStore::new(self.client.clone(), &self.bucket)),
            signups: Arc::new(RestSignupTable::new(self.client)),
        }
    }
}
