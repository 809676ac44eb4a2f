use async_trait::async_trait;
use reqwest::Method;
use std::sync::Arc;

use super::client::RestClient;
use crate::backend::IdentityProvider;
use crate::error::BackendResult;
use crate::models::{AuthUser, Session};

/// Session lookup against the hosted auth service
pub struct RestIdentity {
    client: Arc<RestClient>,
}

impl RestIdentity {
    pub fn new(client: Arc<RestClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl IdentityProvider for RestIdentity {
    async fn get_session(&self) -> BackendResult<Option<Session>> {
        let Some(token) = self.client.tokens().load().await? else {
            return Ok(None);
        };

        let req = self.client.request(Method::GET, "auth/v1/user").await?;
        let user: AuthUser = match self.client.send(req).await {
            Ok(resp) => resp.json().await?,
            Err(e) if matches!(e.status, Some(401) | Some(403)) => {
                tracing::warn!("Stored session rejected by auth service: {}", e);
                // later requests fall back to the anon key
                self.client.tokens().clear().await?;
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        Ok(Some(Session {
            user_id: user.id,
            email: user.email.unwrap_or_default(),
            access_token: token,
            expires_at: None,
        }))
    }

    async fn sign_out(&self) -> BackendResult<()> {
        if self.client.tokens().load().await?.is_some() {
            let req = self.client.request(Method::POST, "auth/v1/logout").await?;
            if let Err(e) = self.client.send(req).await {
                // token is dropped locally either way
                tracing::warn!("Remote logout failed: {}", e);
            }
        }
        self.client.tokens().clear().await?;
        tracing::info!("Signed out");
        Ok(())
    }
}
