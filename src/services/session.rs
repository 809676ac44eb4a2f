use std::sync::Arc;

use crate::backend::IdentityProvider;
use crate::error::{AppError, Result};
use crate::models::Session;

/// Checks for a signed-in user before any document operation
#[derive(Clone)]
pub struct SessionGate {
    auth: Arc<dyn IdentityProvider>,
    login_url: String,
}

impl SessionGate {
    pub fn new(auth: Arc<dyn IdentityProvider>, login_url: impl Into<String>) -> Self {
        Self {
            auth,
            login_url: login_url.into(),
        }
    }

    pub fn login_url(&self) -> &str {
        &self.login_url
    }

    /// Current session, or `AuthRequired` pointing at the login boundary.
    /// A missing session is final for this call; nothing is retried.
    pub async fn require_session(&self) -> Result<Session> {
        match self.auth.get_session().await? {
            Some(session) => {
                tracing::debug!("Session found for user {}", session.user_id);
                Ok(session)
            }
            None => {
                tracing::info!("No active session, redirecting to {}", self.login_url);
                Err(AppError::AuthRequired {
                    redirect_to: self.login_url.clone(),
                })
            }
        }
    }

    pub async fn sign_out(&self) -> Result<()> {
        self.auth.sign_out().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;

    #[tokio::test]
    async fn signed_in_user_passes() {
        let mem = MemoryBackend::signed_in("user-1");
        let gate = SessionGate::new(mem.clone(), "/auth/login");
        assert_eq!(gate.require_session().await.unwrap().user_id, "user-1");
    }

    #[tokio::test]
    async fn missing_session_redirects() {
        let mem = MemoryBackend::new();
        let gate = SessionGate::new(mem.clone(), "/auth/login");
        match gate.require_session().await {
            Err(AppError::AuthRequired { redirect_to }) => assert_eq!(redirect_to, "/auth/login"),
            other => panic!("expected redirect, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn sign_out_ends_session() {
        let mem = MemoryBackend::signed_in("user-1");
        let gate = SessionGate::new(mem.clone(), "/auth/login");
        gate.sign_out().await.unwrap();
        assert!(gate.require_session().await.is_err());
    }
}
