use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Authenticated principal as reported by the identity provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub email: String,
    pub access_token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// JWT claims for locally issued session tokens
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user id
    pub email: String,
    pub jti: String,
    pub exp: usize, // expiration time
    pub iat: usize, // issued at
}

/// User object returned by the hosted auth endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}
