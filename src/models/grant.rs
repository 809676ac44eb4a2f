use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

/// How a preview surface consumes a private object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreviewMode {
    /// Viewer streams from a short-lived signed URL that must be renewed
    SignedUrl,
    /// Whole object is downloaded and held locally; nothing expires
    InMemory,
}

/// The access artifact carried by a grant
#[derive(Debug, Clone, PartialEq)]
pub enum GrantArtifact {
    Url(String),
    Bytes(Bytes),
}

/// Ephemeral read access to one stored object
#[derive(Debug, Clone, PartialEq)]
pub struct AccessGrant {
    pub target_path: String,
    pub artifact: GrantArtifact,
    pub issued_at: DateTime<Utc>,
    pub ttl: Option<Duration>,
}

impl AccessGrant {
    pub fn url(&self) -> Option<&str> {
        match &self.artifact {
            GrantArtifact::Url(url) => Some(url),
            GrantArtifact::Bytes(_) => None,
        }
    }

    pub fn bytes(&self) -> Option<&Bytes> {
        match &self.artifact {
            GrantArtifact::Bytes(data) => Some(data),
            GrantArtifact::Url(_) => None,
        }
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let ttl = chrono::Duration::from_std(self.ttl?).ok()?;
        Some(self.issued_at + ttl)
    }

}
