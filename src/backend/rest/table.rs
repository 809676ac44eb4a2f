use async_trait::async_trait;
use reqwest::Method;
use std::sync::Arc;

use super::client::RestClient;
use crate::backend::{DocumentTable, SignupTable};
use crate::error::{BackendError, BackendResult};
use crate::models::{DocumentRecord, NewDocument, NewsletterEntry, WaitlistEntry};

/// Query string for an owner's documents, newest first
fn owner_query(owner_id: &str, limit: Option<usize>) -> String {
    let mut query = format!(
        "rest/v1/documents?select=*&user_id=eq.{}&order=created_at.desc",
        urlencoding::encode(owner_id)
    );
    if let Some(limit) = limit {
        query.push_str(&format!("&limit={}", limit));
    }
    query
}

/// `documents` table over the PostgREST-style endpoint
pub struct RestDocumentTable {
    client: Arc<RestClient>,
}

impl RestDocumentTable {
    pub fn new(client: Arc<RestClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DocumentTable for RestDocumentTable {
    async fn select_by_owner(
        &self,
        owner_id: &str,
        limit: Option<usize>,
    ) -> BackendResult<Vec<DocumentRecord>> {
        let req = self
            .client
            .request(Method::GET, &owner_query(owner_id, limit))
            .await?;
        let resp = self.client.send(req).await?;
        Ok(resp.json().await?)
    }

    async fn insert(&self, doc: NewDocument) -> BackendResult<DocumentRecord> {
        let req = self
            .client
            .request(Method::POST, "rest/v1/documents")
            .await?
            .header("Prefer", "return=representation")
            .json(&[doc]);
        let resp = self.client.send(req).await?;
        let mut rows: Vec<DocumentRecord> = resp.json().await?;
        rows.pop()
            .ok_or_else(|| BackendError::new("Insert returned no document row"))
    }

    async fn delete(&self, owner_id: &str, id: &str) -> BackendResult<()> {
        let path = format!(
            "rest/v1/documents?id=eq.{}&user_id=eq.{}",
            urlencoding::encode(id),
            urlencoding::encode(owner_id)
        );
        let req = self
            .client
            .request(Method::DELETE, &path)
            .await?
            .header("Prefer", "return=representation");
        let resp = self.client.send(req).await?;
        let deleted: Vec<DocumentRecord> = resp.json().await?;
        if deleted.is_empty() {
            return Err(BackendError::not_found(format!("Document not found: {}", id)));
        }
        Ok(())
    }
}

/// `presignup` and `newsletter` tables over the PostgREST-style endpoint
pub struct RestSignupTable {
    client: Arc<RestClient>,
}

impl RestSignupTable {
    pub fn new(client: Arc<RestClient>) -> Self {
        Self { client }
    }

    async fn insert_row<T: serde::Serialize + Sync>(&self, table: &str, row: &T) -> BackendResult<()> {
        let req = self
            .client
            .request(Method::POST, &format!("rest/v1/{}", table))
            .await?
            .header("Prefer", "return=minimal")
            .json(&[row]);
        self.client.send(req).await?;
        Ok(())
    }
}

#[async_trait]
impl SignupTable for RestSignupTable {
    async fn insert_waitlist(&self, entry: &WaitlistEntry) -> BackendResult<()> {
        self.insert_row("presignup", entry).await
    }

    async fn insert_newsletter(&self, entry: &NewsletterEntry) -> BackendResult<()> {
        self.insert_row("newsletter", entry).await
    }
}
