use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Method;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use super::client::{encode_path, RestClient};
use crate::backend::ObjectStore;
use crate::error::BackendResult;

#[derive(Debug, Deserialize)]
struct SignedUrlResponse {
    #[serde(rename = "signedURL")]
    signed_url: String,
}

/// Signed URLs come back relative to the storage API root
fn absolute_signed_url(base_url: &str, signed_url: &str) -> String {
    if signed_url.starts_with("http://") || signed_url.starts_with("https://") {
        signed_url.to_string()
    } else {
        format!(
            "{}/storage/v1/{}",
            base_url.trim_end_matches('/'),
            signed_url.trim_start_matches('/')
        )
    }
}

/// Private bucket on the hosted storage service
pub struct RestObjectStore {
    client: Arc<RestClient>,
    bucket: String,
}

impl RestObjectStore {
    pub fn new(client: Arc<RestClient>, bucket: &str) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
        }
    }

    fn object_path(&self, prefix: &str, path: &str) -> String {
        format!("storage/v1/{}/{}/{}", prefix, self.bucket, encode_path(path))
    }
}

#[async_trait]
impl ObjectStore for RestObjectStore {
    async fn upload(&self, path: &str, data: Bytes, content_type: &str) -> BackendResult<()> {
        let size = data.len();
        let req = self
            .client
            .request(Method::POST, &self.object_path("object", path))
            .await?
            .header("content-type", content_type)
            .header("x-upsert", "false")
            .body(data);
        self.client.send(req).await?;
        tracing::debug!("Uploaded object {} ({} bytes)", path, size);
        Ok(())
    }

    async fn remove(&self, paths: &[String]) -> BackendResult<()> {
        let req = self
            .client
            .request(Method::DELETE, &format!("storage/v1/object/{}", self.bucket))
            .await?
            .json(&serde_json::json!({ "prefixes": paths }));
        self.client.send(req).await?;
        tracing::debug!("Removed objects {:?}", paths);
        Ok(())
    }

    async fn create_signed_url(&self, path: &str, ttl: Duration) -> BackendResult<String> {
        let req = self
            .client
            .request(Method::POST, &self.object_path("object/sign", path))
            .await?
            .json(&serde_json::json!({ "expiresIn": ttl.as_secs().max(1) }));
        let resp = self.client.send(req).await?;
        let body: SignedUrlResponse = resp.json().await?;
        Ok(absolute_signed_url(self.client.base_url(), &body.signed_url))
    }

    async fn download(&self, path: &str) -> BackendResult<Bytes> {
        let req = self
            .client
            .request(Method::GET, &self.object_path("object/authenticated", path))
            .await?;
        let resp = self.client.send(req).await?;
        Ok(resp.bytes().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::TokenStore;

    #[test]
    fn signed_url_is_made_absolute() {
        let body: SignedUrlResponse = serde_json::from_str(
            r#"{"signedURL":"/object/sign/documents/u1/1-a.pdf?token=abc"}"#,
        )
        .unwrap();
        assert_eq!(
            absolute_signed_url("https://project.example.co/", &body.signed_url),
            "https://project.example.co/storage/v1/object/sign/documents/u1/1-a.pdf?token=abc"
        );
        assert_eq!(
            absolute_signed_url("https://x", "https://cdn.example/a?token=1"),
            "https://cdn.example/a?token=1"
        );
    }

    #[test]
    fn object_paths_are_bucket_scoped() {
        let client = Arc::new(RestClient::new("https://x", "anon", TokenStore::new("/nonexistent")));
        let store = RestObjectStore::new(client, "documents");
        assert_eq!(
            store.object_path("object/sign", "u1/1-a b.pdf"),
            "storage/v1/object/sign/documents/u1/1-a%20b.pdf"
        );
    }
}
