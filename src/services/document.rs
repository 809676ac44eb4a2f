use chrono::Utc;
use std::sync::Arc;

use super::upload::UploadSaga;
use crate::backend::{DocumentTable, ObjectStore};
use crate::error::{AppError, Result};
use crate::models::{
    storage_path_for, DocumentRecord, DocumentStats, NewDocument, UploadFile, PDF_MIME_TYPE,
};

/// Documents shown as recent activity on the dashboard
pub const RECENT_LIMIT: usize = 5;

/// Policy check for a picked file: only PDFs are accepted
pub fn validate_upload(file: &UploadFile) -> Result<()> {
    if !file.is_pdf() {
        return Err(AppError::Validation("Only PDF files are allowed".to_string()));
    }
    if file.name.is_empty() || file.name.contains('/') || file.name.contains('\\') {
        return Err(AppError::Validation("Invalid file name".to_string()));
    }
    Ok(())
}

/// Document metadata and blob operations for one owner at a time
#[derive(Clone)]
pub struct DocumentService {
    documents: Arc<dyn DocumentTable>,
    storage: Arc<dyn ObjectStore>,
}

impl DocumentService {
    pub fn new(documents: Arc<dyn DocumentTable>, storage: Arc<dyn ObjectStore>) -> Self {
        Self { documents, storage }
    }

    /// All documents of `owner_id`, newest first
    pub async fn list(&self, owner_id: &str) -> Result<Vec<DocumentRecord>> {
        let docs = self.documents.select_by_owner(owner_id, None).await?;
        tracing::debug!("Listed {} documents for {}", docs.len(), owner_id);
        Ok(docs)
    }

    /// Dashboard numbers: count, bytes stored, most recent uploads
    pub async fn stats(&self, owner_id: &str) -> Result<DocumentStats> {
        let docs = self.documents.select_by_owner(owner_id, None).await?;
        let recent = match self
            .documents
            .select_by_owner(owner_id, Some(RECENT_LIMIT))
            .await
        {
            Ok(recent) => recent,
            Err(e) => {
                tracing::warn!("Failed to fetch recent activity: {}", e);
                Vec::new()
            }
        };

        Ok(DocumentStats {
            total_documents: docs.len(),
            storage_used_bytes: docs.iter().map(|d| d.size_bytes).sum(),
            recent,
        })
    }

    /// Store the blob, then its metadata row
    pub async fn upload(&self, owner_id: &str, file: UploadFile) -> Result<DocumentRecord> {
        validate_upload(&file)?;

        let storage_path = storage_path_for(owner_id, Utc::now(), &file.name);
        let doc = NewDocument {
            owner_id: owner_id.to_string(),
            name: file.name.clone(),
            storage_path,
            size_bytes: file.size(),
            mime_type: PDF_MIME_TYPE.to_string(),
        };

        let record = UploadSaga::new(self.storage.as_ref(), self.documents.as_ref())
            .run(doc, file.data)
            .await?;
        tracing::info!("Uploaded {} as {}", record.name, record.storage_path);
        Ok(record)
    }

    /// Remove the blob, then the row. A failed blob delete leaves both untouched.
    pub async fn delete(&self, owner_id: &str, id: &str, storage_path: &str) -> Result<()> {
        self.storage.remove(&[storage_path.to_string()]).await?;
        self.documents.delete(owner_id, id).await.map_err(|e| {
            if e.is_not_found() {
                AppError::NotFound(format!("Document not found: {}", id))
            } else {
                AppError::Backend(e)
            }
        })?;
        tracing::info!("Deleted document {} ({})", id, storage_path);
        Ok(())
    }
}
