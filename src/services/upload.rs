//! Two-step upload: write the blob, then the metadata row, undoing the blob
//! when the row insert fails.

use bytes::Bytes;

use crate::backend::{DocumentTable, ObjectStore};
use crate::error::{AppError, BackendError, Result};
use crate::models::{DocumentRecord, NewDocument};

/// A blob written by step one, not yet referenced by any row
#[must_use = "a staged blob must be committed or compensated"]
struct StagedBlob<'a> {
    storage: &'a dyn ObjectStore,
    path: String,
}

impl<'a> StagedBlob<'a> {
    /// Step two succeeded; the row now owns the blob
    fn commit(self) {
        tracing::debug!("Committed blob {}", self.path);
    }

    /// Inverse of step one
    async fn compensate(self) -> std::result::Result<(), (String, BackendError)> {
        match self.storage.remove(&[self.path.clone()]).await {
            Ok(()) => {
                tracing::info!("Removed blob {} after failed metadata insert", self.path);
                Ok(())
            }
            Err(e) => {
                tracing::error!("Compensating delete of {} failed, blob orphaned: {}", self.path, e);
                Err((self.path, e))
            }
        }
    }
}

pub struct UploadSaga<'a> {
    storage: &'a dyn ObjectStore,
    documents: &'a dyn DocumentTable,
}

impl<'a> UploadSaga<'a> {
    pub fn new(storage: &'a dyn ObjectStore, documents: &'a dyn DocumentTable) -> Self {
        Self { storage, documents }
    }

    async fn stage(&self, path: &str, data: Bytes, content_type: &str) -> Result<StagedBlob<'a>> {
        self.storage.upload(path, data, content_type).await?;
        Ok(StagedBlob {
            storage: self.storage,
            path: path.to_string(),
        })
    }

    /// Run both steps. A failed insert returns the insert error; if the
    /// blob also could not be removed the error is `PartialFailure`.
    pub async fn run(&self, doc: NewDocument, data: Bytes) -> Result<DocumentRecord> {
        let staged = self
            .stage(&doc.storage_path, data, &doc.mime_type)
            .await?;

        match self.documents.insert(doc).await {
            Ok(record) => {
                staged.commit();
                Ok(record)
            }
            Err(insert_err) => {
                tracing::warn!("Metadata insert failed: {}", insert_err);
                match staged.compensate().await {
                    Ok(()) => Err(AppError::Backend(insert_err)),
                    Err((orphan_path, _)) => Err(AppError::PartialFailure {
                        orphan_path,
                        source: insert_err,
                    }),
                }
            }
        }
    }
}
