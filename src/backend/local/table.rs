use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use uuid::Uuid;

use super::db::Database;
use crate::backend::{DocumentTable, SignupTable};
use crate::error::{BackendError, BackendResult};
use crate::models::{DocumentRecord, DocumentRow, NewDocument, NewsletterEntry, WaitlistEntry};

/// Fixed-width UTC timestamps so text ordering matches time ordering
fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn into_record(row: DocumentRow) -> BackendResult<DocumentRecord> {
    let id = row.id.clone();
    DocumentRecord::try_from(row)
        .map_err(|e| BackendError::new(format!("Invalid created_at on document {}: {}", id, e)))
}

/// `documents` table on SQLite
#[derive(Clone)]
pub struct SqliteDocumentTable {
    db: Database,
}

impl SqliteDocumentTable {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    async fn get(&self, id: &str) -> BackendResult<DocumentRecord> {
        let row: DocumentRow = sqlx::query_as("SELECT * FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?
            .ok_or_else(|| BackendError::not_found(format!("Document not found: {}", id)))?;
        into_record(row)
    }
}

#[async_trait]
impl DocumentTable for SqliteDocumentTable {
    async fn select_by_owner(
        &self,
        owner_id: &str,
        limit: Option<usize>,
    ) -> BackendResult<Vec<DocumentRecord>> {
        // SQLite treats a negative LIMIT as "no limit"
        let limit = limit.map(|n| n as i64).unwrap_or(-1);
        let rows: Vec<DocumentRow> = sqlx::query_as(
            "SELECT * FROM documents WHERE user_id = ? ORDER BY created_at DESC LIMIT ?",
        )
        .bind(owner_id)
        .bind(limit)
        .fetch_all(self.db.pool())
        .await?;

        rows.into_iter().map(into_record).collect()
    }

    async fn insert(&self, doc: NewDocument) -> BackendResult<DocumentRecord> {
        let id = Uuid::new_v4().to_string();
        let now = now_timestamp();

        sqlx::query(
            r#"
            INSERT INTO documents (id, user_id, name, file_path, size, type, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&doc.owner_id)
        .bind(&doc.name)
        .bind(&doc.storage_path)
        .bind(doc.size_bytes)
        .bind(&doc.mime_type)
        .bind(&now)
        .execute(self.db.pool())
        .await?;

        self.get(&id).await
    }

    async fn delete(&self, owner_id: &str, id: &str) -> BackendResult<()> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(owner_id)
            .execute(self.db.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(BackendError::not_found(format!("Document not found: {}", id)));
        }
        Ok(())
    }
}

/// `presignup` and `newsletter` tables on SQLite
#[derive(Clone)]
pub struct SqliteSignupTable {
    db: Database,
}

impl SqliteSignupTable {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SignupTable for SqliteSignupTable {
    async fn insert_waitlist(&self, entry: &WaitlistEntry) -> BackendResult<()> {
        sqlx::query(
            "INSERT INTO presignup (id, email, phone_number, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&entry.email)
        .bind(&entry.phone_number)
        .bind(now_timestamp())
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    async fn insert_newsletter(&self, entry: &NewsletterEntry) -> BackendResult<()> {
        sqlx::query("INSERT INTO newsletter (id, email, created_at) VALUES (?, ?, ?)")
            .bind(Uuid::new_v4().to_string())
            .bind(&entry.email)
            .bind(now_timestamp())
            .execute(self.db.pool())
            .await?;
        Ok(())
    }
}
