use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub const PDF_MIME_TYPE: &str = "application/pdf";

/// Metadata row for a stored document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    #[serde(rename = "user_id")]
    pub owner_id: String,
    pub name: String,
    #[serde(rename = "file_path")]
    pub storage_path: String,
    #[serde(rename = "size")]
    pub size_bytes: i64,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub created_at: DateTime<Utc>,
}

impl DocumentRecord {
    pub fn is_pdf(&self) -> bool {
        self.mime_type.eq_ignore_ascii_case(PDF_MIME_TYPE)
    }

    pub fn display_name(&self) -> &str {
        display_name(&self.name)
    }
}

/// Row as stored by the SQLite backend (timestamps kept as RFC 3339 text)
#[derive(Debug, Clone, FromRow)]
pub struct DocumentRow {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub file_path: String,
    pub size: i64,
    #[sqlx(rename = "type")]
    pub mime_type: String,
    pub created_at: String,
}

impl TryFrom<DocumentRow> for DocumentRecord {
    type Error = chrono::ParseError;

    fn try_from(row: DocumentRow) -> Result<Self, Self::Error> {
        let created_at = DateTime::parse_from_rfc3339(&row.created_at)?.with_timezone(&Utc);
        Ok(Self {
            id: row.id,
            owner_id: row.user_id,
            name: row.name,
            storage_path: row.file_path,
            size_bytes: row.size,
            mime_type: row.mime_type,
            created_at,
        })
    }
}

/// Insert payload; `id` and `created_at` are assigned by the store
#[derive(Debug, Clone, Serialize)]
pub struct NewDocument {
    #[serde(rename = "user_id")]
    pub owner_id: String,
    pub name: String,
    #[serde(rename = "file_path")]
    pub storage_path: String,
    #[serde(rename = "size")]
    pub size_bytes: i64,
    #[serde(rename = "type")]
    pub mime_type: String,
}

/// A file picked for upload, with the content type the picker declared
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    pub content_type: String,
    pub data: Bytes,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, data: Bytes) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            data,
        }
    }

    pub fn is_pdf(&self) -> bool {
        self.content_type.eq_ignore_ascii_case(PDF_MIME_TYPE)
    }

    pub fn size(&self) -> i64 {
        self.data.len() as i64
    }
}

/// Dashboard summary for one owner
#[derive(Debug, Clone, Serialize)]
pub struct DocumentStats {
    pub total_documents: usize,
    pub storage_used_bytes: i64,
    pub recent: Vec<DocumentRecord>,
}

impl DocumentStats {
    pub fn storage_used_gb(&self) -> f64 {
        self.storage_used_bytes as f64 / (1024.0 * 1024.0 * 1024.0)
    }
}

/// Object key for an upload: `{owner}/{millis}-{filename}`
pub fn storage_path_for(owner_id: &str, created_at: DateTime<Utc>, file_name: &str) -> String {
    format!("{}/{}-{}", owner_id, created_at.timestamp_millis(), file_name)
}

/// Last path segment of a stored name
pub fn display_name(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

/// Human readable size, base 1024
pub fn format_file_size(bytes: i64) -> String {
    if bytes <= 0 {
        return "0 Bytes".to_string();
    }
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    let bytes = bytes as f64;
    let exp = ((bytes.ln() / 1024f64.ln()).floor() as usize).min(UNITS.len() - 1);
    let value = bytes / 1024f64.powi(exp as i32);
    let rounded = (value * 100.0).round() / 100.0;
    // `{}` on f64 already drops trailing zeros ("1.5", "2")
    format!("{} {}", rounded, UNITS[exp])
}

/// Short date, e.g. `Jan 5, 2024`
pub fn format_date(at: &DateTime<Utc>) -> String {
    at.format("%b %-d, %Y").to_string()
}

/// Case-insensitive substring match on the document name
pub fn filter_documents<'a>(documents: &'a [DocumentRecord], query: &str) -> Vec<&'a DocumentRecord> {
    let needle = query.to_lowercase();
    documents
        .iter()
        .filter(|doc| doc.name.to_lowercase().contains(&needle))
        .collect()
}

#[cfg(test)]
pub(crate) fn sample_record(id: &str, owner_id: &str, name: &str, mime_type: &str) -> DocumentRecord {
    DocumentRecord {
        id: id.to_string(),
        owner_id: owner_id.to_string(),
        name: name.to_string(),
        storage_path: format!("{}/0-{}", owner_id, name),
        size_bytes: 10,
        mime_type: mime_type.to_string(),
        created_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn search_is_case_insensitive_substring() {
        let docs = vec![
            sample_record("1", "u", "Invoice.pdf", PDF_MIME_TYPE),
            sample_record("2", "u", "report.PDF", PDF_MIME_TYPE),
        ];

        let hits = filter_documents(&docs, "invoice");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "1");

        let hits = filter_documents(&docs, "pdf");
        assert_eq!(hits.len(), 2);

        assert_eq!(filter_documents(&docs, "").len(), 2);
    }

    #[test]
    fn storage_path_is_owner_scoped() {
        let at = Utc.with_ymd_and_hms(2024, 1, 5, 12, 0, 0).unwrap();
        assert_eq!(
            storage_path_for("user-1", at, "Invoice.pdf"),
            "user-1/1704456000000-Invoice.pdf"
        );
    }

    #[test]
    fn file_sizes() {
        assert_eq!(format_file_size(0), "0 Bytes");
        assert_eq!(format_file_size(512), "512 Bytes");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(2 * 1024 * 1024), "2 MB");
        assert_eq!(format_file_size(1234567), "1.18 MB");
    }

    #[test]
    fn dates_and_names() {
        let at = Utc.with_ymd_and_hms(2024, 1, 5, 12, 0, 0).unwrap();
        assert_eq!(format_date(&at), "Jan 5, 2024");
        assert_eq!(display_name("u1/170-report.pdf"), "170-report.pdf");
        assert_eq!(display_name("plain.pdf"), "plain.pdf");
    }

    #[test]
    fn row_converts_to_record() {
        let row = DocumentRow {
            id: "d1".to_string(),
            user_id: "u1".to_string(),
            name: "a.pdf".to_string(),
            file_path: "u1/1-a.pdf".to_string(),
            size: 42,
            mime_type: PDF_MIME_TYPE.to_string(),
            created_at: "2024-01-05T12:00:00.000000Z".to_string(),
        };
        let record = DocumentRecord::try_from(row).unwrap();
        assert_eq!(record.owner_id, "u1");
        assert!(record.is_pdf());
        assert_eq!(record.created_at.timestamp(), 1704456000);
    }

    #[test]
    fn record_deserializes_from_table_json() {
        let record: DocumentRecord = serde_json::from_str(
            r#"{"id":"d1","user_id":"u1","name":"a.pdf","file_path":"u1/1-a.pdf",
                "size":42,"type":"application/pdf","created_at":"2024-01-05T12:00:00.123456+00:00"}"#,
        )
        .unwrap();
        assert_eq!(record.storage_path, "u1/1-a.pdf");
        assert_eq!(record.size_bytes, 42);
    }
}
