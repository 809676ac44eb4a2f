//! In-memory backend with failure injection, for service and shell tests

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{Backend, DocumentTable, IdentityProvider, ObjectStore, SignupTable};
use crate::error::{BackendError, BackendResult};
use crate::models::{DocumentRecord, NewDocument, NewsletterEntry, Session, WaitlistEntry};

#[derive(Default)]
pub struct MemoryBackend {
    pub session: Mutex<Option<Session>>,
    pub rows: Mutex<Vec<DocumentRecord>>,
    pub objects: Mutex<BTreeMap<String, Bytes>>,
    pub waitlist: Mutex<HashSet<String>>,
    pub newsletter: Mutex<HashSet<String>>,

    pub fail_list: AtomicBool,
    pub fail_insert: AtomicBool,
    pub fail_row_delete: AtomicBool,
    pub fail_upload: AtomicBool,
    pub fail_remove: AtomicBool,
    pub fail_sign: AtomicBool,
    pub fail_signup: AtomicBool,

    pub network_calls: AtomicUsize,
    pub sign_calls: AtomicUsize,
    pub download_calls: AtomicUsize,
    next_id: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Backend already signed in as `user_id`
    pub fn signed_in(user_id: &str) -> Arc<Self> {
        let backend = Self::new();
        *backend.session.lock().unwrap() = Some(Session {
            user_id: user_id.to_string(),
            email: format!("{}@example.com", user_id),
            access_token: "token".to_string(),
            expires_at: None,
        });
        backend
    }

    pub fn backend(self: &Arc<Self>) -> Backend {
        Backend {
            auth: self.clone(),
            documents: self.clone(),
            storage: self.clone(),
            signups: self.clone(),
        }
    }

    pub fn put_object(&self, path: &str, data: &'static [u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert(path.to_string(), Bytes::from_static(data));
    }

    /// Seed a metadata row and its blob
    pub fn seed(&self, owner_id: &str, name: &str, mime_type: &str) -> DocumentRecord {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let record = DocumentRecord {
            id: format!("doc-{}", n),
            owner_id: owner_id.to_string(),
            name: name.to_string(),
            storage_path: format!("{}/{}-{}", owner_id, n, name),
            size_bytes: 4,
            mime_type: mime_type.to_string(),
            created_at: Utc::now() + ChronoDuration::seconds(n as i64),
        };
        self.put_object(&record.storage_path, b"data");
        self.rows.lock().unwrap().push(record.clone());
        record
    }

    pub fn has_object(&self, path: &str) -> bool {
        self.objects.lock().unwrap().contains_key(path)
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn sign_count(&self) -> usize {
        self.sign_calls.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.network_calls.load(Ordering::SeqCst)
    }

    fn call(&self, fail: &AtomicBool, what: &str) -> BackendResult<()> {
        self.network_calls.fetch_add(1, Ordering::SeqCst);
        if fail.load(Ordering::SeqCst) {
            return Err(BackendError::new(format!("simulated {} failure", what)));
        }
        Ok(())
    }
}

#[async_trait]
impl IdentityProvider for MemoryBackend {
    async fn get_session(&self) -> BackendResult<Option<Session>> {
        Ok(self.session.lock().unwrap().clone())
    }

    async fn sign_out(&self) -> BackendResult<()> {
        *self.session.lock().unwrap() = None;
        Ok(())
    }
}

#[async_trait]
impl DocumentTable for MemoryBackend {
    async fn select_by_owner(
        &self,
        owner_id: &str,
        limit: Option<usize>,
    ) -> BackendResult<Vec<DocumentRecord>> {
        self.call(&self.fail_list, "list")?;
        let mut rows: Vec<DocumentRecord> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.owner_id == owner_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn insert(&self, doc: NewDocument) -> BackendResult<DocumentRecord> {
        self.call(&self.fail_insert, "insert")?;
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let record = DocumentRecord {
            id: format!("doc-{}", n),
            owner_id: doc.owner_id,
            name: doc.name,
            storage_path: doc.storage_path,
            size_bytes: doc.size_bytes,
            mime_type: doc.mime_type,
            created_at: Utc::now() + ChronoDuration::seconds(n as i64),
        };
        self.rows.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn delete(&self, owner_id: &str, id: &str) -> BackendResult<()> {
        self.call(&self.fail_row_delete, "row delete")?;
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|r| !(r.id == id && r.owner_id == owner_id));
        if rows.len() == before {
            return Err(BackendError::not_found(format!("Document not found: {}", id)));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryBackend {
    async fn upload(&self, path: &str, data: Bytes, _content_type: &str) -> BackendResult<()> {
        self.call(&self.fail_upload, "upload")?;
        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(path) {
            return Err(BackendError::new("The resource already exists").with_status(409));
        }
        objects.insert(path.to_string(), data);
        Ok(())
    }

    async fn remove(&self, paths: &[String]) -> BackendResult<()> {
        self.call(&self.fail_remove, "remove")?;
        let mut objects = self.objects.lock().unwrap();
        for path in paths {
            objects.remove(path);
        }
        Ok(())
    }

    async fn create_signed_url(&self, path: &str, ttl: Duration) -> BackendResult<String> {
        let n = self.sign_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.call(&self.fail_sign, "sign")?;
        if !self.has_object(path) {
            return Err(BackendError::not_found(format!("Object not found: {}", path)));
        }
        Ok(format!(
            "https://storage.test/{}?ttl={}&n={}",
            path,
            ttl.as_secs(),
            n
        ))
    }

    async fn download(&self, path: &str) -> BackendResult<Bytes> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        self.call(&self.fail_sign, "download")?;
        self.objects
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| BackendError::not_found(format!("Object not found: {}", path)))
    }
}

#[async_trait]
impl SignupTable for MemoryBackend {
    async fn insert_waitlist(&self, entry: &WaitlistEntry) -> BackendResult<()> {
        self.call(&self.fail_signup, "signup")?;
        if !self.waitlist.lock().unwrap().insert(entry.email.clone()) {
            return Err(BackendError::unique_violation(
                "duplicate key value violates unique constraint \"presignup_email_key\"",
            ));
        }
        Ok(())
    }

    async fn insert_newsletter(&self, entry: &NewsletterEntry) -> BackendResult<()> {
        self.call(&self.fail_signup, "signup")?;
        if !self.newsletter.lock().unwrap().insert(entry.email.clone()) {
            return Err(BackendError::unique_violation(
                "duplicate key value violates unique constraint \"newsletter_email_key\"",
            ));
        }
        Ok(())
    }
}
