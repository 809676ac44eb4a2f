//! Dashboard state: the fetched document list, search, the selected upload,
//! and the single open preview or chat surface.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::backend::Backend;
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{filter_documents, AccessGrant, DocumentRecord, PreviewMode, Session, UploadFile};
use crate::services::document::validate_upload;
use crate::services::{
    AccessUrlManager, ChatSession, DocumentService, DownloadSink, PreviewSession, SessionGate,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Listing,
    Ready,
    /// No session; the caller should navigate to `to`
    Redirected { to: String },
}

/// What the list area shows
#[derive(Debug, PartialEq)]
pub enum ListView<'a> {
    Loading,
    Empty { searching: bool },
    Items(Vec<&'a DocumentRecord>),
}

/// The one preview or chat surface open at a time
pub enum Surface {
    None,
    Preview {
        document: DocumentRecord,
        session: PreviewSession,
    },
    Chat(ChatSession),
    Unavailable {
        document_id: String,
        message: String,
    },
}

/// Result of opening a preview
#[derive(Debug, Clone, PartialEq)]
pub enum PreviewOutcome {
    /// PDF shown in the viewer from a renewing grant
    Viewer(AccessGrant),
    /// Anything else was saved once and released
    Downloaded(PathBuf),
}

pub struct DocumentShell {
    gate: SessionGate,
    documents: DocumentService,
    access: AccessUrlManager,
    sink: Arc<dyn DownloadSink>,
    preview_mode: PreviewMode,
    reply_delay: Duration,

    phase: Phase,
    session: Option<Session>,
    list: Vec<DocumentRecord>,
    search: String,
    selected: Option<UploadFile>,
    surface: Surface,
    error: Option<String>,
}

impl DocumentShell {
    pub fn new(backend: &Backend, config: &Config, sink: Arc<dyn DownloadSink>) -> Self {
        Self {
            gate: SessionGate::new(backend.auth.clone(), config.session.login_url.clone()),
            documents: DocumentService::new(backend.documents.clone(), backend.storage.clone()),
            access: AccessUrlManager::from_config(backend.storage.clone(), &config.preview),
            sink,
            preview_mode: config.preview.mode,
            reply_delay: config.chat.reply_delay(),
            phase: Phase::Idle,
            session: None,
            list: Vec::new(),
            search: String::new(),
            selected: None,
            surface: Surface::None,
            error: None,
        }
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn documents(&self) -> &[DocumentRecord] {
        &self.list
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Hand the banner text to the caller and clear it
    pub fn take_error(&mut self) -> Option<String> {
        self.error.take()
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    /// Whether the open surface is still renewing its signed URL
    pub fn is_renewing(&self) -> bool {
        match &self.surface {
            Surface::Preview { session, .. } => session.is_renewing(),
            Surface::Chat(chat) => chat.is_renewing(),
            Surface::None | Surface::Unavailable { .. } => false,
        }
    }

    pub fn set_search(&mut self, query: impl Into<String>) {
        self.search = query.into();
    }

    /// Documents matching the search, in list order
    pub fn visible(&self) -> Vec<&DocumentRecord> {
        filter_documents(&self.list, &self.search)
    }

    pub fn view(&self) -> ListView<'_> {
        match self.phase {
            Phase::Ready => {
                let visible = self.visible();
                if visible.is_empty() {
                    ListView::Empty {
                        searching: !self.search.is_empty(),
                    }
                } else {
                    ListView::Items(visible)
                }
            }
            _ => ListView::Loading,
        }
    }

    /// Check the session once, then fetch the list
    pub async fn load(&mut self) -> Result<()> {
        self.phase = Phase::Listing;
        self.error = None;

        let result = self.gate.require_session().await;
        let session = match result {
            Ok(session) => session,
            Err(e) => return Err(self.record(e)),
        };

        let result = self.documents.list(&session.user_id).await;
        self.session = Some(session);
        self.phase = Phase::Ready;
        match result {
            Ok(docs) => {
                self.list = docs;
                Ok(())
            }
            Err(e) => {
                self.list.clear();
                Err(self.record(e))
            }
        }
    }

    pub async fn sign_out(&mut self) -> Result<()> {
        self.close_surface().await;
        let result = self.gate.sign_out().await;
        if let Err(e) = result {
            return Err(self.record(e));
        }
        self.session = None;
        self.list.clear();
        self.phase = Phase::Redirected {
            to: self.gate.login_url().to_string(),
        };
        Ok(())
    }

    /// Open `id`: PDFs go to the viewer in the configured preview mode,
    /// everything else is downloaded. Replaces whatever surface was open.
    pub async fn open_preview(&mut self, id: &str) -> Result<PreviewOutcome> {
        let document = self.find(id)?;
        self.close_surface().await;

        if !document.is_pdf() {
            let result = self
                .access
                .download_once(&document.storage_path, &document.name, self.sink.as_ref())
                .await;
            return match result {
                Ok(path) => Ok(PreviewOutcome::Downloaded(path)),
                Err(e) => Err(self.record(e)),
            };
        }

        let result = self
            .access
            .open(&document.storage_path, self.preview_mode)
            .await;
        match result {
            Ok(session) => {
                let grant = session.current();
                self.surface = Surface::Preview { document, session };
                Ok(PreviewOutcome::Viewer(grant))
            }
            Err(e) => {
                tracing::warn!("Preview of {} unavailable: {}", document.name, e);
                self.surface = Surface::Unavailable {
                    document_id: document.id,
                    message: e.user_message().unwrap_or_default(),
                };
                Err(e)
            }
        }
    }

    /// Wait for the open viewer's next renewed grant
    pub async fn next_grant(&mut self) -> Result<AccessGrant> {
        match &mut self.surface {
            Surface::Preview { session, .. } => session.changed().await,
            _ => Err(AppError::Validation("No preview is open".to_string())),
        }
    }

    pub async fn open_chat(&mut self, id: &str) -> Result<()> {
        let document = self.find(id)?;
        if !document.is_pdf() {
            return Err(self.record(AppError::Validation(
                "Chat is only available for PDF documents".to_string(),
            )));
        }
        self.close_surface().await;

        let result = ChatSession::open(&self.access, document.clone(), self.reply_delay).await;
        match result {
            Ok(chat) => {
                self.surface = Surface::Chat(chat);
                Ok(())
            }
            Err(e) => {
                self.surface = Surface::Unavailable {
                    document_id: document.id,
                    message: e.user_message().unwrap_or_default(),
                };
                Err(e)
            }
        }
    }

    pub fn chat_mut(&mut self) -> Option<&mut ChatSession> {
        match &mut self.surface {
            Surface::Chat(chat) => Some(chat),
            _ => None,
        }
    }

    /// Close the open surface and stop its renewal
    pub async fn close_surface(&mut self) {
        match std::mem::replace(&mut self.surface, Surface::None) {
            Surface::Preview { session, .. } => session.close().await,
            Surface::Chat(chat) => chat.close().await,
            Surface::None | Surface::Unavailable { .. } => {}
        }
    }

    /// Pick a file for upload; non-PDF picks are rejected and clear the selection
    pub fn select_file(&mut self, file: UploadFile) -> Result<()> {
        if let Err(e) = validate_upload(&file) {
            self.selected = None;
            return Err(self.record(e));
        }
        self.error = None;
        self.selected = Some(file);
        Ok(())
    }

    pub fn selected_file(&self) -> Option<&UploadFile> {
        self.selected.as_ref()
    }

    /// Upload the selected file and put it at the top of the list
    pub async fn submit_upload(&mut self) -> Result<DocumentRecord> {
        let file = match &self.selected {
            Some(file) => file.clone(),
            None => {
                return Err(self.record(AppError::Validation(
                    "Please select a file first".to_string(),
                )))
            }
        };
        let owner_id = self.owner_id()?;

        let result = self.documents.upload(&owner_id, file).await;
        match result {
            Ok(record) => {
                self.selected = None;
                self.error = None;
                self.list.insert(0, record.clone());
                Ok(record)
            }
            Err(e) => Err(self.record(e)),
        }
    }

    /// Delete blob and row; the list only changes once both are gone
    pub async fn delete(&mut self, id: &str) -> Result<()> {
        let document = self.find(id)?;
        let owner_id = self.owner_id()?;

        let result = self
            .documents
            .delete(&owner_id, &document.id, &document.storage_path)
            .await;
        if let Err(e) = result {
            return Err(self.record(e));
        }

        self.list.retain(|d| d.id != document.id);
        if self.surface_document_id() == Some(document.id.as_str()) {
            self.close_surface().await;
        }
        Ok(())
    }

    fn surface_document_id(&self) -> Option<&str> {
        match &self.surface {
            Surface::Preview { document, .. } => Some(&document.id),
            Surface::Chat(chat) => Some(&chat.document().id),
            Surface::Unavailable { document_id, .. } => Some(document_id),
            Surface::None => None,
        }
    }

    fn find(&mut self, id: &str) -> Result<DocumentRecord> {
        let found = self.list.iter().find(|d| d.id == id).cloned();
        match found {
            Some(doc) => Ok(doc),
            None => Err(self.record(AppError::NotFound(format!("Document not found: {}", id)))),
        }
    }

    fn owner_id(&mut self) -> Result<String> {
        if let Some(session) = &self.session {
            return Ok(session.user_id.clone());
        }
        let redirect_to = self.gate.login_url().to_string();
        Err(self.record(AppError::AuthRequired { redirect_to }))
    }

    /// Turn a failure into view state; a missing session redirects instead
    fn record(&mut self, err: AppError) -> AppError {
        match &err {
            AppError::AuthRequired { redirect_to } => {
                self.phase = Phase::Redirected {
                    to: redirect_to.clone(),
                };
            }
            _ => self.error = err.user_message(),
        }
        err.log();
        err
    }
}
