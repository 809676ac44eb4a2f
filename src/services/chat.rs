use chrono::Utc;
use std::time::Duration;
use uuid::Uuid;

use super::access::{AccessUrlManager, PreviewSession};
use crate::error::{AppError, Result};
use crate::models::{AccessGrant, ChatMessage, ChatRole, DocumentRecord, PreviewMode};

pub const SIMULATED_REPLY: &str =
    "This is a simulated AI response. Integration with your AI service will go here.";

/// Chat surface for one document. Holds its own renewing preview of the
/// document next to the message log.
pub struct ChatSession {
    document: DocumentRecord,
    preview: PreviewSession,
    messages: Vec<ChatMessage>,
    reply_delay: Duration,
}

impl ChatSession {
    pub async fn open(
        access: &AccessUrlManager,
        document: DocumentRecord,
        reply_delay: Duration,
    ) -> Result<Self> {
        let preview = access
            .open(&document.storage_path, PreviewMode::SignedUrl)
            .await?;
        tracing::info!("Opened chat for {}", document.name);
        Ok(Self {
            document,
            preview,
            messages: Vec::new(),
            reply_delay,
        })
    }

    pub fn document(&self) -> &DocumentRecord {
        &self.document
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn preview(&self) -> AccessGrant {
        self.preview.current()
    }

    pub fn is_renewing(&self) -> bool {
        self.preview.is_renewing()
    }

    /// Post a user message and wait for the reply
    pub async fn send(&mut self, text: &str) -> Result<&ChatMessage> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::Validation("Message cannot be empty".to_string()));
        }

        self.push(ChatRole::User, text);
        tokio::time::sleep(self.reply_delay).await;
        self.push(ChatRole::Assistant, SIMULATED_REPLY);

        self.messages
            .last()
            .ok_or_else(|| AppError::Internal("Chat log is empty".to_string()))
    }

    fn push(&mut self, role: ChatRole, content: &str) {
        self.messages.push(ChatMessage {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.to_string(),
            timestamp: Utc::now(),
        });
    }

    pub async fn close(self) {
        self.preview.close().await;
        tracing::info!("Closed chat for {}", self.document.name);
    }
}
