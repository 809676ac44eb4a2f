/// Postgres code for a unique-constraint violation. The local backend maps
/// SQLite's equivalent onto it so callers only check one value.
pub const UNIQUE_VIOLATION: &str = "23505";

/// Failure reported by any backend collaborator (identity, table, object store)
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct BackendError {
    pub code: Option<String>,
    pub status: Option<u16>,
    pub message: String,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            status: None,
            message: message.into(),
        }
    }

    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            status: None,
            message: message.into(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn unique_violation(message: impl Into<String>) -> Self {
        Self::with_code(UNIQUE_VIOLATION, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(message).with_status(404)
    }

    /// True when the store rejected a duplicate row
    pub fn is_unique_violation(&self) -> bool {
        self.code.as_deref() == Some(UNIQUE_VIOLATION) || self.message.contains(UNIQUE_VIOLATION)
    }

    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }
}

impl From<sqlx::Error> for BackendError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                BackendError::unique_violation(db_err.message().to_string())
            }
            sqlx::Error::RowNotFound => BackendError::not_found("Row not found"),
            _ => BackendError::new(format!("Database error: {}", e)),
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        let err = BackendError::new(format!("Request error: {}", e));
        match e.status() {
            Some(status) => err.with_status(status.as_u16()),
            None => err,
        }
    }
}

impl From<std::io::Error> for BackendError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            BackendError::not_found(format!("Object not found: {}", e))
        } else {
            BackendError::new(format!("IO error: {}", e))
        }
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(e: serde_json::Error) -> Self {
        BackendError::new(format!("Invalid response body: {}", e))
    }
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    AuthRequired { redirect_to: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Partial failure: orphaned object at {orphan_path}: {source}")]
    PartialFailure {
        orphan_path: String,
        source: BackendError,
    },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Text shown next to the control that triggered the failure.
    /// `AuthRequired` navigates to the login boundary instead of rendering a message.
    pub fn user_message(&self) -> Option<String> {
        match self {
            AppError::AuthRequired { .. } => None,
            AppError::Validation(msg) => Some(msg.clone()),
            AppError::Backend(e) => Some(e.message.clone()),
            AppError::PartialFailure { source, .. } => Some(source.message.clone()),
            AppError::Conflict(msg) => Some(msg.clone()),
            AppError::NotFound(msg) => Some(msg.clone()),
            AppError::Io(e) => Some(format!("IO error: {}", e)),
            AppError::Internal(msg) => Some(msg.clone()),
        }
    }

    /// Record the failure once, where it stops propagating
    pub fn log(&self) {
        match self {
            AppError::AuthRequired { redirect_to } => {
                tracing::debug!("No session, redirecting to {}", redirect_to);
            }
            AppError::Validation(msg) => tracing::debug!("Rejected input: {}", msg),
            AppError::Conflict(msg) => tracing::debug!("Conflict: {}", msg),
            AppError::NotFound(msg) => tracing::debug!("Not found: {}", msg),
            AppError::Backend(e) => tracing::error!("Backend error: {:?}", e),
            AppError::PartialFailure { orphan_path, source } => {
                tracing::error!("Orphaned object left at {}: {:?}", orphan_path, source);
            }
            AppError::Io(e) => tracing::error!("IO error: {:?}", e),
            AppError::Internal(msg) => tracing::error!("Internal error: {}", msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
