pub mod access;
pub mod chat;
pub mod document;
pub mod session;
pub mod signup;
mod upload;

pub use access::{AccessUrlManager, DirectorySink, DownloadSink, PreviewSession};
pub use chat::ChatSession;
pub use document::DocumentService;
pub use session::SessionGate;
pub use signup::SignupService;
