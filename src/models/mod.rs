pub mod chat;
pub mod document;
pub mod grant;
pub mod session;
pub mod signup;

pub use chat::*;
pub use document::*;
pub use grant::*;
pub use session::*;
pub use signup::*;
