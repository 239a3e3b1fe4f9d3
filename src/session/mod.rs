//! Session management: tokens, login and keep-alive.

pub mod manager;
pub mod qrcode;
pub mod store;

pub use manager::{SessionManager, SessionState};
pub use qrcode::{LoginPrompt, QrLogin};
pub use store::{FileTokenStore, MemoryTokenStore, TokenStore};
