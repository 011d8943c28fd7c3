//! Passvault Core - Encrypted local credential vault
//!
//! This crate provides:
//! - A persistent vault key, independent of the master password
//! - Argon2id master password verification with unlock backoff
//! - AES-256-GCM sealed entries with metadata bound as associated data
//! - A session controller with inactivity lock and clipboard auto-clear
//! - An in-memory audit trail emitted through `tracing`

pub mod models;
pub mod crypto;
pub mod clock;
pub mod storage;
pub mod keys;
pub mod master;
pub mod store;
pub mod session;
pub mod clipboard;
pub mod breach;
pub mod audit;
pub mod error;

pub use models::*;
pub use crypto::*;
pub use clock::*;
pub use storage::*;
pub use keys::*;
pub use master::*;
pub use store::*;
pub use session::*;
pub use clipboard::*;
pub use breach::*;
pub use audit::*;
pub use error::*;
