//! Docent Core Library
//!
//! This crate provides the foundational utilities shared by every Docent crate:
//! - Error handling (`AppError`, `AppResult`)
//! - Logging infrastructure
//! - Configuration management
//! - Cancellation and request deadlines

pub mod cancel;
pub mod config;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use cancel::{cancel_pair, deadline_from_secs, CancelHandle, CancelSignal};
pub use config::AppConfig;
pub use error::{AppError, AppResult};
