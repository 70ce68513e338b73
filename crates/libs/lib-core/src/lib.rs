//! # Core Library
//!
//! Configuration, errors, the conversation/message store and the marketplace
//! collaborators used by the messaging core.

pub mod config;
pub mod error;
pub mod model;
pub mod dto;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppError, Result};
pub use model::{ParticipantKind, ParticipantRef};
pub use model::store::{DbPool, create_pool, run_migrations};
