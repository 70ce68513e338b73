//! # Utilities Library
//!
//! Environment lookups and input validation shared by the messaging crates.

pub mod envs;
pub mod validation;

// Re-export commonly used functions
pub use envs::{get_env, get_env_opt, get_env_or, get_env_parse_or};
pub use validation::{validate_max_length, validate_not_empty};
