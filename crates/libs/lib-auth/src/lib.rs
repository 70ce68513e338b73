//! # Authentication Library
//!
//! Credential verification for the messaging gateway and REST surface.
//!
//! Tokens are issued elsewhere in the marketplace; this crate only needs to
//! verify them and read the participant identity they carry. [`encode_jwt`]
//! exists for tests and local tooling.

pub mod token;

// Re-export commonly used types
pub use token::{Claims, TokenError, encode_jwt, decode_jwt};
