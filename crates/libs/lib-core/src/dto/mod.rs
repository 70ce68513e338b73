//! # Data Transfer Objects (DTOs)
//!
//! Data structures exchanged with clients over REST and the live channel.

pub mod messaging;

pub use messaging::*;
