//! # Domain Model
//!
//! Participants, conversations, messages, the SQLite store and the
//! marketplace collaborators the messaging core reads from.

pub mod collab;
pub mod participant;
pub mod store;

pub use participant::{ParticipantKind, ParticipantRef};
