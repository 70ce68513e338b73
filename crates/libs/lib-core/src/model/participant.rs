//! # Participants
//!
//! Typed identity of anyone who can send or receive messages.
//!
//! Ids are only unique within a kind (user 5 and agent 5 are different
//! people), so every lookup is keyed by the full [`ParticipantRef`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of marketplace participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantKind {
    /// Tenant or buyer account
    User,
    /// Individual agent
    Agent,
    /// Agency or developer company
    Company,
}

impl ParticipantKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantKind::User => "user",
            ParticipantKind::Agent => "agent",
            ParticipantKind::Company => "company",
        }
    }
}

impl fmt::Display for ParticipantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParticipantKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(ParticipantKind::User),
            "agent" => Ok(ParticipantKind::Agent),
            "company" => Ok(ParticipantKind::Company),
            _ => Err(format!("Invalid participant kind: {}", s)),
        }
    }
}

/// Reference to a participant: kind plus the id within that kind.
///
/// Serialized as `{"kind": "agent", "id": 7}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ParticipantRef {
    User(i64),
    Agent(i64),
    Company(i64),
}

impl ParticipantRef {
    pub fn new(kind: ParticipantKind, id: i64) -> Self {
        match kind {
            ParticipantKind::User => ParticipantRef::User(id),
            ParticipantKind::Agent => ParticipantRef::Agent(id),
            ParticipantKind::Company => ParticipantRef::Company(id),
        }
    }

    pub fn kind(&self) -> ParticipantKind {
        match self {
            ParticipantRef::User(_) => ParticipantKind::User,
            ParticipantRef::Agent(_) => ParticipantKind::Agent,
            ParticipantRef::Company(_) => ParticipantKind::Company,
        }
    }

    pub fn id(&self) -> i64 {
        match *self {
            ParticipantRef::User(id) | ParticipantRef::Agent(id) | ParticipantRef::Company(id) => id,
        }
    }

    /// Build from the raw `(kind, id)` column pair stored in the database.
    pub fn from_columns(kind: &str, id: i64) -> Result<Self, String> {
        Ok(Self::new(kind.parse()?, id))
    }
}

impl fmt::Display for ParticipantRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id())
    }
}
