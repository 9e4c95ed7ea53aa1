use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a voteable document (comment, reply or URL) in the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for EntityId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A viewer's vote on an entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteType {
    #[default]
    None,
    Upvote,
    Downvote,
}

impl VoteType {
    /// Contribution of this vote to `up_count - down_count`.
    pub fn weight(self) -> i64 {
        match self {
            VoteType::None => 0,
            VoteType::Upvote => 1,
            VoteType::Downvote => -1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VoteType::None => "none",
            VoteType::Upvote => "upvote",
            VoteType::Downvote => "downvote",
        }
    }
}

impl fmt::Display for VoteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authoritative vote tallies as stored by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteableEntity {
    pub id: EntityId,
    pub up_count: u64,
    pub down_count: u64,
}

impl VoteableEntity {
    pub fn score(&self) -> i64 {
        self.up_count as i64 - self.down_count as i64
    }
}
