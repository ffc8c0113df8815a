// src/models/actor.rs

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::from_millis;

/// Stable identity of an author, liker or commenter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(pub String);

impl ActorId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What kind of page a profile URL points at.
/// Organizations and people never share an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorKind {
    Person,
    Organization,
    Other,
    Unknown,
}

impl ActorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActorKind::Person => "person",
            ActorKind::Organization => "organization",
            ActorKind::Other => "other",
            ActorKind::Unknown => "unknown",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "person" => ActorKind::Person,
            "organization" => ActorKind::Organization,
            "other" => ActorKind::Other,
            _ => ActorKind::Unknown,
        }
    }
}

/// How an identity was derived: from a canonical profile URL (strong) or
/// from the name and title alone (weak).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Strong,
    Weak,
}

impl Confidence {
    pub fn as_str(self) -> &'static str {
        match self {
            Confidence::Strong => "strong",
            Confidence::Weak => "weak",
        }
    }

    pub fn parse(value: &str) -> Self {
        if value == "strong" {
            Confidence::Strong
        } else {
            Confidence::Weak
        }
    }
}

/// An actor reference exactly as it appears in a raw document, after
/// whitespace and name cleanup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawActor {
    pub name: String,
    pub profile_url: Option<String>,
    pub title: Option<String>,
    /// Data URI or expiring CDN link. Display only.
    pub image_url: Option<String>,
}

/// An actor as stored, with every alias observed under its identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub id: ActorId,
    pub kind: ActorKind,
    pub confidence: Confidence,
    pub canonical_url: Option<String>,
    pub display_name: String,
    pub title: Option<String>,
    pub image_url: Option<String>,
    pub aliases: Vec<String>,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

/// Represents the 'actors' table in the database.
#[derive(Debug, Clone, FromRow)]
pub(crate) struct ActorRow {
    pub id: String,
    pub kind: String,
    pub confidence: String,
    pub canonical_url: Option<String>,
    pub display_name: String,
    pub title: Option<String>,
    pub image_url: Option<String>,
    pub first_seen_ms: i64,
    pub last_seen_ms: i64,
}

impl ActorRow {
    pub(crate) fn into_actor(self, aliases: Vec<String>) -> Actor {
        Actor {
            id: ActorId(self.id),
            kind: ActorKind::parse(&self.kind),
            confidence: Confidence::parse(&self.confidence),
            canonical_url: self.canonical_url,
            display_name: self.display_name,
            title: self.title,
            image_url: self.image_url,
            aliases,
            first_seen_at: from_millis(self.first_seen_ms),
            last_seen_at: from_millis(self.last_seen_ms),
        }
    }
}
