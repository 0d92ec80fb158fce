//! # Domain Models
//!
//! These structs represent the core entities of FoundIt.
//! We use UUID v7 for time-ordered, globally unique identification.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Whether a post reports something found or something lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostKind {
    Found,
    Lost,
}

impl PostKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostKind::Found => "found",
            PostKind::Lost => "lost",
        }
    }
}

impl fmt::Display for PostKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "found" => Ok(PostKind::Found),
            "lost" => Ok(PostKind::Lost),
            other => Err(format!("unknown post kind '{other}'")),
        }
    }
}

/// Stored status column. Purged posts have no row, so there is no third value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostStatus {
    Active,
    PendingDelete,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Active => "active",
            PostStatus::PendingDelete => "pending_delete",
        }
    }
}

impl FromStr for PostStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(PostStatus::Active),
            "pending_delete" => Ok(PostStatus::PendingDelete),
            other => Err(format!("unknown post status '{other}'")),
        }
    }
}

/// Lifecycle state of a stored post.
///
/// `delete_at` only exists inside `PendingDelete`, which keeps the
/// status/deadline pair consistent by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PostState {
    Active,
    PendingDelete { delete_at: DateTime<Utc> },
}

impl PostState {
    pub fn status(&self) -> PostStatus {
        match self {
            PostState::Active => PostStatus::Active,
            PostState::PendingDelete { .. } => PostStatus::PendingDelete,
        }
    }

    pub fn delete_at(&self) -> Option<DateTime<Utc>> {
        match self {
            PostState::Active => None,
            PostState::PendingDelete { delete_at } => Some(*delete_at),
        }
    }

    pub fn is_pending_delete(&self) -> bool {
        matches!(self, PostState::PendingDelete { .. })
    }

    /// Rebuilds the state from its two storage columns, rejecting rows where
    /// they disagree.
    pub fn from_parts(
        status: PostStatus,
        delete_at: Option<DateTime<Utc>>,
    ) -> Result<Self, String> {
        match (status, delete_at) {
            (PostStatus::Active, None) => Ok(PostState::Active),
            (PostStatus::PendingDelete, Some(delete_at)) => {
                Ok(PostState::PendingDelete { delete_at })
            }
            (status, delete_at) => Err(format!(
                "inconsistent post state: status={} delete_at={:?}",
                status.as_str(),
                delete_at
            )),
        }
    }
}

/// Contact details shown on a post card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub name: String,
    pub enrollment: String,
    pub phone: String,
    pub hostel: String,
}

/// A single lost or found item on the board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub kind: PostKind,
    pub item_name: String,
    pub description: Option<String>,
    pub category: String,
    pub place: String,
    pub contact: ContactInfo,
    #[serde(flatten)]
    pub state: PostState,
    pub created_at: DateTime<Utc>,
}

/// An uploaded photo. Lives and dies with its post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub id: Uuid,
    pub post_id: Uuid,
    /// Name of the backing file inside the image store
    pub filename: String,
}

/// A registered student.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub enrollment: String,
    pub phone: String,
    pub hostel: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Listing filters for the board index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PostFilter {
    pub kind: Option<PostKind>,
    /// Substring match against item name or description
    pub q: Option<String>,
    pub category: Option<String>,
    pub place: Option<String>,
}

impl PostFilter {
    /// In-process equivalent of the SQL filter, used by non-SQL backends.
    pub fn matches(&self, post: &Post) -> bool {
        if let Some(kind) = self.kind {
            if post.kind != kind {
                return false;
            }
        }
        if let Some(q) = self.q.as_deref().filter(|q| !q.is_empty()) {
            let q = q.to_lowercase();
            let in_name = post.item_name.to_lowercase().contains(&q);
            let in_desc = post
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(&q));
            if !in_name && !in_desc {
                return false;
            }
        }
        if let Some(cat) = self.category.as_deref().filter(|c| !c.is_empty()) {
            if post.category != cat {
                return false;
            }
        }
        if let Some(place) = self.place.as_deref().filter(|p| !p.is_empty()) {
            if post.place != place {
                return false;
            }
        }
        true
    }
}

/// Result of the conditional `active -> pending_delete` update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    Marked,
    AlreadyPending,
    Missing,
}

/// What a guarded purge removed from storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurgedPost {
    pub post_id: Uuid,
    /// Backing files of the deleted image rows, still to be removed from disk
    pub filenames: Vec<String>,
}
