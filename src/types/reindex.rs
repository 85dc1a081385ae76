//! Reindex task shape, shared between the Services Layer (producer) and the
//! Reindex Worker (consumer).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReindexKind {
    Image,
    Person,
    Tag,
}

impl ReindexKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReindexKind::Image => "image",
            ReindexKind::Person => "person",
            ReindexKind::Tag => "tag",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "image" => Some(ReindexKind::Image),
            "person" => Some(ReindexKind::Person),
            "tag" => Some(ReindexKind::Tag),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Abandoned,
}

/// A durable unit of reindex work, keyed by `"{kind}:{uuid}"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReindexTask {
    pub id: i64,
    pub task_key: String,
    pub kind: ReindexKind,
    pub uuid: Uuid,
    pub attempt: u32,
    pub not_before: DateTime<Utc>,
    pub status: TaskStatus,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReindexTask {
    pub fn task_key_for(kind: ReindexKind, uuid: Uuid) -> String {
        format!("{}:{}", kind.as_str(), uuid)
    }
}
