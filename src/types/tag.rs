//! Tag entity: a forest node with a sibling position, plus the closure
//! relation maintained alongside it (see `ps::tags`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub uuid: Uuid,
    pub name: String,
    pub description: String,
    pub parent_id: Option<i64>,
    pub position: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A tag as it appears inside an image's association list (a denormalised
/// snapshot taken at association time, carried forward across updates).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagAssociation {
    pub uuid: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTag {
    pub name: String,
    pub description: String,
    pub parent_uuid: Option<Uuid>,
}

#[derive(Debug, Clone, Default)]
pub struct TagUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// Where a new or relocated tag should sit relative to its siblings.
#[derive(Debug, Clone, Copy)]
pub enum Placement {
    /// As a child of `parent`, at the end (or only child) of its siblings.
    Inside { parent: Option<Uuid> },
    /// Immediately before `sibling`, under the same parent as `sibling`.
    Before { sibling: Uuid },
    /// Immediately after `sibling`, under the same parent as `sibling`.
    After { sibling: Uuid },
}
