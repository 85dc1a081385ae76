//! Person entity: a unique name, description, timestamps and sources.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::image::ImageSource as PersonSourceRecord;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Person {
    pub id: i64,
    pub uuid: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub sources: Vec<PersonSource>,
}

pub type PersonSource = PersonSourceRecord;

#[derive(Debug, Clone)]
pub struct NewPerson {
    pub name: String,
    pub description: Option<String>,
    pub sources: Vec<PersonSource>,
}

#[derive(Debug, Clone, Default)]
pub struct PersonUpdate {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub sources: Option<Vec<PersonSource>>,
}
