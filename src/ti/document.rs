//! Document shapes indexed into the Text Index, one module-level struct per
//! entity kind. Each is serialised wholesale into a stored `payload` field
//! so a hit can be hydrated without a Primary Store round-trip, and so the
//! nested must/must_not predicates that tantivy's flattened term fields
//! can only approximate can be re-checked precisely in Rust.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::image::{Image, ImageSource, PersonAssociation};
use crate::types::person::Person;
use crate::types::tag::{Tag, TagAssociation};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageDocument {
    pub id: i64,
    pub uuid: Uuid,
    pub filename: String,
    pub md5: String,
    pub sha1: String,
    pub width: u32,
    pub height: u32,
    pub format: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub pixel_count: u64,
    pub tags_count: usize,
    pub tags: Vec<TagAssociation>,
    pub people: Vec<PersonAssociation>,
    pub sources: Vec<ImageSource>,
}

impl From<&Image> for ImageDocument {
    fn from(image: &Image) -> Self {
        Self {
            id: image.id,
            uuid: image.uuid,
            filename: image.filename.clone(),
            md5: image.md5.clone(),
            sha1: image.sha1.clone(),
            width: image.width,
            height: image.height,
            format: format!("{:?}", image.format).to_lowercase(),
            size: image.size_bytes,
            created_at: image.created_at,
            updated_at: image.updated_at,
            title: image.title.clone(),
            description: image.description.clone(),
            pixel_count: image.pixel_count(),
            tags_count: image.tags.len(),
            tags: image.tags.clone(),
            people: image.people.clone(),
            sources: image.sources.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonDocument {
    pub id: i64,
    pub uuid: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub sources: Vec<ImageSource>,
}

impl From<&Person> for PersonDocument {
    fn from(person: &Person) -> Self {
        Self {
            id: person.id,
            uuid: person.uuid,
            name: person.name.clone(),
            description: person.description.clone(),
            created_at: person.created_at,
            updated_at: person.updated_at,
            sources: person.sources.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagDocument {
    pub id: i64,
    pub uuid: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TagDocument {
    pub fn from_tag(tag: &Tag, parent_uuid: Option<Uuid>) -> Self {
        Self {
            id: tag.id,
            uuid: tag.uuid,
            name: tag.name.clone(),
            description: if tag.description.is_empty() {
                None
            } else {
                Some(tag.description.clone())
            },
            parent_id: parent_uuid,
            created_at: tag.created_at,
            updated_at: tag.updated_at,
        }
    }
}
