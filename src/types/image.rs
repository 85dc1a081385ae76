//! Image entity: immutable content fields plus mutable title/description and
//! the three association collections (tags, people, sources).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const EMBEDDING_DIM: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
            ImageFormat::Gif => "gif",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Some(ImageFormat::Jpeg),
            "png" => Some(ImageFormat::Png),
            "gif" => Some(ImageFormat::Gif),
            _ => None,
        }
    }
}

/// An image as persisted in the Primary Store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Image {
    pub id: i64,
    pub uuid: Uuid,
    pub filename: String,
    pub md5: String,
    pub sha1: String,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    pub size_bytes: u64,
    pub embedding: Vec<f32>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub tags: Vec<TagAssociation>,
    pub people: Vec<PersonAssociation>,
    pub sources: Vec<ImageSource>,
}

impl Image {
    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

use crate::types::tag::TagAssociation;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonAssociation {
    pub uuid: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub role: String,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageSource {
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
}

/// Content required to create a new image. All fields here become immutable
/// once the row exists.
#[derive(Debug, Clone)]
pub struct NewImage {
    pub filename: String,
    pub md5: String,
    pub sha1: String,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    pub size_bytes: u64,
    pub embedding: Vec<f32>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<Uuid>,
    pub people: Vec<(Uuid, String)>,
    pub sources: Vec<ImageSource>,
}

/// The mutable fields of an image plus the desired final association sets.
/// Attempting to change an immutable field is rejected with `InvalidInput`.
#[derive(Debug, Clone, Default)]
pub struct ImageUpdate {
    pub title: Option<Option<String>>,
    pub description: Option<Option<String>>,
    pub tags: Option<Vec<Uuid>>,
    pub people: Option<Vec<(Uuid, String)>>,
    pub sources: Option<Vec<ImageSource>>,
}
