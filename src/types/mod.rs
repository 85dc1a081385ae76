//! Shared entity and value types for the query, indexing and hierarchy subsystem.

pub mod image;
pub mod person;
pub mod reindex;
pub mod sort;
pub mod tag;

pub use image::{Image, ImageFormat, ImageSource, ImageUpdate, NewImage};
pub use person::{NewPerson, Person, PersonSource, PersonUpdate};
pub use reindex::{ReindexKind, ReindexTask, TaskStatus};
pub use sort::SortValue;
pub use tag::{NewTag, Tag, TagAssociation, TagUpdate};
