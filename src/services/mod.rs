//! Services Layer: the only component allowed to call more than one store in
//! a single operation, and the one that owns their ordering.
//!
//! Three invariants hold for every mutating method here: Primary Store
//! commits before anything else is attempted; a Text Index, Vector Index,
//! Hierarchy Cache or Reindex Worker failure after that commit is logged and
//! swallowed rather than surfaced, since the write already landed and the
//! secondary stores are rebuildable; and reindex fan-out for dependent
//! entities is enqueued only after the local secondary writes, not before.

#[cfg(test)]
mod tests;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::cursor;
use crate::error::{CuratorError, Result};
use crate::external::embedding::EmbeddingClient;
use crate::external::object_store::{self, ObjectStoreClient};
use crate::hc::{CachedTag, HierarchyCache};
use crate::ps::images::ImageRepository;
use crate::ps::people::PersonRepository;
use crate::ps::tags::TagRepository;
use crate::reindex::{ReindexHandler, ReindexQueue};
use crate::ti::{
    Direction, ImageDocument, ImageQuery, ImageSort, PersonDocument, PersonQuery, PersonSort,
    TagDocument, TagQuery, TagSort, TextIndex,
};
use crate::types::image::{Image, ImageFormat, ImageSource, ImageUpdate, NewImage};
use crate::types::person::{NewPerson, Person, PersonUpdate};
use crate::types::reindex::ReindexKind;
use crate::types::tag::{NewTag, Placement, Tag, TagUpdate};
use crate::vi::VectorIndex;

/// Upper bound on the Vector Index candidate pool handed to the Text Index
/// for fusion. Larger than any realistic page size so the TI-side UUID
/// constraint rarely discards a relevant candidate.
const VECTOR_CANDIDATE_LIMIT: u64 = 500;

/// Orchestrates Primary Store, Text Index, Vector Index, Hierarchy Cache and
/// the Reindex Worker's queue, plus the two external collaborators. Built
/// after its dependencies (two-phase construction, see the worker binary):
/// `Services` is constructed first so it can be wrapped in an `Arc` and
/// handed to the [`WorkerPool`](crate::reindex::WorkerPool) as a
/// [`ReindexHandler`], avoiding a direct ownership cycle between the two.
pub struct Services {
    pool: SqlitePool,
    images: ImageRepository,
    people: PersonRepository,
    tags: TagRepository,
    ti: TextIndex,
    vi: VectorIndex,
    hc: HierarchyCache,
    reindex: ReindexQueue,
    cursor_key: SecretString,
    embedding: EmbeddingClient,
    object_store: ObjectStoreClient,
}

impl Services {
    pub fn new(
        pool: SqlitePool,
        ti: TextIndex,
        vi: VectorIndex,
        hc: HierarchyCache,
        reindex: ReindexQueue,
        cursor_key: SecretString,
        embedding: EmbeddingClient,
        object_store: ObjectStoreClient,
    ) -> Self {
        Self {
            images: ImageRepository::new(pool.clone()),
            people: PersonRepository::new(pool.clone()),
            tags: TagRepository::new(pool.clone()),
            pool,
            ti,
            vi,
            hc,
            reindex,
            cursor_key,
            embedding,
            object_store,
        }
    }

    pub fn reindex_queue(&self) -> &ReindexQueue {
        &self.reindex
    }

    /// Idempotent create-if-absent for the Vector Index collection, called
    /// once at process start alongside `TextIndex::open`.
    pub async fn initialize(&self) -> Result<()> {
        self.vi.ensure_collection().await?;
        Ok(())
    }

    /// Rebuilds every secondary index entry from Primary Store. Intended for
    /// an operator-triggered recovery or first-run population; walks every
    /// entity and reindexes it synchronously rather than through the queue.
    pub async fn reindex_all(&self) -> Result<()> {
        for uuid in self.images.all_uuids().await? {
            self.reindex(ReindexKind::Image, uuid).await?;
        }
        for uuid in self.people.all_uuids().await? {
            self.reindex(ReindexKind::Person, uuid).await?;
        }
        for uuid in self.tags.all_uuids().await? {
            self.reindex(ReindexKind::Tag, uuid).await?;
        }
        self.hc.rebuild_from_ps(&self.pool).await?;
        Ok(())
    }

    // ---- Images -----------------------------------------------------

    pub async fn create_image(&self, upload: NewImageUpload) -> Result<Image> {
        let embedding = self.embedding.embed(&upload.bytes).await?;
        let new = NewImage {
            filename: upload.filename,
            md5: upload.md5,
            sha1: upload.sha1,
            width: upload.width,
            height: upload.height,
            format: upload.format,
            size_bytes: upload.size_bytes,
            embedding,
            title: upload.title,
            description: upload.description,
            tags: upload.tags,
            people: upload.people,
            sources: upload.sources,
        };

        let image = self.images.create(new).await?;

        if let Err(e) = self.ti.index_image(&image).await {
            tracing::warn!(kind = "image", uuid = %image.uuid, backend = "ti", error = %e, "secondary write failed");
        }
        if let Err(e) = self.vi.upsert(image.uuid, image.embedding.clone()).await {
            tracing::warn!(kind = "image", uuid = %image.uuid, backend = "vi", error = %e, "secondary write failed");
        }

        let key = object_store::image_key(image.uuid, image.format.extension());
        if let Err(e) = self
            .object_store
            .put(&key, upload.bytes, content_type(image.format))
            .await
        {
            tracing::warn!(kind = "image", uuid = %image.uuid, backend = "object_store", error = %e, "secondary write failed");
        }

        Ok(image)
    }

    pub async fn update_image(&self, uuid: Uuid, update: ImageUpdate) -> Result<Image> {
        let image = self.images.update(uuid, update).await?;

        if let Err(e) = self.ti.index_image(&image).await {
            tracing::warn!(kind = "image", uuid = %image.uuid, backend = "ti", error = %e, "secondary write failed");
        }

        Ok(image)
    }

    pub async fn delete_image(&self, uuid: Uuid) -> Result<()> {
        let image = self.images.get_by_uuid(uuid).await?;
        self.images.delete(uuid).await?;

        if let Err(e) = self.ti.delete_image(uuid).await {
            tracing::warn!(kind = "image", %uuid, backend = "ti", error = %e, "secondary delete failed");
        }
        if let Err(e) = self.vi.delete(uuid).await {
            tracing::warn!(kind = "image", %uuid, backend = "vi", error = %e, "secondary delete failed");
        }

        let key = object_store::image_key(uuid, image.format.extension());
        if let Err(e) = self.object_store.delete(&key).await {
            tracing::warn!(kind = "image", %uuid, backend = "object_store", error = %e, "secondary delete failed");
        }

        Ok(())
    }

    pub async fn search_images(&self, request: ImageSearchRequest) -> Result<SearchPage<ImageDocument>> {
        let limit = crate::ti::normalise_limit(request.limit);
        let after = request
            .cursor
            .as_deref()
            .map(|c| cursor::decode(c, &self.cursor_key))
            .transpose()?;

        let vector_candidates = match request.similar_to {
            Some(vector) => {
                let raw = self.vi.query(vector, VECTOR_CANDIDATE_LIMIT).await?;
                Some(crate::ti::threshold_candidates(raw, request.similarity_min_score))
            }
            None => None,
        };

        let filter = ImageQuery {
            text: request.text,
            md5: request.md5,
            sha1: request.sha1,
            width_min: request.width_min,
            width_max: request.width_max,
            created_from: request.created_from,
            created_to: request.created_to,
            include_tags: request.include_tags,
            exclude_tags: request.exclude_tags,
            include_people: request.include_people,
            exclude_people: request.exclude_people,
            source_text: request.source_text,
            vector_candidates,
            sort: request.sort,
            direction: request.direction,
            random_seed: request.random_seed,
            limit,
            after,
            track_total_hits: request.track_total_hits,
        };

        let page = self.ti.search_images(filter).await?;
        Ok(into_search_page(page, &self.cursor_key))
    }

    /// Computes the similarity query vector for an uploaded image, for
    /// callers building an [`ImageSearchRequest::similar_to`] value from raw
    /// bytes rather than a previously stored embedding.
    pub async fn embed_for_query(&self, image_bytes: &[u8]) -> Result<Vec<f32>> {
        Ok(self.embedding.embed(image_bytes).await?)
    }

    // ---- People -------------------------------------------------------

    pub async fn create_person(&self, new: NewPerson) -> Result<Person> {
        let person = self.people.create(new).await?;

        if let Err(e) = self.ti.index_person(&person).await {
            tracing::warn!(kind = "person", uuid = %person.uuid, backend = "ti", error = %e, "secondary write failed");
        }

        Ok(person)
    }

    pub async fn update_person(&self, uuid: Uuid, update: PersonUpdate) -> Result<Person> {
        let (person, affected_images) = self.people.update(uuid, update).await?;

        if let Err(e) = self.ti.index_person(&person).await {
            tracing::warn!(kind = "person", uuid = %person.uuid, backend = "ti", error = %e, "secondary write failed");
        }

        self.enqueue_image_reindex(affected_images).await;
        Ok(person)
    }

    pub async fn delete_person(&self, uuid: Uuid) -> Result<()> {
        let affected_images = self.people.delete(uuid).await?;

        if let Err(e) = self.ti.delete_person(uuid).await {
            tracing::warn!(kind = "person", %uuid, backend = "ti", error = %e, "secondary delete failed");
        }

        self.enqueue_image_reindex(affected_images).await;
        Ok(())
    }

    pub async fn search_people(&self, request: PersonSearchRequest) -> Result<SearchPage<PersonDocument>> {
        let limit = crate::ti::normalise_limit(request.limit);
        let after = request
            .cursor
            .as_deref()
            .map(|c| cursor::decode(c, &self.cursor_key))
            .transpose()?;

        let filter = PersonQuery {
            text: request.text,
            created_from: request.created_from,
            created_to: request.created_to,
            sort: request.sort,
            direction: request.direction,
            random_seed: request.random_seed,
            limit,
            after,
            track_total_hits: request.track_total_hits,
        };

        let page = self.ti.search_people(filter).await?;
        Ok(into_search_page(page, &self.cursor_key))
    }

    // ---- Tags -----------------------------------------------------------

    pub async fn create_tag(&self, new: NewTag, placement: Placement) -> Result<Tag> {
        let tag = self.tags.create(new, placement).await?;
        let parent_uuid = self.tags.parent_uuid(&tag).await?;

        if let Err(e) = self.ti.index_tag(&tag, parent_uuid).await {
            tracing::warn!(kind = "tag", uuid = %tag.uuid, backend = "ti", error = %e, "secondary write failed");
        }
        if let Err(e) = self.hc.insert(&cached_tag(&tag, parent_uuid)).await {
            tracing::warn!(kind = "tag", uuid = %tag.uuid, backend = "hc", error = %e, "secondary write failed");
        }

        Ok(tag)
    }

    pub async fn update_tag(&self, uuid: Uuid, update: TagUpdate) -> Result<Tag> {
        let tag = self.tags.update(uuid, update).await?;
        let parent_uuid = self.tags.parent_uuid(&tag).await?;
        let affected_images = self.tags.affected_image_uuids(uuid).await.unwrap_or_else(|e| {
            tracing::warn!(kind = "tag", %uuid, backend = "ps", error = %e, "could not read affected images for fan-out");
            Vec::new()
        });

        if let Err(e) = self.ti.index_tag(&tag, parent_uuid).await {
            tracing::warn!(kind = "tag", uuid = %tag.uuid, backend = "ti", error = %e, "secondary write failed");
        }
        // A rename does not move the tag, so the cached entry's old and new
        // parent are the same.
        if let Err(e) = self.hc.update(&cached_tag(&tag, parent_uuid), parent_uuid).await {
            tracing::warn!(kind = "tag", uuid = %tag.uuid, backend = "hc", error = %e, "secondary write failed");
        }

        self.enqueue_image_reindex(affected_images).await;
        Ok(tag)
    }

    pub async fn move_tag(&self, uuid: Uuid, placement: Placement) -> Result<Tag> {
        let before = self.tags.get_by_uuid(uuid).await?;
        let old_parent_uuid = self.tags.parent_uuid(&before).await?;

        let affected_images = self.tags.move_tag(uuid, placement).await?;

        let tag = self.tags.get_by_uuid(uuid).await?;
        let new_parent_uuid = self.tags.parent_uuid(&tag).await?;

        if let Err(e) = self.ti.index_tag(&tag, new_parent_uuid).await {
            tracing::warn!(kind = "tag", uuid = %tag.uuid, backend = "ti", error = %e, "secondary write failed");
        }
        if let Err(e) = self
            .hc
            .update(&cached_tag(&tag, new_parent_uuid), old_parent_uuid)
            .await
        {
            tracing::warn!(kind = "tag", uuid = %tag.uuid, backend = "hc", error = %e, "secondary write failed");
        }

        self.enqueue_image_reindex(affected_images).await;
        Ok(tag)
    }

    pub async fn delete_tag(&self, uuid: Uuid) -> Result<()> {
        let subtree = self.tags.subtree(uuid).await?;
        let affected_images = self.tags.delete(uuid).await?;

        if let Err(e) = self.hc.delete(uuid, true).await {
            tracing::warn!(kind = "tag", %uuid, backend = "hc", error = %e, "secondary delete failed");
        }
        for tag in &subtree {
            if let Err(e) = self.ti.delete_tag(tag.uuid).await {
                tracing::warn!(kind = "tag", uuid = %tag.uuid, backend = "ti", error = %e, "secondary delete failed");
            }
        }

        self.enqueue_image_reindex(affected_images).await;
        Ok(())
    }

    pub async fn search_tags(&self, request: TagSearchRequest) -> Result<SearchPage<TagDocument>> {
        let limit = crate::ti::normalise_limit(request.limit);
        let after = request
            .cursor
            .as_deref()
            .map(|c| cursor::decode(c, &self.cursor_key))
            .transpose()?;

        let filter = TagQuery {
            parent: request.parent,
            text: request.text,
            sort: request.sort,
            direction: request.direction,
            random_seed: request.random_seed,
            limit,
            after,
            track_total_hits: request.track_total_hits,
        };

        let page = self.ti.search_tags(filter).await?;
        Ok(into_search_page(page, &self.cursor_key))
    }

    async fn enqueue_image_reindex(&self, image_uuids: Vec<Uuid>) {
        for uuid in image_uuids {
            if let Err(e) = self.reindex.enqueue(ReindexKind::Image, uuid).await {
                tracing::warn!(kind = "image", %uuid, backend = "reindex", error = %e, "fan-out enqueue failed");
            }
        }
    }
}

#[async_trait::async_trait]
impl ReindexHandler for Services {
    /// Rebuilds the Text Index (and, for images, the Vector Index point)
    /// from the current Primary Store row. An entity no longer present in
    /// PS completes silently, per the Reindex Worker's contract.
    async fn reindex(&self, kind: ReindexKind, uuid: Uuid) -> Result<()> {
        match kind {
            ReindexKind::Image => match self.images.get_by_uuid(uuid).await {
                Ok(image) => {
                    self.ti.index_image(&image).await?;
                    self.vi.upsert(image.uuid, image.embedding.clone()).await?;
                    Ok(())
                }
                Err(CuratorError::NotFound) => Ok(()),
                Err(e) => Err(e),
            },
            ReindexKind::Person => match self.people.get_by_uuid(uuid).await {
                Ok(person) => self.ti.index_person(&person).await.map_err(Into::into),
                Err(CuratorError::NotFound) => Ok(()),
                Err(e) => Err(e),
            },
            ReindexKind::Tag => match self.tags.get_by_uuid(uuid).await {
                Ok(tag) => {
                    let parent_uuid = self.tags.parent_uuid(&tag).await?;
                    self.ti.index_tag(&tag, parent_uuid).await?;
                    Ok(())
                }
                Err(CuratorError::NotFound) => Ok(()),
                Err(e) => Err(e),
            },
        }
    }
}

/// Content to create an image from: raw bytes (embedded, then stored in
/// object storage) plus the metadata the caller is responsible for deriving
/// (hashing and decoding are outside this crate's scope).
#[derive(Debug, Clone)]
pub struct NewImageUpload {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub md5: String,
    pub sha1: String,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    pub size_bytes: u64,
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<Uuid>,
    pub people: Vec<(Uuid, String)>,
    pub sources: Vec<ImageSource>,
}

#[derive(Debug, Clone, Default)]
pub struct ImageSearchRequest {
    pub text: Option<String>,
    pub md5: Option<String>,
    pub sha1: Option<String>,
    pub width_min: Option<u32>,
    pub width_max: Option<u32>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    pub include_tags: Vec<Uuid>,
    pub exclude_tags: Vec<Uuid>,
    pub include_people: Vec<Uuid>,
    pub exclude_people: Vec<Uuid>,
    pub source_text: Option<String>,
    /// A query embedding for similarity-by-upload search, produced ahead of
    /// time via [`Services::embed_for_query`].
    pub similar_to: Option<Vec<f32>>,
    pub similarity_min_score: Option<f32>,
    pub sort: ImageSort,
    pub direction: Direction,
    pub random_seed: Option<u64>,
    pub limit: i64,
    pub cursor: Option<String>,
    pub track_total_hits: bool,
}

#[derive(Debug, Clone, Default)]
pub struct PersonSearchRequest {
    pub text: Option<String>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    pub sort: PersonSort,
    pub direction: Direction,
    pub random_seed: Option<u64>,
    pub limit: i64,
    pub cursor: Option<String>,
    pub track_total_hits: bool,
}

#[derive(Debug, Clone, Default)]
pub struct TagSearchRequest {
    pub parent: Option<Uuid>,
    pub text: Option<String>,
    pub sort: TagSort,
    pub direction: Direction,
    pub random_seed: Option<u64>,
    pub limit: i64,
    pub cursor: Option<String>,
    pub track_total_hits: bool,
}

/// A page of hydrated hits plus an opaque cursor for the next page, ready to
/// hand back to a caller unmodified.
#[derive(Debug, Clone)]
pub struct SearchPage<D> {
    pub hits: Vec<D>,
    pub has_more: bool,
    pub next_cursor: Option<String>,
    pub total_hits: Option<usize>,
}

fn into_search_page<D>(page: crate::ti::query::Page<D>, cursor_key: &SecretString) -> SearchPage<D> {
    let next_cursor = if page.has_more {
        page.hits.last().map(|hit| cursor::encode(&hit.sort_key.0, cursor_key))
    } else {
        None
    };
    SearchPage {
        hits: page.hits.into_iter().map(|hit| hit.doc).collect(),
        has_more: page.has_more,
        next_cursor,
        total_hits: page.total_hits,
    }
}

fn cached_tag(tag: &Tag, parent_uuid: Option<Uuid>) -> CachedTag {
    CachedTag {
        uuid: tag.uuid,
        name: tag.name.clone(),
        description: tag.description.clone(),
        parent_id: parent_uuid,
        position: tag.position,
        created_at: tag.created_at,
        updated_at: tag.updated_at,
    }
}

fn content_type(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Jpeg => "image/jpeg",
        ImageFormat::Png => "image/png",
        ImageFormat::Gif => "image/gif",
    }
}
