//! Text Index: full-text search, structured filters and keyset pagination
//! over images, people and tags, each kept in its own `tantivy::Index`.
//!
//! Index operations are idempotent per UUID (delete-then-add inside one
//! writer batch, committed and reloaded immediately so the following search
//! observes it — "immediate refresh" per the contract) and every search
//! asks for `limit + 1` hits to learn whether another page exists.

pub mod document;
pub mod error;
pub mod query;
pub mod schema;

#[cfg(test)]
mod tests;

pub use document::{ImageDocument, PersonDocument, TagDocument};
pub use error::Error;
pub use query::Direction;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::types::image::Image;
use crate::types::person::Person;
use crate::types::tag::Tag;
use crate::vi::Candidate;

use query::{
    apply_similarity_threshold, build_query, paginate, Clause, Page, QueryPlan, SortKey,
};

pub type Result<T> = std::result::Result<T, Error>;

const WRITER_MEMORY_BYTES: usize = 50_000_000;

#[derive(Debug, Clone)]
pub struct TextIndexConfig {
    pub base_path: PathBuf,
}

impl Default for TextIndexConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("ti_index"),
        }
    }
}

struct EntityIndex {
    index: Index,
    writer: Mutex<IndexWriter>,
    reader: IndexReader,
}

impl EntityIndex {
    fn open_or_create(dir: &Path, schema: tantivy::schema::Schema) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let mmap_dir = tantivy::directory::MmapDirectory::open(dir)
            .map_err(tantivy::TantivyError::from)?;
        let index = Index::open_or_create(mmap_dir, schema)?;
        let writer = index.writer(WRITER_MEMORY_BYTES)?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        Ok(Self {
            index,
            writer: Mutex::new(writer),
            reader,
        })
    }

    async fn put(&self, uuid_field: tantivy::schema::Field, uuid: Uuid, doc: TantivyDocument) -> Result<()> {
        let mut writer = self.writer.lock().await;
        let term = tantivy::schema::Term::from_field_text(uuid_field, &uuid.to_string());
        writer.delete_term(term);
        writer.add_document(doc)?;
        writer.commit()?;
        drop(writer);
        self.reader.reload()?;
        Ok(())
    }

    async fn remove(&self, uuid_field: tantivy::schema::Field, uuid: Uuid) -> Result<()> {
        let mut writer = self.writer.lock().await;
        let term = tantivy::schema::Term::from_field_text(uuid_field, &uuid.to_string());
        writer.delete_term(term);
        writer.commit()?;
        drop(writer);
        self.reader.reload()?;
        Ok(())
    }
}

pub struct TextIndex {
    images: EntityIndex,
    image_fields: schema::ImageFields,
    people: EntityIndex,
    person_fields: schema::PersonFields,
    tags: EntityIndex,
    tag_fields: schema::TagFields,
}

impl TextIndex {
    /// Idempotent create-if-absent for all three indices, called by the
    /// Services Layer at process start.
    pub fn open(config: &TextIndexConfig) -> Result<Self> {
        let (image_schema, image_fields) = schema::image_schema();
        let (person_schema, person_fields) = schema::person_schema();
        let (tag_schema, tag_fields) = schema::tag_schema();

        Ok(Self {
            images: EntityIndex::open_or_create(&config.base_path.join("images"), image_schema)?,
            image_fields,
            people: EntityIndex::open_or_create(&config.base_path.join("people"), person_schema)?,
            person_fields,
            tags: EntityIndex::open_or_create(&config.base_path.join("tags"), tag_schema)?,
            tag_fields,
        })
    }

    pub async fn index_image(&self, image: &Image) -> Result<()> {
        let document = ImageDocument::from(image);
        let mut doc = TantivyDocument::default();
        let f = &self.image_fields;
        doc.add_i64(f.id, document.id);
        doc.add_text(f.uuid, document.uuid.to_string());
        doc.add_text(f.filename, &document.filename);
        doc.add_text(f.md5, &document.md5);
        doc.add_text(f.sha1, &document.sha1);
        doc.add_i64(f.width, document.width as i64);
        doc.add_i64(f.height, document.height as i64);
        doc.add_text(f.format, &document.format);
        doc.add_i64(f.size, document.size as i64);
        doc.add_i64(f.created_at, query::millis(document.created_at));
        doc.add_i64(f.updated_at, query::millis(document.updated_at));
        if let Some(title) = &document.title {
            doc.add_text(f.title, title);
            doc.add_text(f.title_kw, title);
        }
        if let Some(description) = &document.description {
            doc.add_text(f.description, description);
        }
        doc.add_i64(f.pixel_count, document.pixel_count as i64);
        doc.add_i64(f.tags_count, document.tags_count as i64);
        for tag in &document.tags {
            doc.add_text(f.tags_uuid, tag.uuid.to_string());
            doc.add_text(f.tags_name, &tag.name);
        }
        for person in &document.people {
            doc.add_text(f.people_uuid, person.uuid.to_string());
            doc.add_text(f.people_name, &person.name);
            doc.add_text(f.people_role, &person.role);
        }
        for source in &document.sources {
            doc.add_text(f.sources_url, &source.url);
            if let Some(title) = &source.title {
                doc.add_text(f.sources_title, title);
            }
            if let Some(description) = &source.description {
                doc.add_text(f.sources_description, description);
            }
        }
        doc.add_text(f.payload, serde_json::to_string(&document)?);

        self.images.put(f.uuid, document.uuid, doc).await
    }

    pub async fn delete_image(&self, uuid: Uuid) -> Result<()> {
        self.images.remove(self.image_fields.uuid, uuid).await
    }

    pub async fn index_person(&self, person: &Person) -> Result<()> {
        let document = PersonDocument::from(person);
        let mut doc = TantivyDocument::default();
        let f = &self.person_fields;
        doc.add_i64(f.id, document.id);
        doc.add_text(f.uuid, document.uuid.to_string());
        doc.add_text(f.name, &document.name);
        doc.add_text(f.name_kw, &document.name);
        if let Some(description) = &document.description {
            doc.add_text(f.description, description);
        }
        doc.add_i64(f.created_at, query::millis(document.created_at));
        doc.add_i64(f.updated_at, query::millis(document.updated_at));
        for source in &document.sources {
            doc.add_text(f.sources_url, &source.url);
            if let Some(title) = &source.title {
                doc.add_text(f.sources_title, title);
            }
            if let Some(description) = &source.description {
                doc.add_text(f.sources_description, description);
            }
        }
        doc.add_text(f.payload, serde_json::to_string(&document)?);

        self.people.put(f.uuid, document.uuid, doc).await
    }

    pub async fn delete_person(&self, uuid: Uuid) -> Result<()> {
        self.people.remove(self.person_fields.uuid, uuid).await
    }

    pub async fn index_tag(&self, tag: &Tag, parent_uuid: Option<Uuid>) -> Result<()> {
        let document = TagDocument::from_tag(tag, parent_uuid);
        let mut doc = TantivyDocument::default();
        let f = &self.tag_fields;
        doc.add_i64(f.id, document.id);
        doc.add_text(f.uuid, document.uuid.to_string());
        doc.add_text(f.name, &document.name);
        doc.add_text(f.name_kw, &document.name);
        if let Some(description) = &document.description {
            doc.add_text(f.description, description);
        }
        if let Some(parent) = document.parent_id {
            doc.add_text(f.parent_id, parent.to_string());
        }
        doc.add_i64(f.created_at, query::millis(document.created_at));
        doc.add_i64(f.updated_at, query::millis(document.updated_at));
        doc.add_text(f.payload, serde_json::to_string(&document)?);

        self.tags.put(f.uuid, document.uuid, doc).await
    }

    pub async fn delete_tag(&self, uuid: Uuid) -> Result<()> {
        self.tags.remove(self.tag_fields.uuid, uuid).await
    }

    pub async fn search_images(&self, filter: ImageQuery) -> Result<Page<ImageDocument>> {
        let f = self.image_fields.clone();
        let mut plan = QueryPlan {
            must: Vec::new(),
            must_not: Vec::new(),
            should: Vec::new(),
        };

        if let Some(md5) = &filter.md5 {
            plan.must.push(Clause::Term(f.md5, md5.clone()));
        }
        if let Some(sha1) = &filter.sha1 {
            plan.must.push(Clause::Term(f.sha1, sha1.clone()));
        }
        if let (Some(min), Some(max)) = (filter.width_min, filter.width_max) {
            plan.must.push(Clause::Range(f.width, min as i64, max as i64));
        }
        if let (Some(from), Some(to)) = (filter.created_from, filter.created_to) {
            plan.must
                .push(Clause::Range(f.created_at, query::millis(from), query::millis(to)));
        }
        for tag in &filter.include_tags {
            plan.must.push(Clause::Term(f.tags_uuid, tag.to_string()));
        }
        for tag in &filter.exclude_tags {
            plan.must_not.push(Clause::Term(f.tags_uuid, tag.to_string()));
        }
        for person in &filter.include_people {
            plan.must.push(Clause::Term(f.people_uuid, person.to_string()));
        }
        for person in &filter.exclude_people {
            plan.must_not
                .push(Clause::Term(f.people_uuid, person.to_string()));
        }
        if let Some(text) = &filter.text {
            plan.should.push(Clause::Match {
                field: f.title,
                text: text.clone(),
                boost: 2.0,
            });
            plan.should.push(Clause::Match {
                field: f.description,
                text: text.clone(),
                boost: 1.0,
            });
            plan.should.push(Clause::Match {
                field: f.filename,
                text: text.clone(),
                boost: 0.5,
            });
        }
        if let Some(text) = &filter.source_text {
            plan.should.push(Clause::Match {
                field: f.sources_title,
                text: text.clone(),
                boost: 1.0,
            });
            plan.should.push(Clause::Match {
                field: f.sources_description,
                text: text.clone(),
                boost: 0.5,
            });
        }

        let candidates = filter.vector_candidates.clone();
        if let Some(candidates) = &candidates {
            if candidates.is_empty() {
                // VI returned no candidates: short-circuit to an empty page.
                return Ok(Page {
                    hits: Vec::new(),
                    has_more: false,
                    total_hits: filter.track_total_hits.then_some(0),
                });
            }
            plan.must.push(Clause::TermsAny(
                f.uuid,
                candidates.iter().map(|c| c.uuid.to_string()).collect(),
            ));
        }

        if matches!(filter.sort, ImageSort::Random) && filter.random_seed.is_none() {
            return Err(Error::RandomSortNeedsSeed);
        }

        let has_should = !plan.should.is_empty();
        let query = build_query(&plan)?;
        let searcher = self.images.reader.searcher();

        let fields = f.clone();
        let sort = filter.sort;
        let direction = filter.direction;
        let seed = filter.random_seed;
        let candidate_scores: std::collections::HashMap<Uuid, f32> = candidates
            .unwrap_or_default()
            .into_iter()
            .map(|c| (c.uuid, c.score))
            .collect();

        let page = paginate(
            &searcher,
            query.as_ref(),
            filter.limit,
            filter.after.as_deref(),
            direction,
            filter.track_total_hits,
            |retrieved| {
                let payload = retrieved
                    .get_first(fields.payload)
                    .and_then(|v| v.as_str())
                    .unwrap_or("{}");
                Ok(serde_json::from_str::<ImageDocument>(payload)?)
            },
            move |doc, retrieved, tantivy_score| {
                let vector_score = candidate_scores.get(&doc.uuid).copied();
                let fused = match vector_score {
                    Some(v) if has_should => tantivy_score * v,
                    Some(v) => v,
                    None => tantivy_score,
                };
                sort_key_for_image(doc, retrieved, fused, sort, seed, &fields)
            },
        )?;

        Ok(page)
    }

    pub async fn search_people(&self, filter: PersonQuery) -> Result<Page<PersonDocument>> {
        let f = self.person_fields.clone();
        let mut plan = QueryPlan {
            must: Vec::new(),
            must_not: Vec::new(),
            should: Vec::new(),
        };

        if let (Some(from), Some(to)) = (filter.created_from, filter.created_to) {
            plan.must
                .push(Clause::Range(f.created_at, query::millis(from), query::millis(to)));
        }
        if let Some(text) = &filter.text {
            plan.should.push(Clause::Match {
                field: f.name,
                text: text.clone(),
                boost: 2.0,
            });
            plan.should.push(Clause::Match {
                field: f.description,
                text: text.clone(),
                boost: 1.0,
            });
        }

        if matches!(filter.sort, PersonSort::Random) && filter.random_seed.is_none() {
            return Err(Error::RandomSortNeedsSeed);
        }

        let query = build_query(&plan)?;
        let searcher = self.people.reader.searcher();
        let fields = f.clone();
        let sort = filter.sort;
        let direction = filter.direction;
        let seed = filter.random_seed;

        paginate(
            &searcher,
            query.as_ref(),
            filter.limit,
            filter.after.as_deref(),
            direction,
            filter.track_total_hits,
            |retrieved| {
                let payload = retrieved
                    .get_first(fields.payload)
                    .and_then(|v| v.as_str())
                    .unwrap_or("{}");
                Ok(serde_json::from_str::<PersonDocument>(payload)?)
            },
            move |doc, retrieved, tantivy_score| {
                sort_key_for_person(doc, retrieved, tantivy_score, sort, seed, &fields)
            },
        )
    }

    pub async fn search_tags(&self, filter: TagQuery) -> Result<Page<TagDocument>> {
        let f = self.tag_fields.clone();
        let mut plan = QueryPlan {
            must: Vec::new(),
            must_not: Vec::new(),
            should: Vec::new(),
        };

        if let Some(parent) = filter.parent {
            plan.must.push(Clause::Term(f.parent_id, parent.to_string()));
        }
        if let Some(text) = &filter.text {
            plan.should.push(Clause::Match {
                field: f.name,
                text: text.clone(),
                boost: 2.0,
            });
            plan.should.push(Clause::Match {
                field: f.description,
                text: text.clone(),
                boost: 1.0,
            });
        }

        if matches!(filter.sort, TagSort::Random) && filter.random_seed.is_none() {
            return Err(Error::RandomSortNeedsSeed);
        }

        let query = build_query(&plan)?;
        let searcher = self.tags.reader.searcher();
        let fields = f.clone();
        let sort = filter.sort;
        let direction = filter.direction;
        let seed = filter.random_seed;

        paginate(
            &searcher,
            query.as_ref(),
            filter.limit,
            filter.after.as_deref(),
            direction,
            filter.track_total_hits,
            |retrieved| {
                let payload = retrieved
                    .get_first(fields.payload)
                    .and_then(|v| v.as_str())
                    .unwrap_or("{}");
                Ok(serde_json::from_str::<TagDocument>(payload)?)
            },
            move |doc, retrieved, tantivy_score| {
                sort_key_for_tag(doc, retrieved, tantivy_score, sort, seed, &fields)
            },
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSort {
    Score,
    CreatedAt,
    TitleKeyword,
    TagsCount,
    PixelCount,
    Random,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersonSort {
    Score,
    CreatedAt,
    NameKeyword,
    Random,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagSort {
    Score,
    CreatedAt,
    NameKeyword,
    Random,
}

#[derive(Default)]
pub struct ImageQuery {
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
    pub vector_candidates: Option<Vec<Candidate>>,
    pub sort: ImageSort,
    pub direction: Direction,
    pub random_seed: Option<u64>,
    pub limit: usize,
    pub after: Option<Vec<crate::types::sort::SortValue>>,
    pub track_total_hits: bool,
}

impl Default for ImageSort {
    fn default() -> Self {
        ImageSort::Score
    }
}

impl Default for PersonSort {
    fn default() -> Self {
        PersonSort::Score
    }
}

impl Default for TagSort {
    fn default() -> Self {
        TagSort::Score
    }
}

#[derive(Default)]
pub struct PersonQuery {
    pub text: Option<String>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    pub sort: PersonSort,
    pub direction: Direction,
    pub random_seed: Option<u64>,
    pub limit: usize,
    pub after: Option<Vec<crate::types::sort::SortValue>>,
    pub track_total_hits: bool,
}

#[derive(Default)]
pub struct TagQuery {
    pub parent: Option<Uuid>,
    pub text: Option<String>,
    pub sort: TagSort,
    pub direction: Direction,
    pub random_seed: Option<u64>,
    pub limit: usize,
    pub after: Option<Vec<crate::types::sort::SortValue>>,
    pub track_total_hits: bool,
}

/// Applies the `limit <= 0 -> 50`, `limit > 100 -> 100` boundary rule the
/// Services Layer is expected to have already run; exposed here too so
/// direct TI callers (e.g. tests) get the same normalisation.
pub fn normalise_limit(limit: i64) -> usize {
    query::normalise_limit(limit)
}

/// Applies the similarity threshold filter to raw Vector Index candidates
/// before constraining a Text Index query, re-exported for the Services
/// Layer's fusion step.
pub fn threshold_candidates(candidates: Vec<Candidate>, min_score: Option<f32>) -> Vec<Candidate> {
    apply_similarity_threshold(candidates, min_score)
}

fn sort_key_for_image(
    doc: &ImageDocument,
    retrieved: &TantivyDocument,
    score: f32,
    sort: ImageSort,
    seed: Option<u64>,
    fields: &schema::ImageFields,
) -> SortKey {
    use crate::types::sort::SortValue;
    let primary = match sort {
        ImageSort::Score => SortValue::F64(score as f64),
        ImageSort::CreatedAt => SortValue::I64(query::millis(doc.created_at)),
        ImageSort::TitleKeyword => SortValue::Str(
            retrieved
                .get_first(fields.title_kw)
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string(),
        ),
        ImageSort::TagsCount => SortValue::I64(doc.tags_count as i64),
        ImageSort::PixelCount => SortValue::I64(doc.pixel_count as i64),
        ImageSort::Random => SortValue::F64(query::deterministic_random(seed.unwrap_or(0), doc.uuid)),
    };
    SortKey(vec![primary, SortValue::I64(doc.id)])
}

fn sort_key_for_person(
    doc: &PersonDocument,
    retrieved: &TantivyDocument,
    score: f32,
    sort: PersonSort,
    seed: Option<u64>,
    fields: &schema::PersonFields,
) -> SortKey {
    use crate::types::sort::SortValue;
    let primary = match sort {
        PersonSort::Score => SortValue::F64(score as f64),
        PersonSort::CreatedAt => SortValue::I64(query::millis(doc.created_at)),
        PersonSort::NameKeyword => SortValue::Str(
            retrieved
                .get_first(fields.name_kw)
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string(),
        ),
        PersonSort::Random => SortValue::F64(query::deterministic_random(seed.unwrap_or(0), doc.uuid)),
    };
    SortKey(vec![primary, SortValue::I64(doc.id)])
}

fn sort_key_for_tag(
    doc: &TagDocument,
    retrieved: &TantivyDocument,
    score: f32,
    sort: TagSort,
    seed: Option<u64>,
    fields: &schema::TagFields,
) -> SortKey {
    use crate::types::sort::SortValue;
    let primary = match sort {
        TagSort::Score => SortValue::F64(score as f64),
        TagSort::CreatedAt => SortValue::I64(query::millis(doc.created_at)),
        TagSort::NameKeyword => SortValue::Str(
            retrieved
                .get_first(fields.name_kw)
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string(),
        ),
        TagSort::Random => SortValue::F64(query::deterministic_random(seed.unwrap_or(0), doc.uuid)),
    };
    SortKey(vec![primary, SortValue::I64(doc.id)])
}
