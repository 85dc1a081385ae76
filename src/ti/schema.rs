//! Per-entity-kind tantivy schemas. Nested arrays (tags/people/sources) have
//! no native representation in tantivy, so each nested attribute gets its
//! own flattened, multi-valued term field (`tags_uuid`, `people_name`, ...)
//! indexed once per array element; must/must_not predicates run against
//! these broadly, then [`super::query`] re-checks precisely against the
//! stored `payload` JSON — the same "search broadly, refine in Rust"
//! approach used elsewhere in this codebase for filters tantivy has no
//! native query type for.

use tantivy::schema::{
    Field, IndexRecordOption, Schema, SchemaBuilder, TextFieldIndexing, TextOptions, FAST, INDEXED,
    STORED, STRING,
};

fn english_text() -> TextOptions {
    TextOptions::default()
        .set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer("en_stem")
                .set_index_option(IndexRecordOption::WithFreqsAndPositions),
        )
        .set_stored()
}

fn keyword_text() -> TextOptions {
    STRING | STORED
}

#[derive(Clone)]
pub struct ImageFields {
    pub id: Field,
    pub uuid: Field,
    pub filename: Field,
    pub md5: Field,
    pub sha1: Field,
    pub width: Field,
    pub height: Field,
    pub format: Field,
    pub size: Field,
    pub created_at: Field,
    pub updated_at: Field,
    pub title: Field,
    pub title_kw: Field,
    pub description: Field,
    pub pixel_count: Field,
    pub tags_count: Field,
    pub tags_uuid: Field,
    pub tags_name: Field,
    pub people_uuid: Field,
    pub people_name: Field,
    pub people_role: Field,
    pub sources_url: Field,
    pub sources_title: Field,
    pub sources_description: Field,
    pub payload: Field,
}

pub fn image_schema() -> (Schema, ImageFields) {
    let mut b: SchemaBuilder = Schema::builder();
    let fields = ImageFields {
        id: b.add_i64_field("id", FAST | STORED),
        uuid: b.add_text_field("uuid", STRING | STORED),
        filename: b.add_text_field("filename", english_text()),
        md5: b.add_text_field("md5", STRING | STORED),
        sha1: b.add_text_field("sha1", STRING | STORED),
        width: b.add_i64_field("width", FAST | STORED | INDEXED),
        height: b.add_i64_field("height", FAST | STORED | INDEXED),
        format: b.add_text_field("format", STRING | STORED),
        size: b.add_i64_field("size", STORED),
        created_at: b.add_i64_field("created_at", FAST | STORED | INDEXED),
        updated_at: b.add_i64_field("updated_at", FAST | STORED | INDEXED),
        title: b.add_text_field("title", english_text()),
        title_kw: b.add_text_field("title_kw", keyword_text()),
        description: b.add_text_field("description", english_text()),
        pixel_count: b.add_i64_field("pixel_count", FAST | STORED),
        tags_count: b.add_i64_field("tags_count", FAST | STORED),
        tags_uuid: b.add_text_field("tags_uuid", STRING),
        tags_name: b.add_text_field("tags_name", english_text()),
        people_uuid: b.add_text_field("people_uuid", STRING),
        people_name: b.add_text_field("people_name", english_text()),
        people_role: b.add_text_field("people_role", STRING),
        sources_url: b.add_text_field("sources_url", STRING),
        sources_title: b.add_text_field("sources_title", english_text()),
        sources_description: b.add_text_field("sources_description", english_text()),
        payload: b.add_text_field("payload", STORED),
    };
    (b.build(), fields)
}

#[derive(Clone)]
pub struct PersonFields {
    pub id: Field,
    pub uuid: Field,
    pub name: Field,
    pub name_kw: Field,
    pub description: Field,
    pub created_at: Field,
    pub updated_at: Field,
    pub sources_url: Field,
    pub sources_title: Field,
    pub sources_description: Field,
    pub payload: Field,
}

pub fn person_schema() -> (Schema, PersonFields) {
    let mut b: SchemaBuilder = Schema::builder();
    let fields = PersonFields {
        id: b.add_i64_field("id", FAST | STORED),
        uuid: b.add_text_field("uuid", STRING | STORED),
        name: b.add_text_field("name", english_text()),
        name_kw: b.add_text_field("name_kw", keyword_text()),
        description: b.add_text_field("description", english_text()),
        created_at: b.add_i64_field("created_at", FAST | STORED | INDEXED),
        updated_at: b.add_i64_field("updated_at", FAST | STORED | INDEXED),
        sources_url: b.add_text_field("sources_url", STRING),
        sources_title: b.add_text_field("sources_title", english_text()),
        sources_description: b.add_text_field("sources_description", english_text()),
        payload: b.add_text_field("payload", STORED),
    };
    (b.build(), fields)
}

#[derive(Clone)]
pub struct TagFields {
    pub id: Field,
    pub uuid: Field,
    pub name: Field,
    pub name_kw: Field,
    pub description: Field,
    pub parent_id: Field,
    pub created_at: Field,
    pub updated_at: Field,
    pub payload: Field,
}

pub fn tag_schema() -> (Schema, TagFields) {
    let mut b: SchemaBuilder = Schema::builder();
    let fields = TagFields {
        id: b.add_i64_field("id", FAST | STORED),
        uuid: b.add_text_field("uuid", STRING | STORED),
        name: b.add_text_field("name", english_text()),
        name_kw: b.add_text_field("name_kw", keyword_text()),
        description: b.add_text_field("description", english_text()),
        parent_id: b.add_text_field("parent_id", STRING | STORED),
        created_at: b.add_i64_field("created_at", FAST | STORED | INDEXED),
        updated_at: b.add_i64_field("updated_at", FAST | STORED | INDEXED),
        payload: b.add_text_field("payload", STORED),
    };
    (b.build(), fields)
}
