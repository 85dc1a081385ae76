use chrono::Utc;
use tempfile::TempDir;
use uuid::Uuid;

use crate::types::image::{Image, ImageFormat, ImageSource, PersonAssociation};
use crate::types::person::Person;
use crate::types::tag::{Tag, TagAssociation};
use crate::vi::Candidate;

use super::*;

fn sample_image(uuid: Uuid, title: &str, width: u32) -> Image {
    let now = Utc::now();
    Image {
        id: 0,
        uuid,
        filename: format!("{title}.jpg"),
        md5: format!("{:032x}", uuid.as_u128()),
        sha1: "deadbeef".to_string(),
        width,
        height: 480,
        format: ImageFormat::Jpeg,
        size_bytes: 1024,
        embedding: vec![0.0; 512],
        title: Some(title.to_string()),
        description: Some("a lighthouse at dusk".to_string()),
        created_at: now,
        updated_at: now,
        tags: vec![TagAssociation {
            uuid: Uuid::new_v4(),
            name: "landscape".to_string(),
            description: None,
            added_at: now,
        }],
        people: vec![PersonAssociation {
            uuid: Uuid::new_v4(),
            name: "Ada".to_string(),
            description: None,
            role: "photographer".to_string(),
            added_at: now,
        }],
        sources: vec![ImageSource {
            url: "https://example.com/a".to_string(),
            title: Some("Example source".to_string()),
            description: None,
        }],
    }
}

fn sample_person(uuid: Uuid, name: &str) -> Person {
    let now = Utc::now();
    Person {
        id: 0,
        uuid,
        name: name.to_string(),
        description: None,
        created_at: now,
        updated_at: now,
        sources: Vec::new(),
    }
}

fn sample_tag(uuid: Uuid, name: &str, parent_id: Option<i64>) -> Tag {
    let now = Utc::now();
    Tag {
        id: 0,
        uuid,
        name: name.to_string(),
        description: String::new(),
        parent_id,
        position: 0,
        created_at: now,
        updated_at: now,
    }
}

async fn open_index() -> (TextIndex, TempDir) {
    let dir = TempDir::new().unwrap();
    let config = TextIndexConfig {
        base_path: dir.path().to_path_buf(),
    };
    (TextIndex::open(&config).unwrap(), dir)
}

#[tokio::test]
async fn indexing_an_image_makes_it_searchable_by_title() {
    let (ti, _dir) = open_index().await;
    let uuid = Uuid::new_v4();
    let image = sample_image(uuid, "lighthouse", 1920);
    ti.index_image(&image).await.unwrap();

    let page = ti
        .search_images(ImageQuery {
            text: Some("lighthouse".to_string()),
            limit: 10,
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(page.hits.len(), 1);
    assert_eq!(page.hits[0].doc.uuid, uuid);
}

#[tokio::test]
async fn deleting_an_image_removes_it_from_search_results() {
    let (ti, _dir) = open_index().await;
    let uuid = Uuid::new_v4();
    let image = sample_image(uuid, "harbor", 800);
    ti.index_image(&image).await.unwrap();
    ti.delete_image(uuid).await.unwrap();

    let page = ti
        .search_images(ImageQuery {
            text: Some("harbor".to_string()),
            limit: 10,
            ..Default::default()
        })
        .await
        .unwrap();

    assert!(page.hits.is_empty());
}

#[tokio::test]
async fn reindexing_the_same_uuid_replaces_the_previous_document() {
    let (ti, _dir) = open_index().await;
    let uuid = Uuid::new_v4();
    let mut image = sample_image(uuid, "first-title", 640);
    ti.index_image(&image).await.unwrap();

    image.title = Some("second-title".to_string());
    ti.index_image(&image).await.unwrap();

    let page = ti
        .search_images(ImageQuery {
            text: Some("first-title".to_string()),
            limit: 10,
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(page.hits.is_empty());

    let page = ti
        .search_images(ImageQuery {
            text: Some("second-title".to_string()),
            limit: 10,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(page.hits.len(), 1);
}

#[tokio::test]
async fn width_range_filter_excludes_out_of_range_images() {
    let (ti, _dir) = open_index().await;
    ti.index_image(&sample_image(Uuid::new_v4(), "small", 100))
        .await
        .unwrap();
    ti.index_image(&sample_image(Uuid::new_v4(), "large", 4000))
        .await
        .unwrap();

    let page = ti
        .search_images(ImageQuery {
            width_min: Some(2000),
            width_max: Some(5000),
            limit: 10,
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(page.hits.len(), 1);
    assert_eq!(page.hits[0].doc.filename, "large.jpg");
}

#[tokio::test]
async fn include_tags_filter_requires_every_image_to_carry_the_tag() {
    let (ti, _dir) = open_index().await;
    let tag_uuid = Uuid::new_v4();
    let now = Utc::now();

    let mut tagged = sample_image(Uuid::new_v4(), "tagged", 1000);
    tagged.tags = vec![TagAssociation {
        uuid: tag_uuid,
        name: "favourite".to_string(),
        description: None,
        added_at: now,
    }];
    ti.index_image(&tagged).await.unwrap();
    ti.index_image(&sample_image(Uuid::new_v4(), "untagged", 1000))
        .await
        .unwrap();

    let page = ti
        .search_images(ImageQuery {
            include_tags: vec![tag_uuid],
            limit: 10,
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(page.hits.len(), 1);
    assert_eq!(page.hits[0].doc.filename, "tagged.jpg");
}

#[tokio::test]
async fn vector_candidates_constrain_results_to_the_candidate_set() {
    let (ti, _dir) = open_index().await;
    let keep = Uuid::new_v4();
    let drop = Uuid::new_v4();
    ti.index_image(&sample_image(keep, "kept", 1000)).await.unwrap();
    ti.index_image(&sample_image(drop, "dropped", 1000))
        .await
        .unwrap();

    let page = ti
        .search_images(ImageQuery {
            vector_candidates: Some(vec![Candidate { uuid: keep, score: 0.9 }]),
            limit: 10,
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(page.hits.len(), 1);
    assert_eq!(page.hits[0].doc.uuid, keep);
}

#[tokio::test]
async fn empty_vector_candidates_short_circuit_to_an_empty_page() {
    let (ti, _dir) = open_index().await;
    ti.index_image(&sample_image(Uuid::new_v4(), "alone", 1000))
        .await
        .unwrap();

    let page = ti
        .search_images(ImageQuery {
            vector_candidates: Some(Vec::new()),
            limit: 10,
            ..Default::default()
        })
        .await
        .unwrap();

    assert!(page.hits.is_empty());
}

#[tokio::test]
async fn random_sort_without_a_seed_is_rejected() {
    let (ti, _dir) = open_index().await;
    let err = ti
        .search_images(ImageQuery {
            sort: ImageSort::Random,
            limit: 10,
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RandomSortNeedsSeed));
}

#[tokio::test]
async fn has_more_is_true_when_results_exceed_the_page_limit() {
    let (ti, _dir) = open_index().await;
    for i in 0..5 {
        ti.index_image(&sample_image(Uuid::new_v4(), &format!("photo-{i}"), 1000))
            .await
            .unwrap();
    }

    let page = ti
        .search_images(ImageQuery {
            sort: ImageSort::CreatedAt,
            direction: Direction::Asc,
            limit: 2,
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(page.hits.len(), 2);
    assert!(page.has_more);
}

#[tokio::test]
async fn keyset_cursor_excludes_already_seen_hits() {
    let (ti, _dir) = open_index().await;
    for i in 0..4 {
        ti.index_image(&sample_image(Uuid::new_v4(), &format!("seq-{i}"), 1000))
            .await
            .unwrap();
    }

    let first_page = ti
        .search_images(ImageQuery {
            sort: ImageSort::PixelCount,
            direction: Direction::Asc,
            limit: 2,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(first_page.hits.len(), 2);

    let cursor = first_page.hits.last().unwrap().sort_key.0.clone();
    let second_page = ti
        .search_images(ImageQuery {
            sort: ImageSort::PixelCount,
            direction: Direction::Asc,
            limit: 10,
            after: Some(cursor),
            ..Default::default()
        })
        .await
        .unwrap();

    let first_uuids: Vec<_> = first_page.hits.iter().map(|h| h.doc.uuid).collect();
    for hit in &second_page.hits {
        assert!(!first_uuids.contains(&hit.doc.uuid));
    }
}

#[tokio::test]
async fn indexing_and_searching_people_by_name() {
    let (ti, _dir) = open_index().await;
    let uuid = Uuid::new_v4();
    ti.index_person(&sample_person(uuid, "Grace Hopper")).await.unwrap();

    let page = ti
        .search_people(PersonQuery {
            text: Some("Hopper".to_string()),
            limit: 10,
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(page.hits.len(), 1);
    assert_eq!(page.hits[0].doc.uuid, uuid);
}

#[tokio::test]
async fn deleting_a_person_removes_it_from_search_results() {
    let (ti, _dir) = open_index().await;
    let uuid = Uuid::new_v4();
    ti.index_person(&sample_person(uuid, "Alan Turing")).await.unwrap();
    ti.delete_person(uuid).await.unwrap();

    let page = ti
        .search_people(PersonQuery {
            text: Some("Turing".to_string()),
            limit: 10,
            ..Default::default()
        })
        .await
        .unwrap();

    assert!(page.hits.is_empty());
}

#[tokio::test]
async fn tag_search_filters_by_parent() {
    let (ti, _dir) = open_index().await;
    let parent_uuid = Uuid::new_v4();
    let child = sample_tag(Uuid::new_v4(), "child", Some(1));
    ti.index_tag(&child, Some(parent_uuid)).await.unwrap();

    let unrelated = sample_tag(Uuid::new_v4(), "root-tag", None);
    ti.index_tag(&unrelated, None).await.unwrap();

    let page = ti
        .search_tags(TagQuery {
            parent: Some(parent_uuid),
            limit: 10,
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(page.hits.len(), 1);
    assert_eq!(page.hits[0].doc.uuid, child.uuid);
}

#[test]
fn normalise_limit_clamps_to_the_documented_bounds() {
    assert_eq!(normalise_limit(0), 50);
    assert_eq!(normalise_limit(-5), 50);
    assert_eq!(normalise_limit(1000), 100);
    assert_eq!(normalise_limit(30), 30);
}

#[test]
fn threshold_candidates_drops_scores_below_the_minimum() {
    let candidates = vec![
        Candidate { uuid: Uuid::new_v4(), score: 0.9 },
        Candidate { uuid: Uuid::new_v4(), score: 0.2 },
    ];
    let filtered = threshold_candidates(candidates, Some(0.5));
    assert_eq!(filtered.len(), 1);
    assert!(filtered[0].score >= 0.5);
}
