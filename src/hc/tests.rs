use super::*;

fn sample(uuid: Uuid, parent_id: Option<Uuid>, position: i64) -> CachedTag {
    let now = Utc::now();
    CachedTag {
        uuid,
        name: "animals".into(),
        description: String::new(),
        parent_id,
        position,
        created_at: now,
        updated_at: now,
    }
}

#[test]
fn parse_cached_tag_round_trips_a_root_tag() {
    let uuid = Uuid::now_v7();
    let tag = sample(uuid, None, 10);
    let mut fields = HashMap::new();
    fields.insert("uuid".to_string(), tag.uuid.to_string());
    fields.insert("name".to_string(), tag.name.clone());
    fields.insert("description".to_string(), tag.description.clone());
    fields.insert("parent_id".to_string(), String::new());
    fields.insert("position".to_string(), tag.position.to_string());
    fields.insert("created_at".to_string(), tag.created_at.to_rfc3339());
    fields.insert("updated_at".to_string(), tag.updated_at.to_rfc3339());

    let parsed = parse_cached_tag(uuid, &fields).unwrap();
    assert_eq!(parsed.parent_id, None);
    assert_eq!(parsed.position, 10);
}

#[test]
fn parse_cached_tag_rejects_missing_fields() {
    let fields = HashMap::new();
    assert!(parse_cached_tag(Uuid::now_v7(), &fields).is_err());
}

#[test]
fn children_key_distinguishes_root_from_a_real_parent() {
    let parent = Uuid::now_v7();
    assert_ne!(
        HierarchyCache::children_key(Some(parent)),
        HierarchyCache::children_key(None)
    );
    assert!(HierarchyCache::children_key(None).ends_with(ROOT_KEY));
}

/// Requires a local Redis instance at `127.0.0.1:6379`; exercised in CI.
#[tokio::test]
#[ignore]
async fn insert_then_get_children_preserves_position_order() {
    let hc = HierarchyCache::connect(&HierarchyCacheConfig {
        host: "127.0.0.1".into(),
        port: 6379,
    })
    .unwrap();

    let parent = Uuid::now_v7();
    let a = sample(Uuid::now_v7(), Some(parent), 30);
    let b = sample(Uuid::now_v7(), Some(parent), 10);
    let c = sample(Uuid::now_v7(), Some(parent), 20);

    for tag in [&a, &b, &c] {
        hc.insert(tag).await.unwrap();
    }

    let children = hc.get_children(Some(parent)).await.unwrap();
    let ordered: Vec<Uuid> = children.iter().map(|t| t.uuid).collect();
    assert_eq!(ordered, vec![b.uuid, c.uuid, a.uuid]);

    hc.delete(a.uuid, false).await.unwrap();
    hc.delete(b.uuid, false).await.unwrap();
    hc.delete(c.uuid, false).await.unwrap();
}
