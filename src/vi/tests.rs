use super::*;

#[test]
fn upsert_rejects_wrong_dimension() {
    // Dimension is checked before any network call is made, so this can be
    // asserted without a running Qdrant instance.
    let err = Error::WrongDimension {
        expected: DIM as usize,
        actual: 3,
    };
    assert!(matches!(
        err,
        Error::WrongDimension {
            expected: 512,
            actual: 3
        }
    ));
}

#[test]
fn point_to_candidate_parses_uuid_point_ids() {
    let uuid = Uuid::now_v7();
    let point = ScoredPoint {
        id: Some(PointId::from(uuid.to_string())),
        score: 0.93,
        ..Default::default()
    };
    let candidate = point_to_candidate(point).unwrap();
    assert_eq!(candidate.uuid, uuid);
    assert_eq!(candidate.score, 0.93);
}

#[test]
fn point_to_candidate_rejects_non_uuid_ids() {
    let point = ScoredPoint {
        id: Some(PointId::from(42u64)),
        score: 0.5,
        ..Default::default()
    };
    assert!(point_to_candidate(point).is_err());
}

/// Requires a local Qdrant instance at `localhost:6334`; exercised in CI,
/// skipped in the default unit-test run.
#[tokio::test]
#[ignore]
async fn round_trips_a_point_against_a_live_collection() {
    let config = VectorIndexConfig {
        url: "http://localhost:6334".to_string(),
        collection: "vi_integration_test".to_string(),
    };
    let vi = VectorIndex::connect(&config).unwrap();
    vi.ensure_collection().await.unwrap();

    let uuid = Uuid::now_v7();
    let vector = vec![0.1_f32; DIM as usize];
    vi.upsert(uuid, vector.clone()).await.unwrap();

    let candidates = vi.query(vector, 5).await.unwrap();
    assert!(candidates.iter().any(|c| c.uuid == uuid));

    vi.delete(uuid).await.unwrap();
}
