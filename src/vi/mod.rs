//! Vector Index: approximate nearest-neighbour lookup over image embeddings,
//! backed by a `qdrant-client` collection. Only `id` (the entity UUID) and
//! the raw vector are stored as a point; no payload is used — the Text
//! Index is the source of denormalised fields, so fused queries constrain
//! TI by the UUID set VI returns rather than filtering inside Qdrant.

pub mod error;

#[cfg(test)]
mod tests;

pub use error::Error;

use qdrant_client::client::QdrantClient;
use qdrant_client::qdrant::vectors_config::Config as VectorsConfigOneOf;
use qdrant_client::qdrant::{
    with_payload_selector::SelectorOptions, CreateCollection, Distance as QdrantDistance,
    PointId, PointStruct, ScoredPoint, SearchPoints, VectorParams, Vectors, VectorsConfig,
    WithPayloadSelector,
};
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, Error>;

/// Fixed embedding width; every image's vector has exactly this many
/// components. Enforced at upsert time.
pub const DIM: u64 = 512;

#[derive(Debug, Clone)]
pub struct VectorIndexConfig {
    pub url: String,
    pub collection: String,
}

/// A candidate returned from a similarity query: the entity UUID and its
/// cosine similarity score against the query vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub uuid: Uuid,
    pub score: f32,
}

#[derive(Clone)]
pub struct VectorIndex {
    client: std::sync::Arc<QdrantClient>,
    collection: String,
}

impl VectorIndex {
    pub fn connect(config: &VectorIndexConfig) -> Result<Self> {
        let client = QdrantClient::from_url(&config.url).build()?;
        Ok(Self {
            client: std::sync::Arc::new(client),
            collection: config.collection.clone(),
        })
    }

    /// Idempotent create-if-absent, used by Services Layer initialisation.
    pub async fn ensure_collection(&self) -> Result<()> {
        if self.client.collection_exists(&self.collection).await? {
            return Ok(());
        }
        self.client
            .create_collection(&CreateCollection {
                collection_name: self.collection.clone(),
                vectors_config: Some(VectorsConfig {
                    config: Some(VectorsConfigOneOf::Params(VectorParams {
                        size: DIM,
                        distance: QdrantDistance::Cosine.into(),
                        ..Default::default()
                    })),
                }),
                ..Default::default()
            })
            .await?;
        Ok(())
    }

    pub async fn upsert(&self, uuid: Uuid, vector: Vec<f32>) -> Result<()> {
        if vector.len() as u64 != DIM {
            return Err(Error::WrongDimension {
                expected: DIM as usize,
                actual: vector.len(),
            });
        }
        let point = PointStruct {
            id: Some(PointId::from(uuid.to_string())),
            vectors: Some(Vectors::from(vector)),
            payload: Default::default(),
        };
        self.client
            .upsert_points(self.collection.clone(), None, vec![point], None)
            .await?;
        Ok(())
    }

    pub async fn delete(&self, uuid: Uuid) -> Result<()> {
        self.client
            .delete_points(
                self.collection.clone(),
                None,
                &qdrant_client::qdrant::PointsIdsList {
                    ids: vec![PointId::from(uuid.to_string())],
                }
                .into(),
                None,
            )
            .await?;
        Ok(())
    }

    /// Queries by vector, returning candidates ordered by descending cosine
    /// similarity. `limit` bounds the candidate set handed to the Services
    /// Layer for fusion with the Text Index; it is not the page size.
    pub async fn query(&self, vector: Vec<f32>, limit: u64) -> Result<Vec<Candidate>> {
        let response = self
            .client
            .search_points(&SearchPoints {
                collection_name: self.collection.clone(),
                vector,
                limit,
                with_payload: Some(WithPayloadSelector {
                    selector_options: Some(SelectorOptions::Enable(false)),
                }),
                ..Default::default()
            })
            .await?;

        response
            .result
            .into_iter()
            .map(point_to_candidate)
            .collect()
    }
}

fn point_to_candidate(point: ScoredPoint) -> Result<Candidate> {
    let id_str = match point.id.and_then(|id| id.point_id_options) {
        Some(qdrant_client::qdrant::point_id::PointIdOptions::Uuid(s)) => s,
        Some(qdrant_client::qdrant::point_id::PointIdOptions::Num(n)) => n.to_string(),
        None => return Err(Error::BadPointId(String::new())),
    };
    let uuid = Uuid::parse_str(&id_str).map_err(|_| Error::BadPointId(id_str))?;
    Ok(Candidate {
        uuid,
        score: point.score,
    })
}
