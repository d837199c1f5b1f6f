
use super::{
    CollectionCreation, CollectionInfo, DistanceMethod, RetrievedDocument, VectorDbProvider,
    VectorRecord, partial_insert,
};
use crate::{RagError, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

struct MemoryCollection {
    dimension: usize,
    records: BTreeMap<i64, VectorRecord>,
}

/// Process-local provider, mainly for tests and throwaway runs.
///
/// Collections live only while the provider is connected; `disconnect`
/// discards them.
pub struct MemoryProvider {
    distance: DistanceMethod,
    collections: RwLock<Option<HashMap<String, MemoryCollection>>>,
}

impl MemoryProvider {
    #[inline]
    pub fn new(distance: DistanceMethod) -> Self {
        Self {
            distance,
            collections: RwLock::new(None),
        }
    }

    fn not_connected() -> RagError {
        RagError::VectorDb("In-memory provider is not connected".to_string())
    }

    fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        match self.distance {
            DistanceMethod::Dot => dot,
            DistanceMethod::Cosine => {
                let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm_a == 0.0 || norm_b == 0.0 {
                    0.0
                } else {
                    dot / (norm_a * norm_b)
                }
            }
            DistanceMethod::L2 => -a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>()
                .sqrt(),
        }
    }
}

#[async_trait]
impl VectorDbProvider for MemoryProvider {
    async fn connect(&self) -> Result<()> {
        let mut guard = self.collections.write().await;
        if guard.is_none() {
            *guard = Some(HashMap::new());
            info!("In-memory vector provider ready");
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        if self.collections.write().await.take().is_some() {
            debug!("In-memory vector provider disconnected");
        }
        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        let guard = self.collections.read().await;
        let collections = guard.as_ref().ok_or_else(Self::not_connected)?;
        Ok(collections.contains_key(name))
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let guard = self.collections.read().await;
        let collections = guard.as_ref().ok_or_else(Self::not_connected)?;
        let mut names: Vec<String> = collections.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn get_collection_info(&self, name: &str) -> Result<CollectionInfo> {
        let guard = self.collections.read().await;
        let collections = guard.as_ref().ok_or_else(Self::not_connected)?;
        let collection = collections
            .get(name)
            .ok_or_else(|| RagError::CollectionNotFound(name.to_string()))?;

        Ok(CollectionInfo {
            name: name.to_string(),
            dimension: collection.dimension,
            record_count: collection.records.len(),
            distance: self.distance,
        })
    }

    async fn delete_collection(&self, name: &str) -> Result<bool> {
        let mut guard = self.collections.write().await;
        let collections = guard.as_mut().ok_or_else(Self::not_connected)?;
        Ok(collections.remove(name).is_some())
    }

    async fn create_collection(
        &self,
        name: &str,
        dimension: usize,
        reset: bool,
    ) -> Result<CollectionCreation> {
        let mut guard = self.collections.write().await;
        let collections = guard.as_mut().ok_or_else(Self::not_connected)?;

        if reset && collections.remove(name).is_some() {
            debug!("Dropped collection {} for reset", name);
        }

        if let Some(existing) = collections.get(name) {
            if existing.dimension != dimension {
                warn!(
                    "Collection {} exists with dimension {}, requested {}",
                    name, existing.dimension, dimension
                );
            }
            debug!("Collection {} already exists", name);
            return Ok(CollectionCreation::AlreadyExists);
        }

        collections.insert(
            name.to_string(),
            MemoryCollection {
                dimension,
                records: BTreeMap::new(),
            },
        );
        info!("Created collection {} with {} dimensions", name, dimension);
        Ok(CollectionCreation::Created)
    }

    async fn insert_many(
        &self,
        name: &str,
        records: &[VectorRecord],
        batch_size: usize,
    ) -> Result<usize> {
        let mut guard = self.collections.write().await;
        let collections = guard.as_mut().ok_or_else(Self::not_connected)?;
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| RagError::CollectionNotFound(name.to_string()))?;

        let mut inserted = 0;
        for batch in records.chunks(batch_size.max(1)) {
            if let Some(record) = batch
                .iter()
                .find(|r| r.vector.len() != collection.dimension)
            {
                let mismatch = RagError::DimensionMismatch {
                    expected: collection.dimension,
                    actual: record.vector.len(),
                };
                return Err(partial_insert(inserted, mismatch));
            }

            for record in batch {
                collection.records.insert(record.id, record.clone());
            }
            inserted += batch.len();
        }

        debug!("Inserted {} records into {}", inserted, name);
        Ok(inserted)
    }

    async fn search_by_vector(
        &self,
        name: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Option<Vec<RetrievedDocument>>> {
        let guard = self.collections.read().await;
        let collections = guard.as_ref().ok_or_else(Self::not_connected)?;
        let Some(collection) = collections.get(name) else {
            return Ok(None);
        };

        if vector.len() != collection.dimension {
            return Err(RagError::DimensionMismatch {
                expected: collection.dimension,
                actual: vector.len(),
            });
        }

        let mut documents: Vec<RetrievedDocument> = collection
            .records
            .values()
            .map(|record| RetrievedDocument {
                id: record.id,
                score: self.score(vector, &record.vector),
                text: record.text.clone(),
                metadata: record.metadata.clone(),
            })
            .collect();

        documents.sort_by(|a, b| b.score.total_cmp(&a.score));
        documents.truncate(limit);

        if documents.is_empty() {
            return Ok(None);
        }
        Ok(Some(documents))
    }
}
