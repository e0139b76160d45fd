use super::{PointFilter, ScoredPoint, StoredPoint, VectorDatabase};
use crate::error::VectorDbError;
use crate::types::{IndexPoint, IndexableUnit};
use std::collections::BTreeMap;
use std::sync::RwLock;

struct StoredEntry {
    vector: Vec<f32>,
    unit: IndexableUnit,
    payload: serde_json::Value,
}

#[derive(Default)]
struct Collection {
    dimension: Option<usize>,
    points: BTreeMap<String, StoredEntry>,
}

/// In-process vector store with exact cosine search
#[derive(Default)]
pub struct MemoryVectorDB {
    inner: RwLock<Collection>,
}

impl MemoryVectorDB {
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored points in id order
    pub fn points(&self) -> Vec<IndexPoint> {
        match self.inner.read() {
            Ok(col) => col
                .points
                .iter()
                .map(|(id, entry)| IndexPoint {
                    id: id.clone(),
                    vector: entry.vector.clone(),
                    payload: entry.unit.clone(),
                })
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|col| col.points.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn lock_poisoned() -> VectorDbError {
    VectorDbError::ConnectionFailed("in-memory store lock poisoned".to_string())
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait::async_trait]
impl VectorDatabase for MemoryVectorDB {
    async fn initialize(&self, dimension: usize) -> Result<(), VectorDbError> {
        let mut col = self.inner.write().map_err(|_| lock_poisoned())?;
        match col.dimension {
            Some(existing) if existing != dimension => Err(VectorDbError::DimensionMismatch {
                collection: "memory".to_string(),
                expected: dimension,
                actual: existing,
            }),
            _ => {
                col.dimension = Some(dimension);
                Ok(())
            }
        }
    }

    async fn upsert_points(&self, points: Vec<IndexPoint>) -> Result<usize, VectorDbError> {
        let mut col = self.inner.write().map_err(|_| lock_poisoned())?;
        let count = points.len();

        for point in points {
            if let Some(dimension) = col.dimension
                && point.vector.len() != dimension
            {
                return Err(VectorDbError::StoreFailed(format!(
                    "point '{}' has dimension {}, collection expects {}",
                    point.id,
                    point.vector.len(),
                    dimension
                )));
            }
            let payload = serde_json::to_value(&point.payload)
                .map_err(|e| VectorDbError::InvalidPayload(e.to_string()))?;
            col.points.insert(
                point.id,
                StoredEntry {
                    vector: point.vector,
                    unit: point.payload,
                    payload,
                },
            );
        }

        Ok(count)
    }

    async fn search(
        &self,
        query_vector: Vec<f32>,
        limit: usize,
        filter: &PointFilter,
    ) -> Result<Vec<ScoredPoint>, VectorDbError> {
        let col = self.inner.read().map_err(|_| lock_poisoned())?;

        let mut scored: Vec<ScoredPoint> = col
            .points
            .iter()
            .filter(|(_, entry)| filter.matches(&entry.payload))
            .map(|(id, entry)| ScoredPoint {
                id: id.clone(),
                score: cosine_similarity(&query_vector, &entry.vector),
                payload: entry.unit.clone(),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(limit);
        Ok(scored)
    }

    async fn scroll(&self, filter: &PointFilter) -> Result<Vec<StoredPoint>, VectorDbError> {
        let col = self.inner.read().map_err(|_| lock_poisoned())?;
        Ok(col
            .points
            .iter()
            .filter(|(_, entry)| filter.matches(&entry.payload))
            .map(|(id, entry)| StoredPoint {
                id: id.clone(),
                payload: entry.unit.clone(),
            })
            .collect())
    }

    async fn delete_points(&self, ids: Vec<String>) -> Result<usize, VectorDbError> {
        let mut col = self.inner.write().map_err(|_| lock_poisoned())?;
        let count = ids.len();
        for id in ids {
            col.points.remove(&id);
        }
        Ok(count)
    }

    async fn clear(&self) -> Result<(), VectorDbError> {
        let mut col = self.inner.write().map_err(|_| lock_poisoned())?;
        col.points.clear();
        tracing::info!("Cleared in-memory vector store");
        Ok(())
    }
}
