use super::{FieldCondition, FieldValue, PointFilter, ScoredPoint, StoredPoint, VectorDatabase};
use crate::config::VectorDbConfig;
use crate::error::VectorDbError;
use crate::types::{IndexPoint, IndexableUnit};
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::vectors_config::Config;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter, PointId,
    PointStruct, PointsIdsList, RetrievedPoint, ScrollPointsBuilder, SearchPointsBuilder,
    UpsertPointsBuilder, Value, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use uuid::Uuid;

/// Payload field holding the content-addressed id
const POINT_ID_FIELD: &str = "point_id";
const SCROLL_PAGE_SIZE: u32 = 256;
/// Namespace for deriving Qdrant UUID keys from point ids
const POINT_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a4e_93d8_5b7a_8e21_4c0f_d9b3_a6e5);

pub struct QdrantVectorDB {
    client: Qdrant,
    collection: String,
    dimension: AtomicUsize,
}

impl QdrantVectorDB {
    /// Create a new Qdrant client with default local configuration
    pub fn new() -> Result<Self, VectorDbError> {
        Self::with_config(&VectorDbConfig::default())
    }

    /// Create a client for the configured server and collection
    pub fn with_config(config: &VectorDbConfig) -> Result<Self, VectorDbError> {
        tracing::info!(
            "Connecting to Qdrant at {} (collection '{}')",
            config.qdrant_url,
            config.collection_name
        );

        let client = Qdrant::from_url(&config.qdrant_url)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| VectorDbError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            client,
            collection: config.collection_name.clone(),
            dimension: AtomicUsize::new(0),
        })
    }

    /// Qdrant key for a content-addressed id
    pub fn qdrant_key(id: &str) -> String {
        Uuid::new_v5(&POINT_NAMESPACE, id.as_bytes()).to_string()
    }

    async fn collection_dimension(&self) -> Result<Option<u64>, VectorDbError> {
        let info = self
            .client
            .collection_info(&self.collection)
            .await
            .map_err(|e| VectorDbError::ConnectionFailed(e.to_string()))?;

        Ok(info
            .result
            .and_then(|r| r.config)
            .and_then(|c| c.params)
            .and_then(|p| p.vectors_config)
            .and_then(|v| v.config)
            .and_then(|c| match c {
                Config::Params(params) => Some(params.size),
                Config::ParamsMap(_) => None,
            }))
    }

    async fn create_collection(&self, dimension: usize) -> Result<(), VectorDbError> {
        tracing::info!(
            "Creating collection '{}' with dimension {}",
            self.collection,
            dimension
        );
        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection)
                    .vectors_config(VectorParamsBuilder::new(dimension as u64, Distance::Cosine)),
            )
            .await
            .map_err(|e| VectorDbError::CollectionCreationFailed {
                collection: self.collection.clone(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    fn to_point_struct(point: IndexPoint) -> Result<PointStruct, VectorDbError> {
        let mut json = serde_json::to_value(&point.payload)
            .map_err(|e| VectorDbError::InvalidPayload(e.to_string()))?;
        if let Some(obj) = json.as_object_mut() {
            obj.insert(
                POINT_ID_FIELD.to_string(),
                serde_json::Value::String(point.id.clone()),
            );
        }
        let payload = Payload::try_from(json)
            .map_err(|e| VectorDbError::InvalidPayload(e.to_string()))?;

        Ok(PointStruct::new(
            Self::qdrant_key(&point.id),
            point.vector,
            payload,
        ))
    }
}

/// Recover the content-addressed id and unit from a Qdrant payload
fn from_payload(payload: HashMap<String, Value>) -> Result<(String, IndexableUnit), VectorDbError> {
    let mut object: serde_json::Map<String, serde_json::Value> = payload
        .into_iter()
        .map(|(k, v)| (k, value_to_json(v)))
        .collect();

    let id = match object.remove(POINT_ID_FIELD) {
        Some(serde_json::Value::String(id)) => id,
        _ => {
            return Err(VectorDbError::InvalidPayload(format!(
                "missing '{}' field",
                POINT_ID_FIELD
            )));
        }
    };

    let unit = serde_json::from_value(serde_json::Value::Object(object))
        .map_err(|e| VectorDbError::InvalidPayload(e.to_string()))?;
    Ok((id, unit))
}

fn value_to_json(value: Value) -> serde_json::Value {
    match value.kind {
        Some(Kind::StringValue(s)) => serde_json::Value::String(s),
        Some(Kind::IntegerValue(i)) => serde_json::Value::Number(i.into()),
        Some(Kind::DoubleValue(d)) => serde_json::Number::from_f64(d)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Some(Kind::BoolValue(b)) => serde_json::Value::Bool(b),
        Some(Kind::ListValue(list)) => {
            serde_json::Value::Array(list.values.into_iter().map(value_to_json).collect())
        }
        Some(Kind::StructValue(s)) => serde_json::Value::Object(
            s.fields
                .into_iter()
                .map(|(k, v)| (k, value_to_json(v)))
                .collect(),
        ),
        Some(Kind::NullValue(_)) | None => serde_json::Value::Null,
    }
}

fn condition_to_qdrant(cond: &FieldCondition) -> Condition {
    match &cond.value {
        FieldValue::Integer(v) => Condition::matches(cond.field.clone(), *v),
        FieldValue::Text(v) => Condition::matches(cond.field.clone(), v.clone()),
        FieldValue::AnyText(v) => Condition::matches(cond.field.clone(), v.clone()),
    }
}

fn filter_to_qdrant(filter: &PointFilter) -> Option<Filter> {
    if filter.is_empty() {
        return None;
    }
    Some(Filter {
        must: filter.must.iter().map(condition_to_qdrant).collect(),
        must_not: filter.must_not.iter().map(condition_to_qdrant).collect(),
        ..Default::default()
    })
}

fn retrieved_to_stored(point: RetrievedPoint) -> Option<StoredPoint> {
    match from_payload(point.payload) {
        Ok((id, payload)) => Some(StoredPoint { id, payload }),
        Err(e) => {
            tracing::warn!("Skipping point with unreadable payload: {}", e);
            None
        }
    }
}

#[async_trait::async_trait]
impl VectorDatabase for QdrantVectorDB {
    async fn initialize(&self, dimension: usize) -> Result<(), VectorDbError> {
        let exists = self
            .client
            .collection_exists(&self.collection)
            .await
            .map_err(|e| VectorDbError::ConnectionFailed(e.to_string()))?;

        if exists {
            if let Some(actual) = self.collection_dimension().await?
                && actual as usize != dimension
            {
                return Err(VectorDbError::DimensionMismatch {
                    collection: self.collection.clone(),
                    expected: dimension,
                    actual: actual as usize,
                });
            }
            tracing::info!("Collection '{}' already exists", self.collection);
        } else {
            self.create_collection(dimension).await?;
        }

        self.dimension.store(dimension, Ordering::SeqCst);
        Ok(())
    }

    async fn upsert_points(&self, points: Vec<IndexPoint>) -> Result<usize, VectorDbError> {
        if points.is_empty() {
            return Ok(0);
        }

        let count = points.len();
        tracing::debug!("Upserting {} points", count);

        let points = points
            .into_iter()
            .map(Self::to_point_struct)
            .collect::<Result<Vec<_>, _>>()?;

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, points).wait(true))
            .await
            .map_err(|e| VectorDbError::StoreFailed(e.to_string()))?;

        Ok(count)
    }

    async fn search(
        &self,
        query_vector: Vec<f32>,
        limit: usize,
        filter: &PointFilter,
    ) -> Result<Vec<ScoredPoint>, VectorDbError> {
        tracing::debug!("Searching with limit={}, filter={:?}", limit, filter);

        let mut builder = SearchPointsBuilder::new(&self.collection, query_vector, limit as u64)
            .with_payload(true);
        if let Some(f) = filter_to_qdrant(filter) {
            builder = builder.filter(f);
        }

        let response = self
            .client
            .search_points(builder)
            .await
            .map_err(|e| VectorDbError::SearchFailed(e.to_string()))?;

        Ok(response
            .result
            .into_iter()
            .filter_map(|point| match from_payload(point.payload) {
                Ok((id, payload)) => Some(ScoredPoint {
                    id,
                    score: point.score,
                    payload,
                }),
                Err(e) => {
                    tracing::warn!("Skipping search hit with unreadable payload: {}", e);
                    None
                }
            })
            .collect())
    }

    async fn scroll(&self, filter: &PointFilter) -> Result<Vec<StoredPoint>, VectorDbError> {
        let qdrant_filter = filter_to_qdrant(filter);
        let mut points = Vec::new();
        let mut offset: Option<PointId> = None;

        loop {
            let mut builder = ScrollPointsBuilder::new(&self.collection)
                .with_payload(true)
                .with_vectors(false)
                .limit(SCROLL_PAGE_SIZE);
            if let Some(f) = &qdrant_filter {
                builder = builder.filter(f.clone());
            }
            if let Some(off) = offset.take() {
                builder = builder.offset(off);
            }

            let response = self
                .client
                .scroll(builder)
                .await
                .map_err(|e| VectorDbError::ScrollFailed(e.to_string()))?;

            points.extend(response.result.into_iter().filter_map(retrieved_to_stored));

            match response.next_page_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        Ok(points)
    }

    async fn delete_points(&self, ids: Vec<String>) -> Result<usize, VectorDbError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let count = ids.len();
        let ids: Vec<PointId> = ids
            .iter()
            .map(|id| PointId::from(Self::qdrant_key(id)))
            .collect();

        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(PointsIdsList { ids })
                    .wait(true),
            )
            .await
            .map_err(|e| VectorDbError::DeleteFailed(e.to_string()))?;

        Ok(count)
    }

    async fn clear(&self) -> Result<(), VectorDbError> {
        tracing::info!("Clearing collection '{}'", self.collection);

        self.client
            .delete_collection(&self.collection)
            .await
            .map_err(|e| VectorDbError::DeleteFailed(e.to_string()))?;

        let dimension = self.dimension.load(Ordering::SeqCst);
        if dimension > 0 {
            self.create_collection(dimension).await?;
        }
        Ok(())
    }
}
