use super::{EmbeddingProvider, preprocess, validate_vector};
use crate::config::EmbeddingConfig;
use crate::error::EmbeddingError;
use crate::rate_limit::RateLimiter;
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

const MAX_ERROR_BODY_CHARS: usize = 500;

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

/// Client for an external HTTP embedding service
///
/// Every request passes through the shared rate limiter and the retry policy;
/// responses are validated for dimension and finiteness before being returned.
pub struct HttpEmbeddingClient {
    client: reqwest::Client,
    endpoint: String,
    model_name: String,
    dimension: usize,
    api_key: Option<String>,
    max_input_chars: usize,
    timeout_secs: u64,
    retry: RetryPolicy,
    limiter: Arc<RateLimiter>,
}

impl HttpEmbeddingClient {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.timeout_secs))
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("repo-rag/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| EmbeddingError::RequestFailed(format!("HTTP client setup: {}", e)))?;

        tracing::info!(
            "Embedding client: model={}, dimension={}, endpoint={}",
            config.model_name,
            config.dimension,
            config.endpoint
        );

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model_name: config.model_name.clone(),
            dimension: config.dimension,
            api_key: config.api_key.clone(),
            max_input_chars: config.max_input_chars,
            timeout_secs: config.timeout_secs,
            retry: RetryPolicy::new(
                config.max_attempts,
                Duration::from_millis(config.retry_base_delay_ms),
            ),
            limiter: Arc::new(RateLimiter::per_minute(config.requests_per_minute)),
        })
    }

    /// Share one limiter across clients that call the same endpoint
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn request(&self, input: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.limiter.acquire().await;

        let mut request = self.client.post(&self.endpoint).json(&EmbeddingRequest {
            model: &self.model_name,
            input,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| self.map_transport(e))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| self.map_transport(e))?;

        if !status.is_success() {
            tracing::error!("Embedding service error {}: {}", status, body);
            return Err(EmbeddingError::HttpStatus {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        let vector = parse_embedding_response(&body)?;
        validate_vector(&vector, self.dimension)?;
        Ok(vector)
    }

    fn map_transport(&self, e: reqwest::Error) -> EmbeddingError {
        if e.is_timeout() {
            EmbeddingError::Timeout(self.timeout_secs)
        } else {
            EmbeddingError::RequestFailed(e.to_string())
        }
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let input = preprocess(text, self.max_input_chars);
        if input.is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }

        self.retry
            .run_if(|| self.request(&input), EmbeddingError::is_retryable)
            .await
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// Extract the vector from any of the supported response shapes:
/// `{"vector": [..]}`, `{"embedding": [..]}`, `{"embeddings": [[..]]}` or
/// `{"data": [{"embedding": [..]}]}`.
pub(crate) fn parse_embedding_response(body: &str) -> Result<Vec<f32>, EmbeddingError> {
    let json: Value = serde_json::from_str(body)
        .map_err(|e| EmbeddingError::MalformedResponse(format!("invalid JSON: {}", e)))?;

    let raw = json
        .get("vector")
        .or_else(|| json.get("embedding"))
        .or_else(|| json.get("embeddings").and_then(|e| e.get(0)))
        .or_else(|| {
            json.get("data")
                .and_then(|d| d.get(0))
                .and_then(|d| d.get("embedding"))
        })
        .ok_or_else(|| EmbeddingError::MalformedResponse("no embedding vector found".to_string()))?;

    let values = raw
        .as_array()
        .ok_or_else(|| EmbeddingError::MalformedResponse("embedding is not an array".to_string()))?;

    values
        .iter()
        .enumerate()
        .map(|(i, v)| match v {
            Value::Number(n) => n.as_f64().map(|f| f as f32).ok_or_else(|| {
                EmbeddingError::MalformedResponse(format!("component {} is not a float", i))
            }),
            Value::Null => Err(EmbeddingError::NonFiniteValue(i)),
            other => Err(EmbeddingError::MalformedResponse(format!(
                "component {} is not numeric: {}",
                i, other
            ))),
        })
        .collect()
}
