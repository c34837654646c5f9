// Qdrant-compatible Similarity Index Client
//
// Concept: Nearest-neighbor lookup over catalog item vectors via the REST API
// Endpoint: POST {base}/collections/{collection}/points/search
//           {"vector", "limit", "with_payload": true} → {"result": [{"id", "score", "payload"}]}
//
// Error classification (drives the single-retry policy):
// - Transient: connect/timeout failures, 5xx, 429
// - Permanent: other 4xx (e.g. missing collection), malformed body

use crate::capabilities::{IndexError, IndexHit, SimilarityIndex};
use crate::clients::{body_excerpt, endpoint};
use crate::types::{EmbeddingVector, Metadata};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Payload field holding the catalog item id
const PRODUCT_ID_KEY: &str = "product_id";

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    vector: &'a [f32],
    limit: usize,
    with_payload: bool,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    result: Vec<ScoredPoint>,
}

#[derive(Debug, Deserialize)]
struct ScoredPoint {
    id: Value,
    score: f32,
    #[serde(default)]
    payload: Option<Map<String, Value>>,
}

pub struct QdrantIndex {
    client: Client,
    base_url: String,
    collection: String,
}

impl QdrantIndex {
    pub fn new(client: Client, base_url: &str, collection: &str) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
            collection: collection.to_string(),
        }
    }

    fn search_url(&self) -> String {
        endpoint(
            &self.base_url,
            &format!("collections/{}/points/search", self.collection),
        )
    }
}

#[async_trait]
impl SimilarityIndex for QdrantIndex {
    async fn nearest_neighbors(
        &self,
        vector: &EmbeddingVector,
        top_n: usize,
    ) -> Result<Vec<IndexHit>, IndexError> {
        let request = SearchRequest {
            vector: &vector.values,
            limit: top_n,
            with_payload: true,
        };

        let response = self
            .client
            .post(self.search_url())
            .json(&request)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!(
                "collection '{}' search returned {}: {}",
                self.collection,
                status,
                body_excerpt(&body)
            );
            return Err(if is_transient_status(status) {
                IndexError::Transient(message)
            } else {
                IndexError::Permanent(message)
            });
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| IndexError::Permanent(format!("malformed search response: {}", e)))?;

        Ok(parsed.result.into_iter().map(point_to_hit).collect())
    }
}

fn classify_transport_error(e: reqwest::Error) -> IndexError {
    if e.is_timeout() || e.is_connect() || e.is_request() {
        IndexError::Transient(format!("index request failed: {}", e))
    } else {
        IndexError::Permanent(format!("index request failed: {}", e))
    }
}

fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

/// Scored point → hit; scalar payload fields become metadata
fn point_to_hit(point: ScoredPoint) -> IndexHit {
    let payload = point.payload.unwrap_or_default();

    let item_id = payload
        .get(PRODUCT_ID_KEY)
        .and_then(scalar_to_string)
        .filter(|id| !id.is_empty())
        .or_else(|| scalar_to_string(&point.id))
        .unwrap_or_default();

    let metadata: Metadata = payload
        .iter()
        .filter_map(|(key, value)| field_to_string(value).map(|v| (key.clone(), v)))
        .collect();

    IndexHit {
        item_id,
        score: point.score,
        metadata,
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Scalars as-is; arrays of scalars joined with ", " (read back as a value set)
fn field_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(scalar_to_string).collect();
            (!parts.is_empty()).then(|| parts.join(", "))
        }
        other => scalar_to_string(other),
    }
}
