//! L2 tier: a remote vector-store client. Embeddings are unit-normalized on
//! both write and query so the configured score is cosine similarity of unit
//! vectors, equivalently a dot product (§9 Open Questions, embedding normalization).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum VectorStoreError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("vector store returned non-2xx status: {0}")]
    Status(u16),
    #[error("failed to parse vector store response: {0}")]
    Parse(String),
}

#[derive(Debug, Clone)]
pub struct VectorStoreConfig {
    pub base_url: String,
    pub collection: String,
    pub dimension: usize,
    pub similarity_threshold: f32,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            collection: "prompt_cache".to_string(),
            dimension: 768,
            similarity_threshold: 0.85,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedPoint {
    pub prompt: String,
    pub response: String,
}

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    id: String,
    vector: &'a [f32],
    payload: &'a CachedPoint,
}

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    vector: &'a [f32],
    limit: u32,
    score_threshold: f32,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    points: Vec<QueryPoint>,
}

#[derive(Debug, Deserialize)]
struct QueryPoint {
    payload: CachedPoint,
}

/// Normalize `vector` to unit length in place. A zero vector is left as-is.
pub fn unit_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

pub struct VectorStoreClient {
    client: reqwest::Client,
    config: VectorStoreConfig,
}

impl VectorStoreClient {
    pub fn new(config: VectorStoreConfig) -> Self {
        Self { client: reqwest::Client::new(), config }
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.config.base_url.trim_end_matches('/'), self.config.collection)
    }

    /// Upsert one point, unit-normalizing `embedding` first.
    pub async fn upsert(&self, mut embedding: Vec<f32>, point: CachedPoint) -> Result<(), VectorStoreError> {
        unit_normalize(&mut embedding);
        let body = UpsertRequest { id: Uuid::new_v4().to_string(), vector: &embedding, payload: &point };
        let response = self
            .client
            .put(format!("{}/points", self.collection_url()))
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(VectorStoreError::Status(response.status().as_u16()));
        }
        Ok(())
    }

    /// Query for the single nearest point at or above the configured threshold.
    pub async fn query_nearest(&self, mut embedding: Vec<f32>) -> Result<Option<CachedPoint>, VectorStoreError> {
        unit_normalize(&mut embedding);
        let body = QueryRequest { vector: &embedding, limit: 1, score_threshold: self.config.similarity_threshold };
        let response = self
            .client
            .post(format!("{}/points/search", self.collection_url()))
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(VectorStoreError::Status(response.status().as_u16()));
        }
        let parsed: QueryResponse = response.json().await.map_err(|e| VectorStoreError::Parse(e.to_string()))?;
        Ok(parsed.points.into_iter().next().map(|p| p.payload))
    }

    /// Drop and recreate the collection with the configured dimension.
    pub async fn clear(&self) -> Result<(), VectorStoreError> {
        let _ = self.client.delete(self.collection_url()).send().await?;
        let response = self
            .client
            .put(self.collection_url())
            .json(&serde_json::json!({ "vectors": { "size": self.config.dimension, "distance": "Cosine" } }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(VectorStoreError::Status(response.status().as_u16()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_normalize_produces_unit_length() {
        let mut v = vec![3.0, 4.0];
        unit_normalize(&mut v);
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn unit_normalize_leaves_zero_vector_alone() {
        let mut v = vec![0.0, 0.0];
        unit_normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0]);
    }
}
