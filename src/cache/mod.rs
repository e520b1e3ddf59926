//! Two-tier prompt cache: L1 exact-text, L2 vector similarity (§4.5).
//!
//! Every L2 write also appears in L1 in the same call; an L1 entry may exist
//! without an L2 counterpart only if the embedding step failed (§3 invariant).

pub mod l1;
pub mod vector_store;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;

use self::l1::L1Cache;
use self::vector_store::{CachedPoint, VectorStoreClient, VectorStoreConfig};
use crate::inference::{InferenceClient, InferenceError};

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("embedding failed: {0}")]
    Embedding(#[from] InferenceError),
    #[error("vector store unavailable: {0}")]
    VectorStore(#[from] vector_store::VectorStoreError),
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub l1_size: usize,
    pub l1_capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub l2_available: bool,
    pub l2_entries: u64,
}

struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    l2_entries: AtomicU64,
}

/// Owns the inference client (for embeddings) and the vector-store client,
/// plus the L1 map guarded by a single mutex (§5).
pub struct TwoTierCache {
    l1: Mutex<L1Cache>,
    vector_store: VectorStoreClient,
    inference: std::sync::Arc<InferenceClient>,
    embed_model: String,
    embed_deadline: Duration,
    counters: Counters,
}

impl TwoTierCache {
    pub fn new(
        l1_capacity: usize,
        vector_store_config: VectorStoreConfig,
        inference: std::sync::Arc<InferenceClient>,
        embed_model: impl Into<String>,
        embed_deadline: Duration,
    ) -> Self {
        Self {
            l1: Mutex::new(L1Cache::new(l1_capacity)),
            vector_store: VectorStoreClient::new(vector_store_config),
            inference,
            embed_model: embed_model.into(),
            embed_deadline,
            counters: Counters {
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                l2_entries: AtomicU64::new(0),
            },
        }
    }

    /// L1 exact match, then L2 semantic match (§4.5 read path).
    pub async fn get(&self, prompt: &str) -> Option<String> {
        {
            let mut l1 = self.l1.lock().await;
            if let Some(hit) = l1.get(prompt) {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                return Some(hit);
            }
        }

        let embedding = match self.inference.embed(&self.embed_model, prompt, self.embed_deadline).await {
            Ok(embedding) => embedding,
            Err(e) => {
                tracing::warn!(error = %e, "cache: embedding failed on read, treating as miss");
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        match self.vector_store.query_nearest(embedding).await {
            Ok(Some(point)) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                Some(point.response)
            }
            Ok(None) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "cache: vector store query failed, treating as miss");
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Always writes L1; best-effort write to L2 (§4.5 write path).
    pub async fn put(&self, prompt: String, enhanced: String) {
        {
            let mut l1 = self.l1.lock().await;
            l1.put(prompt.clone(), enhanced.clone());
        }

        let embedding = match self.inference.embed(&self.embed_model, &prompt, self.embed_deadline).await {
            Ok(embedding) => embedding,
            Err(e) => {
                tracing::warn!(error = %e, "cache: embedding failed on write, L1-only entry");
                return;
            }
        };

        let point = CachedPoint { prompt, response: enhanced };
        match self.vector_store.upsert(embedding, point).await {
            Ok(()) => {
                self.counters.l2_entries.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::warn!(error = %e, "cache: vector store upsert failed, L1-only entry");
            }
        }
    }

    pub async fn clear(&self) {
        {
            let mut l1 = self.l1.lock().await;
            l1.clear();
        }
        self.counters.l2_entries.store(0, Ordering::Relaxed);
        if let Err(e) = self.vector_store.clear().await {
            tracing::warn!(error = %e, "cache: failed to clear vector store collection");
        }
    }

    pub async fn stats(&self) -> CacheStats {
        let l1 = self.l1.lock().await;
        let hits = self.counters.hits.load(Ordering::Relaxed);
        let misses = self.counters.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            l1_size: l1.len(),
            l1_capacity: l1.capacity(),
            hits,
            misses,
            hit_rate: if total == 0 { 0.0 } else { hits as f64 / total as f64 },
            l2_available: true,
            l2_entries: self.counters.l2_entries.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache_with_no_vector_store() -> TwoTierCache {
        TwoTierCache::new(
            10,
            VectorStoreConfig { base_url: String::new(), ..Default::default() },
            std::sync::Arc::new(InferenceClient::new("http://127.0.0.1:1")),
            "embed-model",
            Duration::from_millis(50),
        )
    }

    #[tokio::test]
    async fn l1_hit_short_circuits_before_embedding() {
        let cache = cache_with_no_vector_store();
        cache.put("hi".to_string(), "ENH(hi)".to_string()).await;
        assert_eq!(cache.get("hi").await, Some("ENH(hi)".to_string()));
        assert_eq!(cache.stats().await.hits, 1);
    }

    #[tokio::test]
    async fn miss_falls_through_to_l2_and_counts_as_miss_on_failure() {
        let cache = cache_with_no_vector_store();
        assert_eq!(cache.get("never seen").await, None);
        assert_eq!(cache.stats().await.misses, 1);
    }

    #[tokio::test]
    async fn clear_resets_l1_size() {
        let cache = cache_with_no_vector_store();
        cache.put("a".to_string(), "A".to_string()).await;
        cache.clear().await;
        assert_eq!(cache.stats().await.l1_size, 0);
    }
}
