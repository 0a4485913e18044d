/// Candidate retrieval channels: vector similarity and precomputed LLM
/// recommendations. Both channels are non-fatal — a failure degrades to an
/// empty result and a logged warning rather than aborting the ranking
/// pipeline.

pub mod llm;
pub mod vector;

use async_trait::async_trait;

use crate::catalog::Product;

/// One hit from the vector-similarity channel.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub product_id: i64,
    pub similarity: f64,
}

/// One hit from the offline LLM-recommendation channel.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmHit {
    pub product_id: i64,
    pub rec_rank: i32,
    pub resolved_rank: i32,
    pub match_score: Option<f64>,
}

/// Returns accessories ranked by cosine similarity to a main product's
/// embedding. Never returns an error to the caller — failures are logged and
/// reported as an empty list.
#[async_trait]
pub trait VectorSearch: Send + Sync {
    async fn similar(&self, main: &Product, limit: usize) -> Vec<VectorHit>;
}

/// Returns the precomputed offline LLM candidate list for a main product.
/// Never returns an error to the caller, for the same reason as `VectorSearch`.
#[async_trait]
pub trait LlmSource: Send + Sync {
    async fn recommendations(&self, main_id: i64) -> Vec<LlmHit>;
}
