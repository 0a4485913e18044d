/// Orchestrates retrieval -> fusion -> fill -> score -> rerank -> response for
/// ranking requests, and the durable-write -> bandit-update -> upsert
/// sequence for feedback. Thin sequencing over the store/retrieval modules,
/// logging at each degradation point.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bandit::{ArmKey, ArmStore, BanditState};
use crate::catalog::{CatalogStore, Product};
use crate::config::Config;
use crate::errors::RecoError;
use crate::fusion::{self, RankedChannel};
use crate::mmr::{self, MmrItem};
use crate::retrieval::{LlmSource, VectorSearch};
use crate::scoring::{self, Candidate, Scorer};

/// Not (de)serialized directly - http.rs maps this into its own
/// `RecommendationResponse` for the wire format.
#[derive(Debug, Clone)]
pub struct RecommendationItem {
    pub rank_id: i64,
    pub similarity_score: f64,
    pub created_at: DateTime<Utc>,
    pub product: Arc<Product>,
}

pub struct RankingPipeline<'a> {
    catalog: &'a CatalogStore,
    vector: &'a dyn VectorSearch,
    llm: &'a dyn LlmSource,
    bandit: &'a BanditState,
    config: &'a Config,
}

impl<'a> RankingPipeline<'a> {
    pub fn new(
        catalog: &'a CatalogStore,
        vector: &'a dyn VectorSearch,
        llm: &'a dyn LlmSource,
        bandit: &'a BanditState,
        config: &'a Config,
    ) -> Self {
        RankingPipeline { catalog, vector, llm, bandit, config }
    }

    pub async fn recommend(&self, main_id: i64) -> Result<Vec<RecommendationItem>, RecoError> {
        let main = self.catalog.get(main_id).ok_or(RecoError::NotFound { id: main_id })?;

        let vector_hits = self.vector.similar(&main, self.config.mmr_recall_size).await;
        let llm_hits_raw = self.llm.recommendations(main_id).await;

        let dropped = llm_hits_raw.len();
        let llm_hits: Vec<_> = llm_hits_raw
            .into_iter()
            .filter(|hit| self.catalog.get(hit.product_id).is_some())
            .collect();
        let dropped = dropped - llm_hits.len();
        if dropped > 0 {
            tracing::warn!(main_id, dropped, "dropped stale llm candidates before fusion");
        }

        let similarity: HashMap<i64, f64> = vector_hits.iter().map(|h| (h.product_id, h.similarity)).collect();
        let vector_channel = RankedChannel::from_ranked_ids(vector_hits.iter().map(|h| h.product_id));
        let llm_channel = RankedChannel::from_ranked_ids(llm_hits.iter().map(|h| h.product_id));

        let fused = fusion::fuse(&[vector_channel, llm_channel], &similarity, self.config.rrf_k);

        let mut candidates: Vec<Candidate> = if fused.is_empty() {
            tracing::warn!(main_id, "both retrieval channels empty, falling back to all accessories");
            self.catalog
                .accessories()
                .into_iter()
                .filter(|p| p.id != main_id)
                .map(|p| Candidate { product_id: p.id, rrf_score: Some(0.5), similarity: None, is_padding: false })
                .collect()
        } else {
            fused.iter().map(Candidate::from).collect()
        };

        if candidates.len() < self.config.mmr_return_size {
            let existing: HashSet<i64> = candidates.iter().map(|c| c.product_id).collect();
            let mut pool: Vec<Arc<Product>> = self
                .catalog
                .accessories()
                .into_iter()
                .filter(|p| p.id != main_id && !existing.contains(&p.id))
                .collect();
            pool.sort_by_key(|p| scoring::padding_order_key(main_id, p.id));

            let need = self.config.mmr_return_size - candidates.len();
            for product in pool.into_iter().take(need) {
                candidates.push(Candidate { product_id: product.id, rrf_score: None, similarity: None, is_padding: true });
            }
        }

        let scorer = Scorer::new(self.bandit, self.config);
        let mut scored: Vec<_> = candidates
            .iter()
            .map(|candidate| {
                let candidate_price = self.catalog.get(candidate.product_id).and_then(|p| p.price);
                scorer.score(main_id, main.price, candidate, candidate_price)
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        let final_list = if self.config.mmr_enabled && scored.len() > self.config.mmr_return_size {
            let mmr_items: Vec<MmrItem> = scored
                .iter()
                .map(|sc| MmrItem {
                    product_id: sc.product_id,
                    relevance: sc.score,
                    embedding: self.catalog.get(sc.product_id).and_then(|p| p.embedding.as_ref().map(|e| e.as_slice().to_vec())),
                })
                .collect();
            let reranked = mmr::rerank(&mmr_items, self.config);
            reranked
                .into_iter()
                .filter_map(|mi| scored.iter().find(|sc| sc.product_id == mi.product_id).cloned())
                .collect()
        } else {
            scored.into_iter().take(self.config.mmr_return_size).collect()
        };

        let now = Utc::now();
        let items = final_list
            .into_iter()
            .enumerate()
            .filter_map(|(i, sc)| {
                self.catalog.get(sc.product_id).map(|product| RecommendationItem {
                    rank_id: (i + 1) as i64,
                    similarity_score: sc.score,
                    created_at: now,
                    product,
                })
            })
            .collect();

        Ok(items)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub id: i64,
    pub main_id: i64,
    pub rec_id: i64,
    pub is_relevant: bool,
    pub created_at: DateTime<Utc>,
}

/// Durable counterpart of the append-only `feedback` table.
#[async_trait]
pub trait FeedbackStore: Send + Sync {
    async fn append_feedback(&self, main_id: i64, rec_id: i64, is_relevant: bool) -> Result<FeedbackRecord, RecoError>;
}

pub struct FeedbackPipeline<'a> {
    feedback_store: &'a dyn FeedbackStore,
    arm_store: &'a dyn ArmStore,
    bandit: &'a BanditState,
    update_strength: f64,
}

impl<'a> FeedbackPipeline<'a> {
    pub fn new(
        feedback_store: &'a dyn FeedbackStore,
        arm_store: &'a dyn ArmStore,
        bandit: &'a BanditState,
        update_strength: f64,
    ) -> Self {
        FeedbackPipeline { feedback_store, arm_store, bandit, update_strength }
    }

    /// Writes the feedback row first, then applies and writes through the
    /// bandit update. The write order matters: the feedback row can always
    /// rebuild an arm, so it is acknowledged even if the arm upsert fails.
    /// The inverse ordering must not occur.
    pub async fn record(&self, main_id: i64, rec_id: i64, is_relevant: bool) -> Result<FeedbackRecord, RecoError> {
        let record = self.feedback_store.append_feedback(main_id, rec_id, is_relevant).await?;

        let key: ArmKey = (main_id, rec_id);
        let arm = self.bandit.update(key, is_relevant, self.update_strength);

        if let Err(e) = self.arm_store.upsert_arm(key, arm).await {
            tracing::warn!(
                main_id, rec_id, error = %e,
                "arm upsert failed after feedback write; will reconcile on next reload_from_store"
            );
        }

        Ok(record)
    }
}
