/// Combines a fused candidate's base score, a Thompson sample, and a price
/// penalty into a final score. Independent scoring functions with colocated
/// tests; deterministic fallback hashing uses `xxhash-rust`.

use crate::bandit::{ArmKey, BanditState};
use crate::config::Config;

/// A candidate ready for scoring. Distinct from `fusion::FusedCandidate` so
/// the pipeline's fallback-all and padding candidates (which have no real
/// fusion result) can be represented without inventing a fake one.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub product_id: i64,
    pub rrf_score: Option<f64>,
    pub similarity: Option<f64>,
    pub is_padding: bool,
}

impl From<&crate::fusion::FusedCandidate> for Candidate {
    fn from(fused: &crate::fusion::FusedCandidate) -> Self {
        Candidate {
            product_id: fused.product_id,
            rrf_score: Some(fused.rrf_score),
            similarity: fused.similarity,
            is_padding: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub product_id: i64,
    pub score: f64,
    pub base_score: f64,
    pub thompson_weight: f64,
    pub price_factor: f64,
}

/// Stable fallback score for a `(main_id, rec_id)` pair with no retrieval
/// signal at all, mapped into `band`. Stable across calls for the same pair.
pub fn fallback_hash_score(main_id: i64, rec_id: i64, band: (f64, f64)) -> f64 {
    let mut bytes = Vec::with_capacity(16);
    bytes.extend_from_slice(&main_id.to_le_bytes());
    bytes.extend_from_slice(&rec_id.to_le_bytes());
    let h = xxhash_rust::xxh3::xxh3_64(&bytes);
    let frac = h as f64 / u64::MAX as f64;
    band.0 + frac * (band.1 - band.0)
}

/// `hash(main_id * C + rec_id)`, used to order padding candidates
/// deterministically. `C` is fixed and large enough to avoid collisions
/// between `(main_id, rec_id)` pairs for realistic catalog id ranges.
const PADDING_ORDER_MULTIPLIER: i64 = 1_000_000_007;

pub fn padding_order_key(main_id: i64, rec_id: i64) -> u64 {
    let combined = main_id.wrapping_mul(PADDING_ORDER_MULTIPLIER).wrapping_add(rec_id);
    xxhash_rust::xxh3::xxh3_64(&combined.to_le_bytes())
}

fn base_score(main_id: i64, candidate: &Candidate) -> f64 {
    if let Some(rrf) = candidate.rrf_score {
        return rrf;
    }
    if let Some(sim) = candidate.similarity {
        return sim;
    }
    let band = if candidate.is_padding { (0.3, 0.5) } else { (0.1, 0.5) };
    fallback_hash_score(main_id, candidate.product_id, band)
}

fn similarity_prior(candidate: &Candidate) -> f64 {
    candidate.similarity.or(candidate.rrf_score).unwrap_or(0.1)
}

fn price_factor(main_price: Option<f64>, candidate_price: Option<f64>, threshold: f64, pmax: f64) -> f64 {
    let (Some(main_price), Some(candidate_price)) = (main_price, candidate_price) else {
        return 1.0;
    };
    if main_price <= 0.0 || candidate_price <= 0.0 {
        return 1.0;
    }
    let ratio = candidate_price / main_price;
    if ratio <= threshold {
        return 1.0;
    }
    let penalty = (pmax * (ratio - threshold) / threshold).min(pmax);
    1.0 - penalty
}

pub struct Scorer<'a> {
    bandit: &'a BanditState,
    config: &'a Config,
}

impl<'a> Scorer<'a> {
    pub fn new(bandit: &'a BanditState, config: &'a Config) -> Self {
        Scorer { bandit, config }
    }

    pub fn score(
        &self,
        main_id: i64,
        main_price: Option<f64>,
        candidate: &Candidate,
        candidate_price: Option<f64>,
    ) -> ScoredCandidate {
        let base = base_score(main_id, candidate);
        let prior = similarity_prior(candidate);
        let key: ArmKey = (main_id, candidate.product_id);
        let thompson_weight = self.bandit.sample(key, Some(prior));
        let price_factor = price_factor(
            main_price,
            candidate_price,
            self.config.price_threshold,
            self.config.price_penalty_max,
        );

        let combined = if self.config.demo_mode {
            let w = self.config.ts_base_weight_demo;
            w * base + (1.0 - w) * thompson_weight
        } else {
            let n = self.bandit.feedback_count(key, self.config.ts_update_strength_normal) as f64;
            let k = self.config.ts_weight_halflife;
            let gamma = n / (n + k);
            (1.0 - gamma) * base + gamma * thompson_weight
        };

        let score = (combined * price_factor).clamp(0.0, 1.0);
        let score = (score * 1000.0).round() / 1000.0;

        ScoredCandidate {
            product_id: candidate.product_id,
            score,
            base_score: base,
            thompson_weight,
            price_factor,
        }
    }
}
