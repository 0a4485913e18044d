/// Maximal Marginal Relevance diversity reranking: pure functions over an
/// input slice, with a similarity cache scoped to a single rerank call.

use std::collections::HashMap;

use crate::config::Config;
use crate::retrieval::vector::cosine_similarity;

#[derive(Debug, Clone)]
pub struct MmrItem {
    pub product_id: i64,
    pub relevance: f64,
    pub embedding: Option<Vec<f32>>,
}

fn pairwise_similarity(cache: &mut HashMap<(i64, i64), f64>, a: &MmrItem, b: &MmrItem) -> f64 {
    let key = if a.product_id <= b.product_id {
        (a.product_id, b.product_id)
    } else {
        (b.product_id, a.product_id)
    };
    if let Some(&sim) = cache.get(&key) {
        return sim;
    }
    let sim = match (&a.embedding, &b.embedding) {
        (Some(ea), Some(eb)) => cosine_similarity(ea, eb),
        _ => 0.0,
    };
    cache.insert(key, sim);
    sim
}

/// Reranks `sorted_items` (already sorted descending by relevance). The
/// caller decides whether to invoke this at all — only when the list is
/// larger than `mmr_return_size` and MMR is enabled.
pub fn rerank(sorted_items: &[MmrItem], cfg: &Config) -> Vec<MmrItem> {
    let pure_k = cfg.mmr_pure_top_k.min(sorted_items.len());
    let mut selected: Vec<MmrItem> = sorted_items[..pure_k].to_vec();
    let mut remaining: Vec<MmrItem> = sorted_items[pure_k..].to_vec();
    let mut cache: HashMap<(i64, i64), f64> = HashMap::new();

    while selected.len() < cfg.mmr_return_size && !remaining.is_empty() {
        let window_start = selected.len().saturating_sub(cfg.mmr_window_size);
        let window = &selected[window_start..];

        let mut best_index: Option<usize> = None;
        let mut best_mu = f64::NEG_INFINITY;

        for (index, candidate) in remaining.iter().enumerate() {
            if candidate.relevance < cfg.mmr_min_score {
                continue;
            }
            let mut max_sim = 0.0f64;
            for w in window {
                let sim = pairwise_similarity(&mut cache, candidate, w);
                if sim > max_sim {
                    max_sim = sim;
                }
            }
            let mu = cfg.mmr_lambda * candidate.relevance - (1.0 - cfg.mmr_lambda) * max_sim;
            if mu > best_mu {
                best_mu = mu;
                best_index = Some(index);
            }
        }

        match best_index {
            Some(index) => selected.push(remaining.remove(index)),
            None => break,
        }
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: i64, relevance: f64, embedding: Option<Vec<f32>>) -> MmrItem {
        MmrItem { product_id: id, relevance, embedding }
    }

    fn test_config() -> Config {
        let mut cfg = Config::default();
        cfg.mmr_return_size = 3;
        cfg.mmr_pure_top_k = 1;
        cfg.mmr_window_size = 2;
        cfg.mmr_lambda = 0.7;
        cfg.mmr_min_score = 0.0;
        cfg
    }

    #[test]
    fn pure_top_k_is_kept_unchanged() {
        let cfg = test_config();
        let items = vec![
            item(1, 0.9, Some(vec![1.0, 0.0])),
            item(2, 0.8, Some(vec![1.0, 0.0])), // identical to 1, should be deprioritized
            item(3, 0.7, Some(vec![0.0, 1.0])), // orthogonal, should win over 2
        ];
        let result = rerank(&items, &cfg);
        assert_eq!(result[0].product_id, 1);
    }

    #[test]
    fn diversifies_against_near_duplicates() {
        let cfg = test_config();
        let items = vec![
            item(1, 0.9, Some(vec![1.0, 0.0])),
            item(2, 0.85, Some(vec![1.0, 0.0])), // near-duplicate of 1
            item(3, 0.6, Some(vec![0.0, 1.0])),  // diverse, lower relevance
        ];
        let result = rerank(&items, &cfg);
        // item 3 should be picked before item 2 despite lower relevance,
        // because item 2 is nearly identical to the already-selected item 1.
        let pos3 = result.iter().position(|i| i.product_id == 3).unwrap();
        let pos2 = result.iter().position(|i| i.product_id == 2).unwrap();
        assert!(pos3 < pos2);
    }

    #[test]
    fn stops_early_when_no_candidate_meets_min_score() {
        let mut cfg = test_config();
        cfg.mmr_min_score = 0.5;
        cfg.mmr_return_size = 5;
        let items = vec![
            item(1, 0.9, None),
            item(2, 0.4, None),
            item(3, 0.3, None),
        ];
        let result = rerank(&items, &cfg);
        assert!(result.len() < cfg.mmr_return_size);
    }

    #[test]
    fn missing_embeddings_treated_as_zero_similarity() {
        let cfg = test_config();
        let items = vec![
            item(1, 0.9, None),
            item(2, 0.8, None),
            item(3, 0.7, None),
        ];
        let result = rerank(&items, &cfg);
        assert_eq!(result.len(), 3);
    }

    #[test]
    fn is_idempotent_on_its_own_output() {
        let cfg = test_config();
        let items = vec![
            item(1, 0.9, Some(vec![1.0, 0.0])),
            item(2, 0.85, Some(vec![1.0, 0.0])),
            item(3, 0.6, Some(vec![0.0, 1.0])),
        ];
        let first = rerank(&items, &cfg);
        let second = rerank(&first, &cfg);
        let ids_first: Vec<i64> = first.iter().map(|i| i.product_id).collect();
        let ids_second: Vec<i64> = second.iter().map(|i| i.product_id).collect();
        assert_eq!(ids_first, ids_second);
    }
}
