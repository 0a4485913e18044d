/// Reciprocal Rank Fusion of ranked candidate channels: score accumulation
/// via a hash map, per-channel rank tracking, stable-sort tie-breaking.
/// Generalized to an arbitrary channel count.

use std::collections::{HashMap, HashSet};

/// One ranked candidate list, already ordered 1..N (1-based rank).
pub struct RankedChannel {
    pub entries: Vec<(i64, usize)>,
}

impl RankedChannel {
    pub fn from_ranked_ids(ids: impl IntoIterator<Item = i64>) -> Self {
        RankedChannel {
            entries: ids.into_iter().enumerate().map(|(i, id)| (id, i + 1)).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FusedCandidate {
    pub product_id: i64,
    pub rrf_score: f64,
    /// Per-channel rank, indexed the same way the input `channels` slice was
    /// ordered. By convention channel 0 is the vector channel and channel 1
    /// is the LLM channel.
    pub channel_ranks: Vec<Option<usize>>,
    /// Best-available vector similarity, carried through for the scorer.
    pub similarity: Option<f64>,
}

impl FusedCandidate {
    pub fn vector_rank(&self) -> Option<usize> {
        self.channel_ranks.first().copied().flatten()
    }

    pub fn llm_rank(&self) -> Option<usize> {
        self.channel_ranks.get(1).copied().flatten()
    }
}

/// Fuses `channels` into a single deduplicated, descending-sorted candidate
/// list. `similarity` supplies the best-available vector similarity per
/// product id (products absent from the map have none).
pub fn fuse(channels: &[RankedChannel], similarity: &HashMap<i64, f64>, k: f64) -> Vec<FusedCandidate> {
    let mut order: Vec<i64> = Vec::new();
    let mut seen: HashSet<i64> = HashSet::new();
    let mut scores: HashMap<i64, f64> = HashMap::new();
    let mut ranks: HashMap<i64, Vec<Option<usize>>> = HashMap::new();

    for (channel_index, channel) in channels.iter().enumerate() {
        for &(product_id, rank) in &channel.entries {
            if seen.insert(product_id) {
                order.push(product_id);
            }
            *scores.entry(product_id).or_insert(0.0) += 1.0 / (k + rank as f64);
            let entry = ranks
                .entry(product_id)
                .or_insert_with(|| vec![None; channels.len()]);
            entry[channel_index] = Some(rank);
        }
    }

    let max_possible = channels.len() as f64 / (k + 1.0);

    let mut fused: Vec<FusedCandidate> = order
        .into_iter()
        .map(|product_id| {
            let raw = scores[&product_id];
            FusedCandidate {
                product_id,
                rrf_score: if max_possible > 0.0 { raw / max_possible } else { 0.0 },
                channel_ranks: ranks.remove(&product_id).unwrap_or_default(),
                similarity: similarity.get(&product_id).copied(),
            }
        })
        .collect();

    fused.sort_by(|a, b| {
        b.rrf_score
            .partial_cmp(&a.rrf_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_channel_overlap_orders_by_combined_rank() {
        let vector = RankedChannel::from_ranked_ids([1, 2]); // A=1 rank1, B=2 rank2
        let llm = RankedChannel::from_ranked_ids([2, 3]); // B=2 rank1, C=3 rank2
        let k = 60.0;
        let fused = fuse(&[vector, llm], &HashMap::new(), k);

        let max_possible = 2.0 / (k + 1.0);
        let score = |id: i64| fused.iter().find(|c| c.product_id == id).unwrap().rrf_score;

        let expected_a = (1.0 / (k + 1.0)) / max_possible;
        let expected_b = (1.0 / (k + 2.0) + 1.0 / (k + 1.0)) / max_possible;
        let expected_c = (1.0 / (k + 2.0)) / max_possible;

        assert!((score(1) - expected_a).abs() < 1e-12);
        assert!((score(2) - expected_b).abs() < 1e-12);
        assert!((score(3) - expected_c).abs() < 1e-12);
        assert!(score(2) > score(1));
        assert!(score(1) > score(3));
    }

    #[test]
    fn ties_preserve_first_seen_order() {
        // Both channels rank a single, distinct candidate at rank 1 -> equal rrf_score.
        let vector = RankedChannel::from_ranked_ids([10]);
        let llm = RankedChannel::from_ranked_ids([20]);
        let fused = fuse(&[vector, llm], &HashMap::new(), 60.0);
        assert_eq!(fused[0].product_id, 10);
        assert_eq!(fused[1].product_id, 20);
    }

    #[test]
    fn single_channel_candidate_has_none_rank_on_other_channel() {
        let vector = RankedChannel::from_ranked_ids([1]);
        let llm = RankedChannel { entries: vec![] };
        let fused = fuse(&[vector, llm], &HashMap::new(), 60.0);
        assert_eq!(fused[0].vector_rank(), Some(1));
        assert_eq!(fused[0].llm_rank(), None);
    }
}
