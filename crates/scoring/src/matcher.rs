use crate::error::{Result, ScoringError};
use ndarray::ArrayView2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serendipity_protocol::AccountId;
use serendipity_vector_store::{
    optimal_assignment_similarity, sampled_match_similarity, MatchStrategy, SimilarityIndex,
};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// A candidate peer with its aggregate similarity to the current account.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerScore {
    pub account: AccountId,
    pub similarity: f32,
}

impl Eq for PeerScore {}

impl Ord for PeerScore {
    /// Higher similarity ranks first; on ties the smaller id ranks first.
    fn cmp(&self, other: &Self) -> Ordering {
        self.similarity
            .total_cmp(&other.similarity)
            .then_with(|| other.account.cmp(&self.account))
    }
}

impl PartialOrd for PeerScore {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Bounded accumulator keeping the `k` best peers seen so far.
#[derive(Debug)]
pub struct PeerRanking {
    k: usize,
    heap: BinaryHeap<Reverse<PeerScore>>,
}

impl PeerRanking {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            heap: BinaryHeap::with_capacity(k + 1),
        }
    }

    /// Offer a peer. Returns whichever peer is not retained: the evicted
    /// worst one, or `peer` itself when it does not make the cut.
    pub fn offer(&mut self, peer: PeerScore) -> Option<PeerScore> {
        if self.k == 0 {
            return Some(peer);
        }
        if self.heap.len() < self.k {
            self.heap.push(Reverse(peer));
            return None;
        }
        match self.heap.peek() {
            Some(Reverse(worst)) if peer > *worst => {
                let evicted = self.heap.pop().map(|Reverse(p)| p);
                self.heap.push(Reverse(peer));
                evicted
            }
            _ => Some(peer),
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Best first.
    pub fn into_sorted(self) -> Vec<PeerScore> {
        let mut peers: Vec<PeerScore> = self.heap.into_iter().map(|Reverse(p)| p).collect();
        peers.sort_by(|a, b| b.cmp(a));
        peers
    }
}

/// Ranks candidate peer accounts by aggregate embedding similarity.
#[derive(Debug, Clone)]
pub struct AccountMatcher {
    top_k: usize,
    strategy: MatchStrategy,
    seed: u64,
}

impl AccountMatcher {
    pub fn new(top_k: usize, strategy: MatchStrategy, seed: u64) -> Result<Self> {
        if let MatchStrategy::Sampled { sample_size: 0 } = strategy {
            return Err(ScoringError::InvalidConfig(
                "sample_size must be > 0".to_string(),
            ));
        }
        Ok(Self {
            top_k,
            strategy,
            seed,
        })
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn ranking(&self) -> PeerRanking {
        PeerRanking::new(self.top_k)
    }

    /// Account similarity between the current account and one peer.
    ///
    /// The sampled strategy draws the same current-side sample for every
    /// peer, so peers are compared against identical evidence.
    pub fn score_peer(&self, current: ArrayView2<f32>, peer: ArrayView2<f32>) -> Result<f32> {
        let similarity = match self.strategy {
            MatchStrategy::Exact => optimal_assignment_similarity(current, peer)?,
            MatchStrategy::Sampled { sample_size } => {
                let index = SimilarityIndex::new(peer.to_owned());
                let mut rng = StdRng::seed_from_u64(self.seed);
                sampled_match_similarity(current, &index, sample_size, &mut rng)?
            }
        };
        Ok(similarity)
    }

    /// Top-k peers, best first. Peers whose score cannot be computed are skipped.
    pub fn rank<'a>(
        &self,
        current: ArrayView2<f32>,
        peers: impl IntoIterator<Item = (AccountId, ArrayView2<'a, f32>)>,
    ) -> Vec<PeerScore> {
        let mut ranking = self.ranking();
        for (account, embeddings) in peers {
            match self.score_peer(current, embeddings) {
                Ok(similarity) => {
                    ranking.offer(PeerScore {
                        account,
                        similarity,
                    });
                }
                Err(e) => log::warn!("Skipping peer {account}: {e}"),
            }
        }
        ranking.into_sorted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};
    use pretty_assertions::assert_eq;

    fn peer(id: &str, similarity: f32) -> PeerScore {
        PeerScore {
            account: AccountId::from(id),
            similarity,
        }
    }

    #[test]
    fn ranking_keeps_top_two_in_order() {
        let mut ranking = PeerRanking::new(2);
        ranking.offer(peer("a", 0.9));
        ranking.offer(peer("b", 0.4));
        ranking.offer(peer("c", 0.7));

        let sims: Vec<f32> = ranking.into_sorted().iter().map(|p| p.similarity).collect();
        assert_eq!(sims, vec![0.9, 0.7]);
    }

    #[test]
    fn ranking_breaks_ties_by_id() {
        let mut ranking = PeerRanking::new(2);
        ranking.offer(peer("zed", 0.5));
        ranking.offer(peer("amy", 0.5));
        ranking.offer(peer("bob", 0.5));

        let ids: Vec<String> = ranking
            .into_sorted()
            .into_iter()
            .map(|p| p.account.to_string())
            .collect();
        assert_eq!(ids, vec!["amy".to_string(), "bob".to_string()]);
    }

    #[test]
    fn zero_k_keeps_nothing() {
        let mut ranking = PeerRanking::new(0);
        assert_eq!(ranking.offer(peer("a", 1.0)), Some(peer("a", 1.0)));
        assert!(ranking.into_sorted().is_empty());
    }

    #[test]
    fn offer_reports_the_peer_that_was_not_kept() {
        let mut ranking = PeerRanking::new(1);
        assert_eq!(ranking.offer(peer("a", 0.5)), None);
        assert_eq!(ranking.offer(peer("b", 0.9)), Some(peer("a", 0.5)));
        assert_eq!(ranking.offer(peer("c", 0.1)), Some(peer("c", 0.1)));
        assert_eq!(ranking.len(), 1);
        assert_eq!(ranking.into_sorted(), vec![peer("b", 0.9)]);
    }

    #[test]
    fn rank_orders_peers_by_similarity() {
        let current = array![[1.0_f32, 0.0], [0.0, 1.0]];
        let close = array![[1.0_f32, 0.0], [0.0, 1.0]];
        let far = array![[-1.0_f32, 0.0]];
        let empty = Array2::<f32>::zeros((0, 2));

        for strategy in [MatchStrategy::Exact, MatchStrategy::Sampled { sample_size: 8 }] {
            let matcher = AccountMatcher::new(5, strategy, 42).unwrap();
            let ranked = matcher.rank(
                current.view(),
                vec![
                    (AccountId::from("far"), far.view()),
                    (AccountId::from("empty"), empty.view()),
                    (AccountId::from("close"), close.view()),
                ],
            );
            let ids: Vec<&str> = ranked.iter().map(|p| p.account.as_str()).collect();
            assert_eq!(ids, vec!["close", "far"]);
        }
    }
}
