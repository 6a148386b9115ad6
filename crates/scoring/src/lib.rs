//! # Serendipity Scoring
//!
//! Decides what is worth comparing, and in which order.
//!
//! ## Components
//!
//! - [`AccountMatcher`]: ranks candidate peers by aggregate embedding
//!   similarity (exact assignment or seeded sampled nearest neighbor)
//! - [`BalanceScorer`]: raw cluster terms
//!   - `imbalance = |ln(n_current / n_peer)|`
//!   - `magnitude_factor = 1 / (n_current + n_peer)` (optional)
//!   - `distance = 1 - bipartite_similarity`
//! - [`CohortScorer`]: standardizes terms with statistics fitted once per
//!   cohort and sums them with [`BalanceWeights`]. Lower is more promising.

mod balance;
mod error;
mod matcher;

pub use balance::{BalanceScorer, BalanceWeights, CohortScorer, RawBalance, Standardizer};
pub use error::{Result, ScoringError};
pub use matcher::{AccountMatcher, PeerRanking, PeerScore};
