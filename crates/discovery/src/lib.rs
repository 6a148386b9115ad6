//! # Serendipity Discovery
//!
//! Finds "serendipitous paths" between one account and its best-matching
//! peers: groups of items with a shared common core and a unique branch on
//! each side.
//!
//! ## Pipeline
//!
//! ```text
//! account items ──> rank peers (top-k) ──> cluster each pair (bounded)
//!                                                  │
//!                       one scheduler per match group (concurrent)
//!                                                  │
//!            pick lowest balance score ──> oracle ──> accept / reject
//!                          ▲                                 │
//!                          └──── rescore with exclusions ◄───┘
//!                                                  │
//!                        deduplicate ──> remap row ids ──> sink
//! ```
//!
//! ## Usage
//!
//! ```no_run
//! use serendipity_discovery::{
//!     CancelFlag, DiscoveryConfig, DiscoveryEngine, MemoryItemSource, MemorySink,
//!     ScriptedOracle,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> serendipity_discovery::Result<()> {
//! let source = Arc::new(MemoryItemSource::new());
//! let engine = DiscoveryEngine::new(
//!     DiscoveryConfig::default(),
//!     source.clone(),
//!     source,
//!     Arc::new(ScriptedOracle::default()),
//!     Arc::new(MemorySink::new()),
//! )?;
//! let report = engine.run_account(&"alice".into(), &CancelFlag::new()).await?;
//! println!("{} paths", report.paths_emitted);
//! # Ok(())
//! # }
//! ```

mod collaborators;
mod config;
mod engine;
mod error;
mod exclusion;
mod fs_source;
mod memory;
pub mod oracle;
mod report;
mod scheduler;
pub mod validator;
mod work;

pub use collaborators::{
    CancelFlag, ItemSource, Oracle, OracleFailure, OracleReply, PathSink, PeerDirectory,
};
pub use config::{DiscoveryConfig, DuplicatePolicy, PeerSimilarity};
pub use engine::{DiscoveryEngine, RankedPeer};
pub use error::{DiscoveryError, Result};
pub use exclusion::ExclusionSet;
pub use fs_source::{DirectoryItemSource, DirectoryPeers, JsonlPathSink};
pub use memory::{MemoryItemSource, MemorySink, ScriptedOracle};
pub use oracle::{OracleRequest, Outcome, Proposal, RejectReason};
pub use report::{MatchGroupReport, RunReport};
pub use scheduler::{Cohort, CohortState, PathScheduler, ScheduleResult, ScheduleStats, Step};
pub use work::{majority_category, AccountItems, ClusterWork, MatchGroup, Remaining, RowTable};
