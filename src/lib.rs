//! Vestige - forensic scanning and carving engine
//!
//! Recovers known file types from raw images by magic-byte carving,
//! annotates directory trees with content-type and rule-based matches,
//! and computes multi-algorithm digests in a single read pass. No
//! filesystem metadata is trusted on the carve path.

pub mod carver;
pub mod cli;
pub mod error;
pub mod hasher;
pub mod pool;
pub mod rules;
pub mod scanner;
pub mod signatures;

pub use carver::{CarveResult, Carver};
pub use error::{EngineError, Result};
pub use hasher::{calculate_hashes, HashResult};
pub use pool::{CancelToken, Task, WorkerPool};
pub use rules::{DisabledRules, RuleMatch, RuleMatcher, RuleSet};
pub use scanner::{stream_walk, FoundItem, ScanResult, Scanner, WalkEntry};
pub use signatures::{match_signature, Signature, SIGNATURES};

/// Liveness reply for the process surface.
#[derive(Debug, Clone)]
pub struct Pong {
    pub status: String,
    pub timestamp: i64,
}

pub fn ping() -> Pong {
    Pong {
        status: "OK".to_string(),
        timestamp: chrono::Utc::now().timestamp(),
    }
}
