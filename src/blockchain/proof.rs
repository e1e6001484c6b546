use log::{debug, info};
use thiserror::Error;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Leading hex digits every puzzle hash must start with. Fixed, there is no
/// difficulty adjustment.
pub const TARGET_PREFIX: &str = "0000";

/// How many attempts pass between two deadline checks
const DEADLINE_CHECK_INTERVAL: u64 = 1024;

/// Errors that stop a mining search before it finds a solution
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MiningError {
    #[error("Mining cancelled after {attempts} attempts")]
    Cancelled { attempts: u64 },

    #[error("Mining timed out after {attempts} attempts")]
    TimedOut { attempts: u64 },
}

/// A shared flag that asks a running search to stop
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Limits for a mining search. The default is unbounded.
#[derive(Debug, Clone, Default)]
pub struct MiningOptions {
    pub cancellation: Option<CancellationToken>,
    pub timeout: Option<Duration>,
}

impl MiningOptions {
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Result of a successful search
#[derive(Debug, Clone)]
pub struct Proof {
    pub solution: u64,
    pub hash: String,
    pub attempts: u64,
    pub elapsed: Duration,
}

/// Hex MD5 of the decimal text of `nonce + solution`
pub fn puzzle_hash(nonce: u64, solution: u64) -> String {
    let attempt = nonce.wrapping_add(solution).to_string();
    format!("{:x}", md5::compute(attempt.as_bytes()))
}

/// Checks if `solution` solves the puzzle seeded by `nonce`
pub fn is_valid_proof(nonce: u64, solution: u64) -> bool {
    puzzle_hash(nonce, solution).starts_with(TARGET_PREFIX)
}

/// Searches for a solution to the puzzle seeded by `nonce`
///
/// Scans `1, 2, 3, ...` on the calling thread. Without a cancellation token
/// or timeout in `options` this only returns once a solution is found.
pub fn mine(nonce: u64, options: &MiningOptions) -> Result<Proof, MiningError> {
    let started = Instant::now();
    let deadline = options.timeout.map(|timeout| started + timeout);
    let mut solution: u64 = 1;

    info!("⛏️ mining...");

    loop {
        let attempts = solution - 1;

        if let Some(token) = &options.cancellation {
            if token.is_cancelled() {
                debug!("Mining for nonce {} cancelled", nonce);
                return Err(MiningError::Cancelled { attempts });
            }
        }

        if let Some(deadline) = deadline {
            if attempts % DEADLINE_CHECK_INTERVAL == 0 && Instant::now() >= deadline {
                debug!("Mining for nonce {} hit its deadline", nonce);
                return Err(MiningError::TimedOut { attempts });
            }
        }

        let hash = puzzle_hash(nonce, solution);

        if hash.starts_with(TARGET_PREFIX) {
            info!("Solved: {}", solution);
            return Ok(Proof {
                solution,
                hash,
                attempts: solution,
                elapsed: started.elapsed(),
            });
        }

        solution += 1;
    }
}
