use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::crypto::sha256_hex;
use super::proof::is_valid_proof;
use super::transaction::{Transaction, TransactionError};

/// Upper bound (inclusive) of the random nonce a new block starts from
pub const MAX_INITIAL_NONCE: u64 = 999_999_999;

/// Errors that can occur while hashing a block
#[derive(Debug, Error)]
pub enum BlockError {
    #[error("Transaction error: {0}")]
    TransactionError(#[from] TransactionError),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Represents a block in the blockchain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Hash of the previous block, `None` for genesis
    pub previous_hash: Option<String>,

    /// The transfer recorded by this block
    pub transaction: Transaction,

    /// Timestamp when the block was created
    pub timestamp: DateTime<Utc>,

    /// Random seed of the proof-of-work puzzle
    pub nonce: u64,

    /// Solution found for `nonce` before the block was appended
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solution: Option<u64>,
}

/// The fields that make up the digest input, in canonical order
#[derive(Serialize)]
struct HashInput<'a> {
    previous_hash: &'a Option<String>,
    transaction: &'a Transaction,
    timestamp: &'a DateTime<Utc>,
    nonce: u64,
}

impl Block {
    /// Creates a new block stamped with the current time
    pub fn new(previous_hash: Option<String>, transaction: Transaction) -> Self {
        Self::with_timestamp(previous_hash, transaction, Utc::now())
    }

    /// Creates a new block with an explicit timestamp and a random nonce
    pub fn with_timestamp(
        previous_hash: Option<String>,
        transaction: Transaction,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Block {
            previous_hash,
            transaction,
            timestamp,
            nonce: rand::thread_rng().gen_range(0..=MAX_INITIAL_NONCE),
            solution: None,
        }
    }

    /// Calculates the hash of the block
    ///
    /// SHA-256 over the canonical JSON of the previous hash, the transaction,
    /// the timestamp and the current nonce, hex encoded. Never cached; the
    /// result always reflects the block's current fields.
    pub fn hash(&self) -> Result<String, BlockError> {
        let input = HashInput {
            previous_hash: &self.previous_hash,
            transaction: &self.transaction,
            timestamp: &self.timestamp,
            nonce: self.nonce,
        };

        let block_string = serde_json::to_string(&input)
            .map_err(|e| BlockError::SerializationError(e.to_string()))?;

        Ok(sha256_hex(block_string.as_bytes()))
    }

    /// Records the mining solution, finishing the candidate
    pub fn seal(self, solution: u64) -> Self {
        Block {
            solution: Some(solution),
            ..self
        }
    }

    pub fn is_genesis(&self) -> bool {
        self.previous_hash.is_none()
    }

    /// Checks if the recorded solution solves the puzzle for this nonce
    pub fn has_valid_proof(&self) -> bool {
        self.solution
            .map(|solution| is_valid_proof(self.nonce, solution))
            .unwrap_or(false)
    }
}
