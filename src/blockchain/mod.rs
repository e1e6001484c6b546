// Blockchain module
//
// This module contains the ledger implementation:
// - Transaction structure and its canonical form
// - Block structure and digest
// - Proof of work puzzle
// - Blockchain structure
// - Cryptography utilities and wallets

pub mod block;
pub mod chain;
pub mod crypto;
pub mod proof;
pub mod transaction;
pub mod wallet;

// Re-export main components for easier access
pub use block::Block;
pub use chain::{Blockchain, BlockchainError};
pub use crypto::{Address, DigitalSignature};
pub use proof::{CancellationToken, MiningOptions};
pub use transaction::Transaction;
pub use wallet::Wallet;
