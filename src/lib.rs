//! A minimal proof-of-work ledger.
//!
//! Wallets sign transfers, the [`Blockchain`](blockchain::Blockchain)
//! checks the signature, mines a small puzzle and appends a hash-linked block.

pub mod blockchain;
