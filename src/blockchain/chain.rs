use log::{debug, info, warn};
use parking_lot::Mutex;
use thiserror::Error;

use std::sync::Arc;

use super::block::{Block, BlockError};
use super::crypto::{Address, DigitalSignature};
use super::proof::{mine, MiningError, MiningOptions};
use super::transaction::{Transaction, TransactionError};

/// Amount of the bootstrap transfer recorded in the genesis block
pub const GENESIS_AMOUNT: f64 = 100.0;
pub const GENESIS_PAYER: &str = "genesis";
pub const GENESIS_PAYEE: &str = "satoshi";

/// Errors that can occur during blockchain operations
#[derive(Debug, Error)]
pub enum BlockchainError {
    #[error("Transaction error: {0}")]
    TransactionError(#[from] TransactionError),

    #[error("Block error: {0}")]
    BlockError(#[from] BlockError),

    #[error("Mining error: {0}")]
    MiningError(#[from] MiningError),

    #[error("Invalid chain: {0}")]
    InvalidChain(String),
}

/// The shared ledger
///
/// Cloning gives another handle to the same chain. Appends are serialized by
/// `append_lock`, held from signature check to push, so a block always links
/// to the real tail even when several threads submit at once. The block
/// vector has its own lock, taken only briefly, so readers never wait for a
/// running mining search.
#[derive(Debug, Clone)]
pub struct Blockchain {
    chain: Arc<Mutex<Vec<Block>>>,
    append_lock: Arc<Mutex<()>>,
}

impl Default for Blockchain {
    fn default() -> Self {
        Self::new()
    }
}

impl Blockchain {
    /// Creates a new blockchain holding only the genesis block
    pub fn new() -> Self {
        Blockchain {
            chain: Arc::new(Mutex::new(vec![Self::genesis_block()])),
            append_lock: Arc::new(Mutex::new(())),
        }
    }

    fn genesis_block() -> Block {
        Block::new(None, genesis_transaction())
    }

    /// Gets the last block in the chain
    pub fn last_block(&self) -> Block {
        let chain = self.chain.lock();
        // The vector always holds at least the genesis block.
        chain[chain.len() - 1].clone()
    }

    /// Gets the entire blockchain
    pub fn get_chain(&self) -> Vec<Block> {
        self.chain.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.chain.lock().len()
    }

    /// False by invariant: the constructor installs the genesis block and
    /// blocks are never removed
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Verifies, mines and appends a block for `transaction`
    ///
    /// `signature` must be the payer's signature over the canonical form of
    /// `transaction`, checked against `payer_public_key`. On rejection the
    /// chain is left untouched. Mining is unbounded, see
    /// [`Blockchain::add_block_with_options`] for a cancellable variant.
    pub fn add_block(
        &self,
        transaction: Transaction,
        payer_public_key: &Address,
        signature: &DigitalSignature,
    ) -> Result<Block, BlockchainError> {
        self.add_block_with_options(
            transaction,
            payer_public_key,
            signature,
            &MiningOptions::default(),
        )
    }

    /// Same as [`Blockchain::add_block`] with limits on the mining search
    pub fn add_block_with_options(
        &self,
        transaction: Transaction,
        payer_public_key: &Address,
        signature: &DigitalSignature,
        options: &MiningOptions,
    ) -> Result<Block, BlockchainError> {
        let _append_guard = self.append_lock.lock();

        match transaction.verify(payer_public_key, signature) {
            Ok(true) => {}
            Ok(false) => {
                warn!("Rejected transaction {}: invalid signature", transaction);
                return Err(TransactionError::InvalidSignature.into());
            }
            Err(err) => {
                warn!("Rejected transaction {}: {}", transaction, err);
                return Err(err.into());
            }
        }

        // The tail cannot move while `_append_guard` is held.
        let previous_hash = self.last_block().hash()?;
        let candidate = Block::new(Some(previous_hash), transaction);
        debug!("Mining candidate block with nonce {}", candidate.nonce);

        let proof = mine(candidate.nonce, options)?;
        let block = candidate.seal(proof.solution);

        let index = {
            let mut chain = self.chain.lock();
            chain.push(block.clone());
            chain.len() - 1
        };
        info!(
            "Appended block {} after {} attempts in {:?}",
            index, proof.attempts, proof.elapsed
        );

        Ok(block)
    }

    /// Validates the blockchain
    pub fn validate(&self) -> Result<(), BlockchainError> {
        let chain = self.chain.lock();
        validate_blocks(&chain)
    }

    /// true if the blockchain is valid, false otherwise
    pub fn is_valid(&self) -> bool {
        match self.validate() {
            Ok(()) => true,
            Err(err) => {
                warn!("Chain validation failed: {}", err);
                false
            }
        }
    }
}

fn genesis_transaction() -> Transaction {
    Transaction::new(
        GENESIS_AMOUNT,
        Address::from(GENESIS_PAYER),
        Address::from(GENESIS_PAYEE),
    )
}

/// Checks genesis shape, hash links and proofs of a sequence of blocks
pub fn validate_blocks(blocks: &[Block]) -> Result<(), BlockchainError> {
    let genesis = blocks
        .first()
        .ok_or_else(|| BlockchainError::InvalidChain("Chain is empty".to_string()))?;

    if !genesis.is_genesis() {
        return Err(BlockchainError::InvalidChain(
            "First block links to a previous block".to_string(),
        ));
    }

    if genesis.transaction != genesis_transaction() {
        return Err(BlockchainError::InvalidChain(format!(
            "First block does not hold the genesis transaction: {}",
            genesis.transaction
        )));
    }

    for (i, pair) in blocks.windows(2).enumerate() {
        let (previous_block, current_block) = (&pair[0], &pair[1]);
        let index = i + 1;

        let expected = previous_block.hash()?;
        if current_block.previous_hash.as_deref() != Some(expected.as_str()) {
            return Err(BlockchainError::InvalidChain(format!(
                "Block {} does not link to block {}",
                index, i
            )));
        }

        if !current_block.has_valid_proof() {
            return Err(BlockchainError::InvalidChain(format!(
                "Block {} has no valid proof of work",
                index
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::crypto::KeyPair;
    use crate::blockchain::proof::CancellationToken;

    use std::time::Duration;

    fn signed_transfer(payer: &KeyPair, payee: &Address, amount: f64) -> (Transaction, DigitalSignature) {
        let transaction = Transaction::new(amount, payer.address().clone(), payee.clone());
        let signature = payer.sign(&transaction.to_bytes().unwrap());
        (transaction, signature)
    }

    #[test]
    fn test_new_blockchain() {
        let blockchain = Blockchain::new();
        let chain = blockchain.get_chain();

        assert_eq!(chain.len(), 1);
        assert!(chain[0].is_genesis());
        assert_eq!(chain[0].transaction.amount(), 100.0);
        assert_eq!(chain[0].transaction.payer(), &Address::from("genesis"));
        assert_eq!(chain[0].transaction.payee(), &Address::from("satoshi"));
        assert_eq!(blockchain.last_block(), chain[0]);
        assert!(!blockchain.is_empty());
        assert!(blockchain.is_valid());
    }

    #[test]
    fn test_add_block() {
        let blockchain = Blockchain::new();
        let payer = KeyPair::generate();
        let payee = KeyPair::generate();
        let genesis_hash = blockchain.last_block().hash().unwrap();

        let (transaction, signature) = signed_transfer(&payer, payee.address(), 50.0);
        let block = blockchain
            .add_block(transaction.clone(), payer.address(), &signature)
            .unwrap();

        assert_eq!(blockchain.len(), 2);
        assert_eq!(block.previous_hash, Some(genesis_hash));
        assert_eq!(block.transaction, transaction);
        assert!(block.has_valid_proof());
        assert_eq!(blockchain.last_block(), block);
        assert!(blockchain.is_valid());
    }

    #[test]
    fn test_rejects_signature_over_other_transaction() {
        let blockchain = Blockchain::new();
        let payer = KeyPair::generate();
        let payee = KeyPair::generate();

        let (_, signature) = signed_transfer(&payer, payee.address(), 50.0);
        let submitted = Transaction::new(5000.0, payer.address().clone(), payee.address().clone());

        let result = blockchain.add_block(submitted, payer.address(), &signature);

        assert!(matches!(
            result,
            Err(BlockchainError::TransactionError(TransactionError::InvalidSignature))
        ));
        assert_eq!(blockchain.len(), 1);
    }

    #[test]
    fn test_rejects_non_finite_amount() {
        let blockchain = Blockchain::new();
        let payer = KeyPair::generate();
        let payee = KeyPair::generate();

        // JSON writes every non-finite float as null, so a signature over the
        // null form must not admit an infinite or NaN transfer.
        let null_form = format!(
            r#"{{"amount":null,"payer":"{}","payee":"{}"}}"#,
            payer.address(),
            payee.address()
        );
        let signature = payer.sign(null_form.as_bytes());

        for amount in [f64::INFINITY, f64::NEG_INFINITY, f64::NAN] {
            let submitted = Transaction::new(amount, payer.address().clone(), payee.address().clone());
            let result = blockchain.add_block(submitted, payer.address(), &signature);

            assert!(matches!(
                result,
                Err(BlockchainError::TransactionError(TransactionError::SerializationError(_)))
            ));
        }
        assert_eq!(blockchain.len(), 1);

        // Swapping an appended amount for a non-finite one cannot keep the digest
        let (transaction, signature) = signed_transfer(&payer, payee.address(), 5.0);
        blockchain.add_block(transaction, payer.address(), &signature).unwrap();
        let (transaction, signature) = signed_transfer(&payer, payee.address(), 6.0);
        blockchain.add_block(transaction, payer.address(), &signature).unwrap();

        let mut tampered = blockchain.get_chain();
        tampered[1].transaction = Transaction::new(f64::NAN, payer.address().clone(), payee.address().clone());
        assert!(matches!(
            validate_blocks(&tampered),
            Err(BlockchainError::BlockError(_))
        ));
    }

    #[test]
    fn test_rejects_undecodable_key() {
        let blockchain = Blockchain::new();
        let payer = KeyPair::generate();
        let (transaction, signature) = signed_transfer(&payer, &Address::from("satoshi"), 1.0);

        let result = blockchain.add_block(transaction, &Address::from("genesis"), &signature);

        assert!(matches!(
            result,
            Err(BlockchainError::TransactionError(TransactionError::CryptoError(_)))
        ));
        assert_eq!(blockchain.len(), 1);
    }

    #[test]
    fn test_cancelled_mining_leaves_chain_unchanged() {
        let blockchain = Blockchain::new();
        let payer = KeyPair::generate();
        let (transaction, signature) = signed_transfer(&payer, &Address::from("satoshi"), 1.0);

        let token = CancellationToken::new();
        token.cancel();
        let options = MiningOptions::default().with_cancellation(token);

        let result = blockchain.add_block_with_options(transaction, payer.address(), &signature, &options);
        assert!(matches!(
            result,
            Err(BlockchainError::MiningError(MiningError::Cancelled { .. }))
        ));
        assert_eq!(blockchain.len(), 1);

        let (transaction, signature) = signed_transfer(&payer, &Address::from("satoshi"), 1.0);
        let options = MiningOptions::default().with_timeout(Duration::ZERO);
        let result = blockchain.add_block_with_options(transaction, payer.address(), &signature, &options);
        assert!(matches!(
            result,
            Err(BlockchainError::MiningError(MiningError::TimedOut { .. }))
        ));
        assert_eq!(blockchain.len(), 1);
    }

    #[test]
    fn test_cancel_running_search_from_another_thread() {
        let mut cancelled_mid_search = false;

        // The candidate nonce is random, so a search may finish before the
        // cancel lands; retry with a fresh chain until one is caught running.
        for _ in 0..20 {
            let blockchain = Blockchain::new();
            let payer = KeyPair::generate();
            let (transaction, signature) = signed_transfer(&payer, &Address::from("satoshi"), 1.0);

            let token = CancellationToken::new();
            let options = MiningOptions::default().with_cancellation(token.clone());

            let miner = {
                let blockchain = blockchain.clone();
                std::thread::spawn(move || {
                    blockchain.add_block_with_options(transaction, payer.address(), &signature, &options)
                })
            };

            std::thread::sleep(Duration::from_millis(2));
            // Readers are not held up by the running search
            let observed_len = blockchain.len();
            token.cancel();

            match miner.join().unwrap() {
                Err(BlockchainError::MiningError(MiningError::Cancelled { attempts })) => {
                    assert_eq!(blockchain.len(), 1);
                    assert!(blockchain.is_valid());
                    if attempts > 0 {
                        assert_eq!(observed_len, 1);
                        cancelled_mid_search = true;
                        break;
                    }
                }
                Ok(_) => assert_eq!(blockchain.len(), 2),
                Err(err) => panic!("unexpected error: {}", err),
            }
        }

        assert!(cancelled_mid_search);
    }

    #[test]
    fn test_chain_integrity() {
        let blockchain = Blockchain::new();
        let payer = KeyPair::generate();
        let payee = KeyPair::generate();

        for amount in [1.0, 2.0, 3.0] {
            let (transaction, signature) = signed_transfer(&payer, payee.address(), amount);
            blockchain.add_block(transaction, payer.address(), &signature).unwrap();
        }

        let chain = blockchain.get_chain();
        assert_eq!(chain.len(), 4);
        for pair in chain.windows(2) {
            assert_eq!(pair[1].previous_hash, Some(pair[0].hash().unwrap()));
        }
        assert!(validate_blocks(&chain).is_ok());
    }

    #[test]
    fn test_tampering_is_detected() {
        let blockchain = Blockchain::new();
        let payer = KeyPair::generate();
        let payee = KeyPair::generate();

        for amount in [10.0, 20.0] {
            let (transaction, signature) = signed_transfer(&payer, payee.address(), amount);
            blockchain.add_block(transaction, payer.address(), &signature).unwrap();
        }
        let chain = blockchain.get_chain();

        let mut tampered = chain.clone();
        tampered[1].transaction = Transaction::new(1_000_000.0, payer.address().clone(), payee.address().clone());
        assert!(validate_blocks(&tampered).is_err());

        let mut tampered = chain.clone();
        tampered[1].transaction = Transaction::new(10.0, payee.address().clone(), payee.address().clone());
        assert!(validate_blocks(&tampered).is_err());

        let mut tampered = chain.clone();
        tampered[1].timestamp = tampered[1].timestamp + chrono::Duration::seconds(1);
        assert!(validate_blocks(&tampered).is_err());

        let mut tampered = chain.clone();
        tampered[1].nonce = tampered[1].nonce.wrapping_add(1);
        assert!(validate_blocks(&tampered).is_err());

        // The genesis block is covered by the link from block 1
        let mut tampered = chain.clone();
        tampered[0].transaction = Transaction::new(1.0, Address::from("genesis"), Address::from("satoshi"));
        assert!(validate_blocks(&tampered).is_err());

        // Tampering inside the shared ledger itself
        assert!(blockchain.is_valid());
        {
            let mut guard = blockchain.chain.lock();
            guard[1].transaction = Transaction::new(0.0, payer.address().clone(), payee.address().clone());
        }
        assert!(!blockchain.is_valid());
    }

    #[test]
    fn test_forged_solution_is_detected() {
        let blockchain = Blockchain::new();
        let payer = KeyPair::generate();
        let (transaction, signature) = signed_transfer(&payer, &Address::from("satoshi"), 1.0);
        blockchain.add_block(transaction, payer.address(), &signature).unwrap();

        let mut chain = blockchain.get_chain();
        let nonce = chain[1].nonce;
        let bad_solution = (1..)
            .find(|candidate| !crate::blockchain::proof::is_valid_proof(nonce, *candidate))
            .unwrap();
        chain[1].solution = Some(bad_solution);
        assert!(validate_blocks(&chain).is_err());

        chain[1].solution = None;
        assert!(validate_blocks(&chain).is_err());
    }

    #[test]
    fn test_empty_and_rootless_sequences_are_invalid() {
        assert!(matches!(validate_blocks(&[]), Err(BlockchainError::InvalidChain(_))));

        let chain = Blockchain::new().get_chain();
        let mut rootless = chain.clone();
        rootless[0].previous_hash = Some("00".to_string());
        assert!(validate_blocks(&rootless).is_err());

        let mut altered_genesis = chain.clone();
        altered_genesis[0].transaction =
            Transaction::new(GENESIS_AMOUNT, Address::from(GENESIS_PAYER), Address::from("mallory"));
        assert!(matches!(
            validate_blocks(&altered_genesis),
            Err(BlockchainError::InvalidChain(_))
        ));

        let mut altered_amount = chain;
        altered_amount[0].transaction =
            Transaction::new(1.0, Address::from(GENESIS_PAYER), Address::from(GENESIS_PAYEE));
        assert!(validate_blocks(&altered_amount).is_err());
        assert!(validate_blocks(&Blockchain::new().get_chain()).is_ok());
    }

    #[test]
    fn test_concurrent_appends_link_to_the_true_tail() {
        let blockchain = Blockchain::new();

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let blockchain = blockchain.clone();
                std::thread::spawn(move || {
                    let payer = KeyPair::generate();
                    let (transaction, signature) =
                        signed_transfer(&payer, &Address::from("satoshi"), i as f64);
                    blockchain.add_block(transaction, payer.address(), &signature).unwrap();
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(blockchain.len(), 5);
        assert!(blockchain.is_valid());
    }
}
