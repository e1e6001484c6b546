use super::block::Block;
use super::chain::{Blockchain, BlockchainError};
use super::crypto::{Address, DigitalSignature, KeyPair};
use super::transaction::{Transaction, TransactionError};

/// A participant holding a keypair
///
/// Only the public key and signatures ever leave the wallet.
#[derive(Debug)]
pub struct Wallet {
    keypair: KeyPair,
}

impl Default for Wallet {
    fn default() -> Self {
        Self::new()
    }
}

impl Wallet {
    /// Creates a new wallet with a random keypair
    pub fn new() -> Self {
        Wallet {
            keypair: KeyPair::generate(),
        }
    }

    /// Gets the wallet's public key, which doubles as its payment address
    pub fn public_key(&self) -> &Address {
        self.keypair.address()
    }

    /// Signs the canonical form of `transaction`
    pub fn sign(&self, transaction: &Transaction) -> Result<DigitalSignature, TransactionError> {
        let message = transaction.to_bytes()?;
        Ok(self.keypair.sign(&message))
    }

    /// Sends `amount` to `payee` through `chain`
    ///
    /// Blocks until the new block is mined. Returns the appended block, or
    /// the reason the chain refused it.
    pub fn send_money(
        &self,
        chain: &Blockchain,
        amount: f64,
        payee: &Address,
    ) -> Result<Block, BlockchainError> {
        let transaction = Transaction::new(amount, self.public_key().clone(), payee.clone());
        let signature = self.sign(&transaction)?;

        chain.add_block(transaction, self.public_key(), &signature)
    }
}
