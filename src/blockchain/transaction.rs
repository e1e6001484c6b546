use serde::{Deserialize, Serialize};
use thiserror::Error;

use std::fmt;

use super::crypto::{verify_signature, Address, CryptoError, DigitalSignature};

/// Errors that can occur during transaction operations
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Crypto error: {0}")]
    CryptoError(#[from] CryptoError),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// A transfer of `amount` from `payer` to `payee`.
///
/// Field declaration order is the canonical order: serde emits fields in
/// declaration order, and the canonical JSON is both the signing payload and
/// part of the owning block's digest input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    amount: f64,
    payer: Address,
    payee: Address,
}

impl Transaction {
    /// Creates a new transaction
    ///
    /// No validation happens here: amounts may be negative and identities
    /// need not be real keys. Authorization is checked by the chain through
    /// the payer's signature.
    pub fn new(amount: f64, payer: Address, payee: Address) -> Self {
        Transaction {
            amount,
            payer,
            payee,
        }
    }

    pub fn amount(&self) -> f64 {
        self.amount
    }

    pub fn payer(&self) -> &Address {
        &self.payer
    }

    pub fn payee(&self) -> &Address {
        &self.payee
    }

    /// Canonical JSON form, e.g. `{"amount":50.0,"payer":"..","payee":".."}`
    ///
    /// JSON has no encoding for NaN or infinities (serde_json writes them all
    /// as `null`), so a non-finite amount has no canonical form.
    pub fn to_canonical_string(&self) -> Result<String, TransactionError> {
        if !self.amount.is_finite() {
            return Err(TransactionError::SerializationError(format!(
                "Amount {} has no canonical form",
                self.amount
            )));
        }

        serde_json::to_string(self).map_err(|e| TransactionError::SerializationError(e.to_string()))
    }

    /// Converts the transaction to bytes for signing
    pub fn to_bytes(&self) -> Result<Vec<u8>, TransactionError> {
        Ok(self.to_canonical_string()?.into_bytes())
    }

    /// Verifies `signature` over this transaction with `public_key`
    ///
    /// Pure: the same inputs always give the same answer. A key that does not
    /// decode is reported as an error, a mismatching signature as `Ok(false)`.
    pub fn verify(
        &self,
        public_key: &Address,
        signature: &DigitalSignature,
    ) -> Result<bool, TransactionError> {
        let public_key = public_key.to_public_key()?;
        let message = self.to_bytes()?;

        verify_signature(&message, signature, &public_key).map_err(TransactionError::from)
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_canonical_string() {
            Ok(canonical) => f.write_str(&canonical),
            Err(_) => write!(
                f,
                "{{amount: {}, payer: {}, payee: {}}}",
                self.amount, self.payer, self.payee
            ),
        }
    }
}
