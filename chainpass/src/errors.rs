// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{chain::ChainError, notifications::TxStatus};
use once_cell::sync::Lazy;
use regex::Regex;

static REVERT_REASON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:reverted with reason string '([^']*)'|execution reverted:?\s*(.*))")
        .expect("static regex")
});

/// A failed write, classified by what the user should be told.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TransactionError {
    #[error("Insufficient funds to complete this transaction")]
    InsufficientFunds,
    #[error("Transaction was rejected in your wallet")]
    UserRejected,
    #[error("Transaction reverted: {reason}")]
    Reverted { reason: String },
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Transaction failed: {0}")]
    Failed(String),
}

impl TransactionError {
    pub fn reverted(reason: impl Into<String>) -> Self {
        TransactionError::Reverted {
            reason: reason.into(),
        }
    }

    /// Classify a raw failure message from a wallet or node.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("insufficient funds") {
            return TransactionError::InsufficientFunds;
        }
        if lower.contains("user rejected")
            || lower.contains("user denied")
            || lower.contains("rejected the request")
        {
            return TransactionError::UserRejected;
        }
        if lower.contains("revert") {
            let reason = REVERT_REASON
                .captures(message)
                .and_then(|caps| caps.get(1).or_else(|| caps.get(2)))
                .map(|m| m.as_str().trim().to_string())
                .filter(|reason| !reason.is_empty())
                .unwrap_or_else(|| "the contract rejected the transaction".to_string());
            return TransactionError::Reverted { reason };
        }
        TransactionError::Failed(message.to_string())
    }

    pub fn status(&self) -> TxStatus {
        match self {
            TransactionError::UserRejected => TxStatus::Rejected,
            _ => TxStatus::Error,
        }
    }

    /// Whether this failure counts towards switching on mock mode. Declining in the wallet
    /// and bad form input say nothing about the chain.
    pub fn counts_as_chain_failure(&self) -> bool {
        !matches!(
            self,
            TransactionError::UserRejected | TransactionError::InvalidInput(_)
        )
    }
}

impl From<&ChainError> for TransactionError {
    fn from(error: &ChainError) -> Self {
        if error.is_user_rejection() {
            return TransactionError::UserRejected;
        }
        match error {
            ChainError::Reverted(reason) => TransactionError::reverted(reason.clone()),
            other => TransactionError::classify(&other.to_string()),
        }
    }
}

impl From<ChainError> for TransactionError {
    fn from(error: ChainError) -> Self {
        TransactionError::from(&error)
    }
}
