//! Error types for the pot ledger.

use crate::Action;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown action: {0:?}")]
pub struct UnknownAction(pub String);

/// A transaction request rejected at the boundary, before any block is built.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TxError {
    #[error("actor must not be blank")]
    BlankActor,
    #[error("amount must be a positive number, got {0}")]
    NonPositiveAmount(f64),
    #[error("{0} is not a transaction action")]
    NotATransaction(Action),
    #[error("withdrawals are disabled for this pot")]
    WithdrawalsDisabled,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("malformed signature: {0}")]
    Malformed(String),
    #[error("could not recover signer: {0}")]
    Recovery(String),
    #[error("signature does not match wallet address (recovered {recovered}, declared {declared})")]
    AddressMismatch { recovered: String, declared: String },
}

/// A persisted row that cannot be turned back into a block.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    #[error("row {row}: missing field `{field}`")]
    MissingField { row: usize, field: &'static str },
    #[error("row {row}: invalid value {value:?} for field `{field}`")]
    InvalidValue {
        row: usize,
        field: &'static str,
        value: String,
    },
    #[error("row {row}: {source}")]
    Action {
        row: usize,
        #[source]
        source: UnknownAction,
    },
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Tx(#[from] TxError),
    #[error(transparent)]
    Signature(#[from] SignatureError),
    #[error("pending transaction was prepared against {expected} but the tip is now {actual}")]
    StalePending { expected: String, actual: String },
    #[error("pending transaction message does not match its locked fields")]
    MessageMismatch,
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

pub type Result<T, E = LedgerError> = std::result::Result<T, E>;
