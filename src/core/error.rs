use crate::core::accounts::{AccountType, AssetType};
use crate::core::ledger::PoolKey;
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Domain errors raised by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaxError {
    #[error("asset type '{asset}' is not allowed on account type {account}")]
    UnsupportedCombination {
        account: AccountType,
        asset: AssetType,
    },
    #[error("loss pool {0} has been forfeited")]
    PoolClosed(PoolKey),
    #[error("no rates configured for tax year {0}")]
    InvalidYear(i32),
    #[error("{field} must not be negative, got {amount}")]
    NegativeQuantity { field: &'static str, amount: Decimal },
    #[error("unknown account '{0}'")]
    UnknownAccount(String),
    #[error("record belongs to tax year {record}, not {expected}")]
    YearMismatch { record: i32, expected: i32 },
    #[error("loss pool {pool} would go negative: balance {balance}, withdrawal {amount}")]
    BalanceUnderflow {
        pool: PoolKey,
        balance: Decimal,
        amount: Decimal,
    },
    #[error("rate table misconfigured: {0}")]
    RateTableMisconfigured(String),
    #[error("account id '{0}' is used by more than one account")]
    DuplicateAccount(String),
    #[error("account id must not be empty")]
    EmptyAccountId,
}

impl TaxError {
    /// Fatal errors abort the whole run. The rest only reject the record they came from.
    pub fn is_fatal(&self) -> bool {
        match self {
            TaxError::UnsupportedCombination { .. }
            | TaxError::PoolClosed(_)
            | TaxError::NegativeQuantity { .. }
            | TaxError::UnknownAccount(_)
            | TaxError::YearMismatch { .. }
            | TaxError::DuplicateAccount(_)
            | TaxError::EmptyAccountId => false,
            TaxError::InvalidYear(_)
            | TaxError::BalanceUnderflow { .. }
            | TaxError::RateTableMisconfigured(_) => true,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TaxError::UnsupportedCombination { .. } => "UnsupportedCombination",
            TaxError::PoolClosed(_) => "PoolClosed",
            TaxError::InvalidYear(_) => "InvalidYear",
            TaxError::NegativeQuantity { .. } => "NegativeQuantity",
            TaxError::UnknownAccount(_) => "UnknownAccount",
            TaxError::YearMismatch { .. } => "YearMismatch",
            TaxError::BalanceUnderflow { .. } => "BalanceUnderflow",
            TaxError::RateTableMisconfigured(_) => "RateTableMisconfigured",
            TaxError::DuplicateAccount(_) => "DuplicateAccount",
            TaxError::EmptyAccountId => "EmptyAccountId",
        }
    }
}

/// Which input record a per-record error came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordRef {
    Transaction { index: usize, asset_id: String },
    Holding { index: usize, asset_id: String },
    Dividend { index: usize, asset_id: String },
    Account { index: usize, account_id: String },
}

/// A record rejected by the engine; the rest of the run goes on without it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RecordError {
    pub record: RecordRef,
    /// Error kind, e.g. `UnsupportedCombination`
    pub error: String,
    pub message: String,
}

impl RecordError {
    pub fn new(record: RecordRef, error: &TaxError) -> Self {
        RecordError {
            record,
            error: error.kind().to_string(),
            message: error.to_string(),
        }
    }
}
