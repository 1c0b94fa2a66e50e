pub mod accounts;
pub mod accrual;
pub mod audit;
pub mod capital;
pub mod classify;
pub mod dividends;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod rates;
pub mod records;
pub mod tax;
pub mod warnings;

// Flat public surface for domain types and functions.
#[allow(unused_imports)]
pub use accounts::{Account, AccountType, AssetType, ResolvedAssetType};
#[allow(unused_imports)]
pub use accrual::{accrue, AccountAccrual, Holding, IndicativeFigure, MarkedHolding};
pub use audit::audit_digest;
#[allow(unused_imports)]
pub use capital::{apply_event, finalize_year, CapitalIncomeBalance, CapitalIncomeFinalization};
#[allow(unused_imports)]
pub use classify::{
    classify, forbidden_asset_types, is_allowed, isolated_pool_kind, Classification,
    IncomeCategory, PoolKind, TaxationMethod,
};
#[allow(unused_imports)]
pub use dividends::{withholding_credit, Dividend, WithholdingCredit};
#[allow(unused_imports)]
pub use engine::{
    run_year, AccountLiability, AssessmentMethod, Settlement, ShareIncomeAssessment, Snapshot,
    TaxResult, TaxTransaction, YearInput,
};
#[allow(unused_imports)]
pub use error::{RecordError, RecordRef, TaxError};
#[allow(unused_imports)]
pub use ledger::{
    carryforward, spousal_transfer, Carryforward, GainNetting, LossLedger, LossPool, Netting,
    PoolDraw, PoolKey, PoolOverview, PoolStatus, SpousalTransfer,
};
#[allow(unused_imports)]
pub use rates::{FilingStatus, RateTable, TaxYear, WithholdingCreditRates, YearRates};
#[allow(unused_imports)]
pub use records::{read_transactions_csv, read_year_input, CsvColumn, TransactionRecord};
#[allow(unused_imports)]
pub use tax::{
    capital_income_deduction, capital_income_tax, compute_tax, share_income_tax,
    CapitalIncomeDeduction, ShareIncomeTax,
};
pub use warnings::Warning;
