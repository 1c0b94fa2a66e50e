//! Classification of (account type, asset type) pairs.

use crate::core::accounts::{AccountType, AssetType};
use crate::core::error::TaxError;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum IncomeCategory {
    ShareIncome,
    CapitalIncome,
    TaxExempt,
}

impl fmt::Display for IncomeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IncomeCategory::ShareIncome => "share income",
            IncomeCategory::CapitalIncome => "capital income",
            IncomeCategory::TaxExempt => "tax exempt",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaxationMethod {
    /// Taxed when sold
    Realization,
    /// Taxed on the yearly change in market value (lagerbeskatning)
    MarkToMarket,
}

impl fmt::Display for TaxationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TaxationMethod::Realization => "realization",
            TaxationMethod::MarkToMarket => "mark-to-market",
        })
    }
}

/// Kind of loss pool an asset's losses land in.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum PoolKind {
    ListedShare,
    UnlistedShare,
    FinancialContract,
    AskIsolated,
    PensionIsolated,
}

impl fmt::Display for PoolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PoolKind::ListedShare => "listed shares",
            PoolKind::UnlistedShare => "unlisted shares",
            PoolKind::FinancialContract => "financial contracts",
            PoolKind::AskIsolated => "equity savings account",
            PoolKind::PensionIsolated => "pension account",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Classification {
    pub income_category: IncomeCategory,
    pub taxation_method: TaxationMethod,
    /// `None` when losses go to the capital income balance or are tax free
    pub loss_pool: Option<PoolKind>,
}

pub fn is_allowed(account_type: AccountType, asset_type: AssetType) -> bool {
    account_type.allowed_asset_types().contains(&asset_type)
}

pub fn forbidden_asset_types(account_type: AccountType) -> Vec<AssetType> {
    AssetType::ALL
        .into_iter()
        .filter(|asset| !is_allowed(account_type, *asset))
        .collect()
}

/// Classify a holding. Fails if the account type does not permit the asset type.
pub fn classify(
    account_type: AccountType,
    asset_type: AssetType,
) -> Result<Classification, TaxError> {
    if !is_allowed(account_type, asset_type) {
        return Err(TaxError::UnsupportedCombination {
            account: account_type,
            asset: asset_type,
        });
    }

    let taxation_method = if account_type.forces_mark_to_market() {
        TaxationMethod::MarkToMarket
    } else {
        intrinsic_method(asset_type)
    };

    let income_category = if account_type.is_tax_exempt() {
        IncomeCategory::TaxExempt
    } else {
        intrinsic_category(asset_type)
    };

    let loss_pool = match account_type {
        AccountType::GeneralBrokerage => brokerage_pool(asset_type),
        other => isolated_pool_kind(other),
    };

    Ok(Classification {
        income_category,
        taxation_method,
        loss_pool,
    })
}

/// Pool kind holding the losses of an isolated account. `None` for general
/// brokerage (shared pools) and tax-free accounts.
pub fn isolated_pool_kind(account_type: AccountType) -> Option<PoolKind> {
    match account_type {
        AccountType::GeneralBrokerage | AccountType::ChildSavings => None,
        AccountType::EquitySavings => Some(PoolKind::AskIsolated),
        AccountType::RatePension
        | AccountType::AgeSavings
        | AccountType::CapitalPension
        | AccountType::LifeAnnuity => Some(PoolKind::PensionIsolated),
    }
}

fn intrinsic_method(asset_type: AssetType) -> TaxationMethod {
    match asset_type {
        AssetType::ListedShareDomestic
        | AssetType::ListedShareForeign
        | AssetType::UnlistedShare
        | AssetType::FundDistributing
        | AssetType::Bond
        | AssetType::Crypto => TaxationMethod::Realization,
        AssetType::EtfApproved
        | AssetType::EtfNotApproved
        | AssetType::EtfBondBased
        | AssetType::FundAccumulating
        | AssetType::FundAccumulatingNotApproved
        | AssetType::MixedFundEquity
        | AssetType::MixedFundBond
        | AssetType::FinancialContract => TaxationMethod::MarkToMarket,
    }
}

fn intrinsic_category(asset_type: AssetType) -> IncomeCategory {
    match asset_type {
        AssetType::ListedShareDomestic
        | AssetType::ListedShareForeign
        | AssetType::UnlistedShare
        | AssetType::EtfApproved
        | AssetType::FundDistributing
        | AssetType::FundAccumulating
        | AssetType::MixedFundEquity => IncomeCategory::ShareIncome,
        AssetType::EtfNotApproved
        | AssetType::EtfBondBased
        | AssetType::FundAccumulatingNotApproved
        | AssetType::MixedFundBond
        | AssetType::Bond
        | AssetType::FinancialContract
        | AssetType::Crypto => IncomeCategory::CapitalIncome,
    }
}

fn brokerage_pool(asset_type: AssetType) -> Option<PoolKind> {
    match asset_type {
        AssetType::UnlistedShare => Some(PoolKind::UnlistedShare),
        AssetType::FinancialContract => Some(PoolKind::FinancialContract),
        other => match intrinsic_category(other) {
            IncomeCategory::ShareIncome => Some(PoolKind::ListedShare),
            IncomeCategory::CapitalIncome | IncomeCategory::TaxExempt => None,
        },
    }
}
