//! Mark-to-market (lagerbeskatning) accrual for one account.

use crate::core::accounts::{Account, AccountType, AssetType};
use crate::core::classify::{Classification, IncomeCategory};
use crate::core::rates::YearRates;
use crate::core::tax::compute_tax;
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A mark-to-market position as given by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Holding {
    pub account_id: String,
    pub asset_id: String,
    /// Asset type name; unknown names are treated conservatively
    pub asset_type: String,
    /// Market value at the start of the year (or at purchase)
    #[schemars(with = "f64")]
    pub opening_value: Decimal,
    /// Market value at year end (or at sale)
    #[schemars(with = "f64")]
    pub closing_value: Decimal,
}

impl Holding {
    pub fn change(&self) -> Decimal {
        self.closing_value - self.opening_value
    }
}

/// A holding after its asset type has been resolved and classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkedHolding {
    pub asset_id: String,
    pub asset_type: AssetType,
    pub classification: Classification,
    pub change: Decimal,
}

/// Per-asset figure. Informational: the account-level net is what gets taxed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct IndicativeFigure {
    pub asset_id: String,
    pub asset_type: AssetType,
    pub income_category: IncomeCategory,
    #[schemars(with = "f64")]
    pub change: Decimal,
    /// Tax the asset would carry on its own
    #[schemars(with = "f64")]
    pub indicative_tax: Decimal,
    pub indicative_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AccountAccrual {
    pub account_id: String,
    pub account_type: AccountType,
    /// Sum of every unrealized change on the account
    #[schemars(with = "f64")]
    pub net_change: Decimal,
    #[schemars(with = "BTreeMap<IncomeCategory, f64>")]
    pub by_category: BTreeMap<IncomeCategory, Decimal>,
    #[schemars(with = "Option<f64>")]
    pub flat_rate: Option<Decimal>,
    /// Flat-rate tax on a positive net, before any loss carried on the account.
    /// `None` for general brokerage, which is assessed together with realized income.
    #[schemars(with = "Option<f64>")]
    pub account_tax: Option<Decimal>,
    /// A negative net on an isolated account, carried into its loss pool
    #[schemars(with = "f64")]
    pub carried_loss: Decimal,
    pub holdings: Vec<IndicativeFigure>,
}

impl AccountAccrual {
    /// What the holdings would cost if each were taxed alone. Differs from the
    /// account-level figure whenever losses net or progression kicks in.
    pub fn indicative_total(&self) -> Decimal {
        self.holdings.iter().map(|h| h.indicative_tax).sum()
    }
}

pub fn accrue(account: &Account, holdings: &[MarkedHolding], rates: &YearRates) -> AccountAccrual {
    let account_type = account.account_type;
    let mut by_category = BTreeMap::new();
    let mut figures = Vec::with_capacity(holdings.len());

    for holding in holdings {
        let category = holding.classification.income_category;
        *by_category.entry(category).or_insert(Decimal::ZERO) += holding.change;
        figures.push(IndicativeFigure {
            asset_id: holding.asset_id.clone(),
            asset_type: holding.asset_type,
            income_category: category,
            change: holding.change,
            indicative_tax: compute_tax(rates, category, holding.change, Some(account_type)),
            indicative_only: true,
        });
    }

    let net_change: Decimal = holdings.iter().map(|h| h.change).sum();
    let flat_rate = rates.flat_rate(account_type);
    let account_tax = flat_rate.map(|rate| net_change.max(Decimal::ZERO) * rate);
    let carried_loss = if account_type.is_isolated() && !account_type.is_tax_exempt() {
        (-net_change).max(Decimal::ZERO)
    } else {
        Decimal::ZERO
    };

    log::debug!(
        "accrual {}: {} holdings, net {}",
        account.id,
        holdings.len(),
        net_change
    );

    AccountAccrual {
        account_id: account.id.clone(),
        account_type,
        net_change,
        by_category,
        flat_rate,
        account_tax,
        carried_loss,
        holdings: figures,
    }
}
