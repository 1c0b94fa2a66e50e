use crate::core::accounts::AccountType;
use crate::core::classify::IncomeCategory;
use crate::core::rates::{CapitalIncomeRates, FilingStatus, ShareIncomeRates, YearRates};
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Tax on a positive amount.
///
/// Flat-rate accounts (equity savings, pensions, child savings) ignore the income
/// category and apply the account's rate. Everything else follows the category's
/// schedule. Zero or negative amounts always give zero: losses belong in the loss
/// ledger or the capital income balance.
pub fn compute_tax(
    rates: &YearRates,
    category: IncomeCategory,
    amount: Decimal,
    account_type: Option<AccountType>,
) -> Decimal {
    if amount <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    if let Some(rate) = account_type.and_then(|a| rates.flat_rate(a)) {
        return amount * rate;
    }
    match category {
        IncomeCategory::ShareIncome => {
            share_income_tax(&rates.share_income, amount, Decimal::ZERO).total
        }
        IncomeCategory::CapitalIncome => capital_income_tax(&rates.capital_income, amount),
        IncomeCategory::TaxExempt => Decimal::ZERO,
    }
}

/// Share income tax split into the two progression bands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ShareIncomeTax {
    #[schemars(with = "f64")]
    pub taxable: Decimal,
    #[schemars(with = "f64")]
    pub low_band_amount: Decimal,
    #[schemars(with = "f64")]
    pub low_band_tax: Decimal,
    #[schemars(with = "f64")]
    pub high_band_amount: Decimal,
    #[schemars(with = "f64")]
    pub high_band_tax: Decimal,
    #[schemars(with = "f64")]
    pub total: Decimal,
}

/// Progressive share income tax. `already_assessed` is share income taxed
/// earlier in the same year; it uses up the low band first.
pub fn share_income_tax(
    rates: &ShareIncomeRates,
    amount: Decimal,
    already_assessed: Decimal,
) -> ShareIncomeTax {
    let taxable = amount.max(Decimal::ZERO);
    let low_band_left = (rates.threshold - already_assessed.max(Decimal::ZERO)).max(Decimal::ZERO);
    let low_band_amount = taxable.min(low_band_left);
    let high_band_amount = taxable - low_band_amount;
    let low_band_tax = low_band_amount * rates.low_rate;
    let high_band_tax = high_band_amount * rates.high_rate;
    ShareIncomeTax {
        taxable,
        low_band_amount,
        low_band_tax,
        high_band_amount,
        high_band_tax,
        total: low_band_tax + high_band_tax,
    }
}

/// Tax on positive net capital income: base rate up to the surtax threshold,
/// then base plus surtax capped at the ceiling.
pub fn capital_income_tax(rates: &CapitalIncomeRates, amount: Decimal) -> Decimal {
    if amount <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    let below = amount.min(rates.surtax_threshold);
    let above = amount - below;
    below * rates.base_rate + above * rates.marginal_rate_above_threshold()
}

/// Value of a negative capital income as a tax reduction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CapitalIncomeDeduction {
    /// Size of the loss (positive)
    #[schemars(with = "f64")]
    pub loss: Decimal,
    #[schemars(with = "f64")]
    pub threshold: Decimal,
    #[schemars(with = "f64")]
    pub lower_tier_amount: Decimal,
    #[schemars(with = "f64")]
    pub lower_tier_rate: Decimal,
    #[schemars(with = "f64")]
    pub upper_tier_amount: Decimal,
    #[schemars(with = "f64")]
    pub upper_tier_rate: Decimal,
    #[schemars(with = "f64")]
    pub value: Decimal,
}

/// Deduction value of `net` capital income when it is negative. Positive
/// input yields an all-zero deduction.
pub fn capital_income_deduction(
    rates: &CapitalIncomeRates,
    net: Decimal,
    filing: FilingStatus,
) -> CapitalIncomeDeduction {
    let loss = (-net).max(Decimal::ZERO);
    let threshold = rates.deduction_threshold(filing);
    let lower_tier_rate = rates.municipal_deduction_rate + rates.deduction_supplement_rate;
    let upper_tier_rate = rates.municipal_deduction_rate;
    let lower_tier_amount = loss.min(threshold);
    let upper_tier_amount = loss - lower_tier_amount;
    CapitalIncomeDeduction {
        loss,
        threshold,
        lower_tier_amount,
        lower_tier_rate,
        upper_tier_amount,
        upper_tier_rate,
        value: lower_tier_amount * lower_tier_rate + upper_tier_amount * upper_tier_rate,
    }
}
