//! Runs one tax year: opening snapshot plus the year's records in, a
//! [`TaxResult`] and the closing snapshot out.

use crate::core::accounts::{Account, AccountType, AssetType};
use crate::core::accrual::{accrue, AccountAccrual, Holding, MarkedHolding};
use crate::core::capital::{
    apply_event, finalize_year, CapitalIncomeBalance, CapitalIncomeFinalization,
};
use crate::core::classify::{
    classify, isolated_pool_kind, Classification, PoolKind, TaxationMethod,
};
use crate::core::dividends::{withholding_credit, Dividend, WithholdingCredit};
use crate::core::error::{RecordError, RecordRef, TaxError};
use crate::core::ledger::{GainNetting, LossLedger, LossPool, PoolKey, PoolOverview};
use crate::core::rates::{FilingStatus, RateTable, TaxYear, YearRates};
use crate::core::tax::{share_income_tax, ShareIncomeTax};
use crate::core::warnings::Warning;
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A realized gain (positive) or loss (negative) on a sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TaxTransaction {
    pub account_id: String,
    pub asset_id: String,
    pub asset_type: String,
    #[schemars(with = "f64")]
    pub realized_gain_loss: Decimal,
    pub year: i32,
}

/// State carried from one year to the next. The caller stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Snapshot {
    /// Year the snapshot closes
    pub year: i32,
    #[serde(default)]
    pub pools: Vec<LossPool>,
    #[serde(default)]
    pub capital_income: Option<CapitalIncomeBalance>,
}

/// Everything needed to compute one year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct YearInput {
    pub year: i32,
    #[serde(default)]
    pub filing_status: FilingStatus,
    pub accounts: Vec<Account>,
    /// Closing snapshot of the previous year
    #[serde(default)]
    pub opening: Option<Snapshot>,
    #[serde(default)]
    pub transactions: Vec<TaxTransaction>,
    #[serde(default)]
    pub holdings: Vec<Holding>,
    /// Cash dividends on general brokerage accounts
    #[serde(default)]
    pub dividends: Vec<Dividend>,
    /// Share income assessed outside these accounts this year. Uses up the low band.
    #[serde(default)]
    #[schemars(with = "f64")]
    pub share_income_already_assessed: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentMethod {
    /// Account-level net at the account's flat rate
    FlatRate,
    TaxExempt,
    /// Part of the taxpayer's share and capital income, see the result's
    /// `share_income` and `capital_income`
    Joint,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AccountLiability {
    pub account_id: String,
    /// Account name, or the id when unnamed
    pub display_name: String,
    pub account_type: AccountType,
    pub method: AssessmentMethod,
    #[schemars(with = "f64")]
    pub realized: Decimal,
    #[schemars(with = "f64")]
    pub unrealized: Decimal,
    #[schemars(with = "f64")]
    pub net: Decimal,
    /// Earlier losses on the account used against this year's net
    #[schemars(with = "f64")]
    pub loss_used: Decimal,
    #[schemars(with = "f64")]
    pub taxable: Decimal,
    #[schemars(with = "Option<f64>")]
    pub rate: Option<Decimal>,
    /// `None` for jointly assessed accounts
    #[schemars(with = "Option<f64>")]
    pub tax: Option<Decimal>,
    #[schemars(with = "f64")]
    pub loss_carried: Decimal,
    #[schemars(with = "f64")]
    pub forfeited: Decimal,
}

impl AccountLiability {
    fn new(
        account: &Account,
        method: AssessmentMethod,
        realized: Decimal,
        unrealized: Decimal,
    ) -> Self {
        AccountLiability {
            account_id: account.id.clone(),
            display_name: account.display_name().to_string(),
            account_type: account.account_type,
            method,
            realized,
            unrealized,
            net: realized + unrealized,
            loss_used: Decimal::ZERO,
            taxable: Decimal::ZERO,
            rate: None,
            tax: None,
            loss_carried: Decimal::ZERO,
            forfeited: Decimal::ZERO,
        }
    }
}

/// Share income from general brokerage accounts after loss netting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ShareIncomeAssessment {
    /// Net figure of the year per pool kind, before netting against earlier losses
    #[schemars(with = "BTreeMap<PoolKind, f64>")]
    pub net_by_pool: BTreeMap<PoolKind, Decimal>,
    pub nettings: Vec<GainNetting>,
    #[schemars(with = "f64")]
    pub already_assessed: Decimal,
    /// Gross dividends, share income on top of the year's gains
    #[schemars(with = "f64")]
    pub dividends: Decimal,
    /// Dividends netted against the share pools left after the gains
    pub dividend_netting: Option<GainNetting>,
    pub tax: ShareIncomeTax,
    pub withholding: Vec<WithholdingCredit>,
    /// Dividend tax withheld at source and credited against `tax.total`
    #[schemars(with = "f64")]
    pub withholding_credit: Decimal,
    /// Share income tax still to pay (restskat)
    #[schemars(with = "f64")]
    pub residual_tax: Decimal,
}

impl ShareIncomeAssessment {
    /// Credit withheld dividend tax, never beyond the share income tax itself.
    fn with_withholding(mut self, withholding: Vec<WithholdingCredit>) -> Self {
        let creditable: Decimal = withholding.iter().map(|w| w.creditable).sum();
        self.withholding_credit = creditable.min(self.tax.total).max(Decimal::ZERO);
        self.residual_tax = self.tax.total - self.withholding_credit;
        self.withholding = withholding;
        self
    }
}

/// Where the year's total ends up. The four parts add up to `total_tax`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Settlement {
    /// Residual share income tax plus capital income tax, paid after the
    /// annual assessment
    #[schemars(with = "f64")]
    pub via_annual_assessment: Decimal,
    /// Flat-rate taxes the institutions settle from the accounts themselves
    #[schemars(with = "f64")]
    pub withheld_automatically: Decimal,
    /// Dividend tax withheld at source
    #[schemars(with = "f64")]
    pub withheld_at_source: Decimal,
    /// Value of the negative capital income deduction, zero or negative
    #[schemars(with = "f64")]
    pub capital_income_credit: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TaxResult {
    pub year: i32,
    pub filing_status: FilingStatus,
    pub per_account_liability: BTreeMap<String, AccountLiability>,
    pub per_pool_state: Vec<PoolOverview>,
    pub share_income: ShareIncomeAssessment,
    pub capital_income: CapitalIncomeFinalization,
    /// Always a zero balance for the next year
    pub capital_income_balance_after: CapitalIncomeBalance,
    pub accruals: Vec<AccountAccrual>,
    /// Flat-rate taxes plus share income tax plus the capital income tax effect
    #[schemars(with = "f64")]
    pub total_tax: Decimal,
    pub settlement: Settlement,
    pub warnings: Vec<Warning>,
    pub errors: Vec<RecordError>,
    pub closing_snapshot: Snapshot,
}

/// A validated record.
#[derive(Debug, Clone)]
struct Entry {
    account_id: String,
    asset_id: String,
    asset_type: AssetType,
    classification: Classification,
    amount: Decimal,
    realized: bool,
}

pub fn run_year(table: &RateTable, input: &YearInput) -> Result<TaxResult, TaxError> {
    let year = input.year;
    let rates = table.for_year(year)?;
    log::info!(
        "tax year {}: {} accounts, {} transactions, {} holdings, {} dividends",
        year,
        input.accounts.len(),
        input.transactions.len(),
        input.holdings.len(),
        input.dividends.len()
    );

    let mut warnings = Vec::new();
    let mut errors = Vec::new();
    let (mut ledger, mut capital) = open_snapshot(input, &mut warnings)?;

    let accounts = AccountIndex::build(&input.accounts, &mut errors)?;

    let mut entries = Vec::new();
    for (index, transaction) in input.transactions.iter().enumerate() {
        let record = RecordRef::Transaction {
            index,
            asset_id: transaction.asset_id.clone(),
        };
        match transaction_entry(transaction, year, &accounts, &ledger, &mut warnings) {
            Ok(entry) => entries.push(entry),
            Err(err) => reject(record, err, &mut errors)?,
        }
    }
    for (index, holding) in input.holdings.iter().enumerate() {
        let record = RecordRef::Holding {
            index,
            asset_id: holding.asset_id.clone(),
        };
        match holding_entry(holding, &accounts, &ledger, &mut warnings) {
            Ok(Some(entry)) => entries.push(entry),
            Ok(None) => {}
            Err(err) => reject(record, err, &mut errors)?,
        }
    }
    let mut dividends = Vec::new();
    for (index, dividend) in input.dividends.iter().enumerate() {
        let record = RecordRef::Dividend {
            index,
            asset_id: dividend.asset_id.clone(),
        };
        match dividend_entry(dividend, year, &accounts, &mut warnings) {
            Ok(Some(dividend)) => dividends.push(dividend),
            Ok(None) => {}
            Err(err) => reject(record, err, &mut errors)?,
        }
    }

    let mut per_account_liability = BTreeMap::new();
    let mut accruals = Vec::new();
    for account in accounts.valid.values() {
        let own: Vec<&Entry> = entries
            .iter()
            .filter(|entry| entry.account_id == account.id)
            .collect();
        let marked: Vec<MarkedHolding> = own
            .iter()
            .filter(|entry| !entry.realized)
            .map(|entry| MarkedHolding {
                asset_id: entry.asset_id.clone(),
                asset_type: entry.asset_type,
                classification: entry.classification,
                change: entry.amount,
            })
            .collect();
        let accrual = accrue(account, &marked, rates);
        let realized: Decimal = own
            .iter()
            .filter(|entry| entry.realized)
            .map(|entry| entry.amount)
            .sum();

        let mut liability = match account.account_type {
            AccountType::GeneralBrokerage => AccountLiability::new(
                account,
                AssessmentMethod::Joint,
                realized,
                accrual.net_change,
            ),
            AccountType::ChildSavings => {
                let mut liability = AccountLiability::new(
                    account,
                    AssessmentMethod::TaxExempt,
                    realized,
                    accrual.net_change,
                );
                liability.rate = rates.flat_rate(account.account_type);
                liability.tax = Some(Decimal::ZERO);
                liability
            }
            _ => assess_flat(account, realized, accrual.net_change, rates, &mut ledger, year)?,
        };

        if account.closed && account.account_type == AccountType::EquitySavings {
            let forfeited = ledger.close_account_in_place(&account.id, year);
            if !forfeited.is_zero() {
                warnings.push(Warning::AskLossForfeited {
                    account_id: account.id.clone(),
                    amount: forfeited,
                });
            }
            liability.forfeited = forfeited;
            liability.loss_carried = Decimal::ZERO;
        }

        per_account_liability.insert(account.id.clone(), liability);
        accruals.push(accrual);
    }

    let brokerage: Vec<&Entry> = entries
        .iter()
        .filter(|entry| {
            accounts
                .valid
                .get(entry.account_id.as_str())
                .is_some_and(|a| a.account_type == AccountType::GeneralBrokerage)
        })
        .collect();
    let (share_income, next_capital) = assess_brokerage(
        &brokerage,
        &dividends,
        rates,
        input.share_income_already_assessed,
        &mut ledger,
        capital,
        year,
    )?;
    capital = next_capital;
    let share_income =
        share_income.with_withholding(withholding_credits(&dividends, rates, &mut warnings));

    let capital_income = finalize_year(&capital, rates, input.filing_status);

    for account in accounts.valid.values() {
        check_deposit_cap(account, rates, &mut warnings);
    }

    let flat_tax: Decimal = per_account_liability
        .values()
        .filter_map(|liability| liability.tax)
        .sum();
    let total_tax = flat_tax + share_income.tax.total + capital_income.tax_effect;
    let settlement = Settlement {
        via_annual_assessment: share_income.residual_tax
            + capital_income.tax_effect.max(Decimal::ZERO),
        withheld_automatically: flat_tax,
        withheld_at_source: share_income.withholding_credit,
        capital_income_credit: capital_income.tax_effect.min(Decimal::ZERO),
    };

    log::info!(
        "tax year {}: total {} ({} warnings, {} rejected records)",
        year,
        total_tax,
        warnings.len(),
        errors.len()
    );

    let closing_snapshot = Snapshot {
        year,
        pools: ledger.clone().into_pools(),
        capital_income: Some(capital_income.next_year.clone()),
    };

    Ok(TaxResult {
        year,
        filing_status: input.filing_status,
        per_account_liability,
        per_pool_state: ledger.overview(),
        share_income,
        capital_income_balance_after: capital_income.next_year.clone(),
        capital_income,
        accruals,
        total_tax,
        settlement,
        warnings,
        errors,
        closing_snapshot,
    })
}

fn reject(
    record: RecordRef,
    err: TaxError,
    errors: &mut Vec<RecordError>,
) -> Result<(), TaxError> {
    if err.is_fatal() {
        return Err(err);
    }
    log::warn!("rejected {:?}: {}", record, err);
    errors.push(RecordError::new(record, &err));
    Ok(())
}

/// Accounts by id. An empty or repeated id rejects every account carrying it,
/// and with them every record that points at the id.
struct AccountIndex<'a> {
    valid: BTreeMap<&'a str, &'a Account>,
    rejected: BTreeMap<&'a str, TaxError>,
}

impl<'a> AccountIndex<'a> {
    fn build(accounts: &'a [Account], errors: &mut Vec<RecordError>) -> Result<Self, TaxError> {
        let mut uses: BTreeMap<&str, usize> = BTreeMap::new();
        for account in accounts {
            *uses.entry(account.id.as_str()).or_insert(0) += 1;
        }
        let mut index = AccountIndex {
            valid: BTreeMap::new(),
            rejected: BTreeMap::new(),
        };
        for (position, account) in accounts.iter().enumerate() {
            let id = account.id.as_str();
            let err = if id.trim().is_empty() {
                TaxError::EmptyAccountId
            } else if uses.get(id).copied().unwrap_or(0) > 1 {
                TaxError::DuplicateAccount(id.to_string())
            } else {
                index.valid.insert(id, account);
                continue;
            };
            let record = RecordRef::Account {
                index: position,
                account_id: id.to_string(),
            };
            index.rejected.insert(id, err.clone());
            reject(record, err, errors)?;
        }
        Ok(index)
    }

    fn get(&self, id: &str) -> Result<&'a Account, TaxError> {
        if let Some(account) = self.valid.get(id).copied() {
            return Ok(account);
        }
        Err(self
            .rejected
            .get(id)
            .cloned()
            .unwrap_or_else(|| TaxError::UnknownAccount(id.to_string())))
    }
}

fn open_snapshot(
    input: &YearInput,
    warnings: &mut Vec<Warning>,
) -> Result<(LossLedger, CapitalIncomeBalance), TaxError> {
    let year = input.year;
    let Some(snapshot) = &input.opening else {
        return Ok((LossLedger::new(), CapitalIncomeBalance::new(year)));
    };
    if TaxYear(snapshot.year).next() != TaxYear(year) {
        warnings.push(Warning::SnapshotYearGap {
            snapshot_year: snapshot.year,
            year,
        });
    }
    let ledger = LossLedger::from_pools(snapshot.pools.iter().cloned())?;
    let capital = match &snapshot.capital_income {
        Some(balance) if balance.year == year => balance.clone(),
        Some(balance) => {
            if !balance.net_amount.is_zero() {
                warnings.push(Warning::CapitalBalanceReset {
                    from_year: balance.year,
                    amount: balance.net_amount,
                });
            }
            CapitalIncomeBalance::new(year)
        }
        None => CapitalIncomeBalance::new(year),
    };
    Ok((ledger, capital))
}

/// Resolve the asset type and classify it for the record's account.
fn resolve<'a>(
    account_id: &str,
    asset_id: &str,
    raw_asset_type: &str,
    accounts: &AccountIndex<'a>,
    ledger: &LossLedger,
    warnings: &mut Vec<Warning>,
) -> Result<(&'a Account, AssetType, Classification), TaxError> {
    let account = accounts.get(account_id)?;
    let resolved = AssetType::resolve(raw_asset_type);
    if !resolved.recognized {
        warnings.push(Warning::UnknownAssetType {
            asset_id: asset_id.to_string(),
            raw: raw_asset_type.to_string(),
            assumed: resolved.asset_type,
        });
    }
    let classification = classify(account.account_type, resolved.asset_type)?;
    if let Some(kind) = classification.loss_pool {
        let key = PoolKey::new(kind, &account.id);
        if ledger.is_forfeited(&key) {
            return Err(TaxError::PoolClosed(key));
        }
    }
    Ok((account, resolved.asset_type, classification))
}

fn transaction_entry(
    transaction: &TaxTransaction,
    year: i32,
    accounts: &AccountIndex,
    ledger: &LossLedger,
    warnings: &mut Vec<Warning>,
) -> Result<Entry, TaxError> {
    if transaction.year != year {
        return Err(TaxError::YearMismatch {
            record: transaction.year,
            expected: year,
        });
    }
    let (account, asset_type, classification) = resolve(
        &transaction.account_id,
        &transaction.asset_id,
        &transaction.asset_type,
        accounts,
        ledger,
        warnings,
    )?;
    Ok(Entry {
        account_id: account.id.clone(),
        asset_id: transaction.asset_id.clone(),
        asset_type,
        classification,
        amount: transaction.realized_gain_loss,
        realized: true,
    })
}

fn holding_entry(
    holding: &Holding,
    accounts: &AccountIndex,
    ledger: &LossLedger,
    warnings: &mut Vec<Warning>,
) -> Result<Option<Entry>, TaxError> {
    for (field, amount) in [
        ("opening_value", holding.opening_value),
        ("closing_value", holding.closing_value),
    ] {
        if amount < Decimal::ZERO {
            return Err(TaxError::NegativeQuantity { field, amount });
        }
    }
    let (account, asset_type, classification) = resolve(
        &holding.account_id,
        &holding.asset_id,
        &holding.asset_type,
        accounts,
        ledger,
        warnings,
    )?;
    if classification.taxation_method == TaxationMethod::Realization {
        warnings.push(Warning::NotMarkToMarket {
            account_id: account.id.clone(),
            asset_id: holding.asset_id.clone(),
        });
        return Ok(None);
    }
    Ok(Some(Entry {
        account_id: account.id.clone(),
        asset_id: holding.asset_id.clone(),
        asset_type,
        classification,
        amount: holding.change(),
        realized: false,
    }))
}

/// Dividends are only share income on general brokerage accounts. Elsewhere
/// they are already in the account's value change.
fn dividend_entry<'a>(
    dividend: &'a Dividend,
    year: i32,
    accounts: &AccountIndex,
    warnings: &mut Vec<Warning>,
) -> Result<Option<&'a Dividend>, TaxError> {
    if dividend.year != year {
        return Err(TaxError::YearMismatch {
            record: dividend.year,
            expected: year,
        });
    }
    for (field, amount) in [("gross", dividend.gross), ("withheld", dividend.withheld)] {
        if amount < Decimal::ZERO {
            return Err(TaxError::NegativeQuantity { field, amount });
        }
    }
    let account = accounts.get(&dividend.account_id)?;
    if account.account_type != AccountType::GeneralBrokerage {
        warnings.push(Warning::DividendInAccountValue {
            account_id: account.id.clone(),
            asset_id: dividend.asset_id.clone(),
        });
        return Ok(None);
    }
    Ok(Some(dividend))
}

fn withholding_credits(
    dividends: &[&Dividend],
    rates: &YearRates,
    warnings: &mut Vec<Warning>,
) -> Vec<WithholdingCredit> {
    let table = &rates.withholding_credit;
    dividends
        .iter()
        .map(|dividend| {
            let credit_rate = match table.credit_rate(&dividend.country) {
                Some(rate) => rate,
                None => {
                    if !dividend.withheld.is_zero() {
                        warnings.push(Warning::UnknownWithholdingCountry {
                            asset_id: dividend.asset_id.clone(),
                            country: dividend.country.clone(),
                            assumed_rate: table.default_rate,
                        });
                    }
                    table.default_rate
                }
            };
            let credit = withholding_credit(dividend, credit_rate);
            if credit.excess > Decimal::ZERO {
                warnings.push(Warning::WithholdingAboveCredit {
                    asset_id: credit.asset_id.clone(),
                    country: credit.country.clone(),
                    excess: credit.excess,
                });
            }
            credit
        })
        .collect()
}

/// Equity savings and pension accounts: one net figure per account, drawn
/// against the account's own pool and taxed at the flat rate.
fn assess_flat(
    account: &Account,
    realized: Decimal,
    unrealized: Decimal,
    rates: &YearRates,
    ledger: &mut LossLedger,
    year: i32,
) -> Result<AccountLiability, TaxError> {
    let mut liability =
        AccountLiability::new(account, AssessmentMethod::FlatRate, realized, unrealized);
    let rate = rates
        .flat_rate(account.account_type)
        .unwrap_or(Decimal::ZERO);
    liability.rate = Some(rate);

    let Some(kind) = isolated_pool_kind(account.account_type) else {
        liability.taxable = liability.net.max(Decimal::ZERO);
        liability.tax = Some(liability.taxable * rate);
        return Ok(liability);
    };
    let key = PoolKey::new(kind, &account.id);
    if liability.net > Decimal::ZERO {
        let netting = ledger.apply_gain(&key, liability.net, year)?;
        liability.loss_used = netting.consumed();
        liability.taxable = netting.taxable_amount;
    } else if liability.net < Decimal::ZERO {
        ledger.apply(&key, liability.net, year)?;
        liability.loss_carried = -liability.net;
    }
    liability.tax = Some(liability.taxable * rate);
    Ok(liability)
}

/// General brokerage accounts, all together: share income through the shared
/// pools, capital income into the annual balance. Dividends draw on what the
/// year's gains left of the share pools.
fn assess_brokerage(
    entries: &[&Entry],
    dividends: &[&Dividend],
    rates: &YearRates,
    already_assessed: Decimal,
    ledger: &mut LossLedger,
    mut capital: CapitalIncomeBalance,
    year: i32,
) -> Result<(ShareIncomeAssessment, CapitalIncomeBalance), TaxError> {
    let mut net_by_pool: BTreeMap<PoolKind, Decimal> = BTreeMap::new();
    for entry in entries {
        match entry.classification.loss_pool {
            Some(kind) => *net_by_pool.entry(kind).or_insert(Decimal::ZERO) += entry.amount,
            None => capital = apply_event(&capital, entry.amount),
        }
    }

    for (kind, net) in &net_by_pool {
        if *net < Decimal::ZERO {
            ledger.apply(&PoolKey::new(*kind, ""), *net, year)?;
        }
    }

    let mut share_taxable = Decimal::ZERO;
    let mut nettings = Vec::new();
    for kind in [
        PoolKind::UnlistedShare,
        PoolKind::FinancialContract,
        PoolKind::ListedShare,
    ] {
        let net = net_by_pool.get(&kind).copied().unwrap_or(Decimal::ZERO);
        if net <= Decimal::ZERO {
            continue;
        }
        let netting = ledger.apply_gain(&PoolKey::new(kind, ""), net, year)?;
        if kind == PoolKind::FinancialContract {
            capital = apply_event(&capital, netting.taxable_amount);
        } else {
            share_taxable += netting.taxable_amount;
        }
        nettings.push(netting);
    }

    let dividend_total: Decimal = dividends.iter().map(|d| d.gross).sum();
    let dividend_netting = if dividend_total > Decimal::ZERO {
        let netting = ledger.apply_gain(&PoolKey::ListedShare, dividend_total, year)?;
        share_taxable += netting.taxable_amount;
        Some(netting)
    } else {
        None
    };

    let tax = share_income_tax(&rates.share_income, share_taxable, already_assessed);
    Ok((
        ShareIncomeAssessment {
            net_by_pool,
            nettings,
            already_assessed,
            dividends: dividend_total,
            dividend_netting,
            residual_tax: tax.total,
            tax,
            withholding: Vec::new(),
            withholding_credit: Decimal::ZERO,
        },
        capital,
    ))
}

fn check_deposit_cap(account: &Account, rates: &YearRates, warnings: &mut Vec<Warning>) {
    let (Some(cap), Some(deposits)) = (rates.max_deposit(account.account_type), account.deposits)
    else {
        return;
    };
    if deposits > cap {
        warnings.push(Warning::DepositCapExceeded {
            account_id: account.id.clone(),
            deposits,
            cap,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ledger::PoolStatus;
    use rust_decimal_macros::dec;

    fn tx(account: &str, asset: &str, asset_type: &str, amount: Decimal) -> TaxTransaction {
        TaxTransaction {
            account_id: account.into(),
            asset_id: asset.into(),
            asset_type: asset_type.into(),
            realized_gain_loss: amount,
            year: 2025,
        }
    }

    fn holding(account: &str, asset: &str, asset_type: &str, open: Decimal, close: Decimal) -> Holding {
        Holding {
            account_id: account.into(),
            asset_id: asset.into(),
            asset_type: asset_type.into(),
            opening_value: open,
            closing_value: close,
        }
    }

    fn input(accounts: Vec<Account>) -> YearInput {
        YearInput {
            year: 2025,
            filing_status: FilingStatus::Single,
            accounts,
            opening: None,
            transactions: vec![],
            holdings: vec![],
            dividends: vec![],
            share_income_already_assessed: dec!(0),
        }
    }

    fn dividend(account: &str, asset: &str, country: &str, gross: Decimal, withheld: Decimal) -> Dividend {
        Dividend {
            account_id: account.into(),
            asset_id: asset.into(),
            country: country.into(),
            gross,
            withheld,
            year: 2025,
        }
    }

    fn listed_pool(balance: Decimal) -> Option<Snapshot> {
        Some(Snapshot {
            year: 2024,
            pools: vec![LossPool {
                key: PoolKey::ListedShare,
                balance,
                year: 2024,
                status: PoolStatus::Accumulating,
            }],
            capital_income: None,
        })
    }

    fn settled(result: &TaxResult) -> Decimal {
        let s = &result.settlement;
        s.via_annual_assessment + s.withheld_automatically + s.withheld_at_source + s.capital_income_credit
    }

    fn run(input: &YearInput) -> TaxResult {
        run_year(&RateTable::danish(), input).unwrap()
    }

    #[test]
    fn unknown_year_is_fatal() {
        let mut input = input(vec![]);
        input.year = 1990;
        assert_eq!(
            run_year(&RateTable::danish(), &input),
            Err(TaxError::InvalidYear(1990))
        );
    }

    #[test]
    fn ask_nets_holdings_before_tax() {
        let mut input = input(vec![Account::new("ask", AccountType::EquitySavings)]);
        input.holdings = vec![
            holding("ask", "A", "etf_approved", dec!(10000), dec!(18000)),
            holding("ask", "B", "listed_share_domestic", dec!(5000), dec!(2000)),
        ];
        let result = run(&input);
        let liability = &result.per_account_liability["ask"];
        assert_eq!(liability.net, dec!(5000));
        assert_eq!(liability.tax, Some(dec!(850)));
        assert_eq!(result.total_tax, dec!(850));
        assert!(result.accruals[0].holdings.iter().all(|h| h.indicative_only));
    }

    #[test]
    fn ask_loss_is_carried_and_used_next_year() {
        let mut first = input(vec![Account::new("ask", AccountType::EquitySavings)]);
        first.holdings = vec![holding("ask", "A", "etf_approved", dec!(10000), dec!(7000))];
        let first_result = run(&first);
        assert_eq!(first_result.per_account_liability["ask"].loss_carried, dec!(3000));

        let mut second = input(vec![Account::new("ask", AccountType::EquitySavings)]);
        second.year = 2026;
        second.opening = Some(first_result.closing_snapshot.clone());
        second.holdings = vec![holding("ask", "A", "etf_approved", dec!(7000), dec!(12000))];
        let result = run(&second);
        let liability = &result.per_account_liability["ask"];
        assert_eq!(liability.loss_used, dec!(3000));
        assert_eq!(liability.taxable, dec!(2000));
        assert_eq!(liability.tax, Some(dec!(340)));
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn closing_ask_forfeits_losses_and_rejects_later_records() {
        let mut closed = Account::new("ask", AccountType::EquitySavings);
        closed.closed = true;
        let mut first = input(vec![closed]);
        first.holdings = vec![holding("ask", "A", "etf_approved", dec!(10000), dec!(6000))];
        let result = run(&first);
        assert_eq!(result.per_account_liability["ask"].forfeited, dec!(4000));
        assert!(result.warnings.contains(&Warning::AskLossForfeited {
            account_id: "ask".into(),
            amount: dec!(4000),
        }));
        let pool = result
            .closing_snapshot
            .pools
            .iter()
            .find(|p| p.key == PoolKey::AskIsolated("ask".into()))
            .unwrap();
        assert_eq!(pool.status, PoolStatus::Forfeited);
        assert_eq!(pool.balance, dec!(0));

        let mut second = input(vec![Account::new("ask", AccountType::EquitySavings)]);
        second.year = 2026;
        second.opening = Some(result.closing_snapshot);
        second.holdings = vec![holding("ask", "A", "etf_approved", dec!(1000), dec!(2000))];
        let result = run(&second);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].error, "PoolClosed");
        assert_eq!(result.per_account_liability["ask"].tax, Some(dec!(0)));
    }

    #[test]
    fn unsupported_combination_rejects_only_that_record() {
        let mut input = input(vec![Account::new("ask", AccountType::EquitySavings)]);
        input.transactions = vec![
            tx("ask", "startup", "unlisted_share", dec!(1000)),
            tx("ask", "novo", "AKTIE_DK", dec!(2000)),
        ];
        let result = run(&input);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].error, "UnsupportedCombination");
        assert_eq!(
            result.errors[0].record,
            RecordRef::Transaction {
                index: 0,
                asset_id: "startup".into()
            }
        );
        assert_eq!(result.per_account_liability["ask"].tax, Some(dec!(340)));
    }

    #[test]
    fn record_errors_are_collected() {
        let mut input = input(vec![Account::new("gb", AccountType::GeneralBrokerage)]);
        let mut wrong_year = tx("gb", "x", "bond", dec!(10));
        wrong_year.year = 2024;
        input.transactions = vec![tx("nope", "y", "bond", dec!(10)), wrong_year];
        input.holdings = vec![holding("gb", "z", "etf_approved", dec!(-1), dec!(10))];
        let result = run(&input);
        let kinds: Vec<_> = result.errors.iter().map(|e| e.error.as_str()).collect();
        assert_eq!(kinds, ["UnknownAccount", "YearMismatch", "NegativeQuantity"]);
    }

    #[test]
    fn brokerage_share_income_uses_pools_then_progression() {
        let mut input = input(vec![Account::new("gb", AccountType::GeneralBrokerage)]);
        input.opening = Some(Snapshot {
            year: 2024,
            pools: vec![LossPool {
                key: PoolKey::ListedShare,
                balance: dec!(10000),
                year: 2024,
                status: PoolStatus::Accumulating,
            }],
            capital_income: None,
        });
        input.transactions = vec![tx("gb", "novo", "listed_share_domestic", dec!(15000))];
        let result = run(&input);
        assert_eq!(result.share_income.nettings[0].consumed(), dec!(10000));
        assert_eq!(result.share_income.tax.taxable, dec!(5000));
        assert_eq!(result.share_income.tax.total, dec!(1350));
        assert_eq!(result.per_account_liability["gb"].method, AssessmentMethod::Joint);
        assert_eq!(result.per_account_liability["gb"].tax, None);
        assert!(result
            .per_pool_state
            .iter()
            .all(|p| p.balance == dec!(0)));
    }

    #[test]
    fn same_year_unlisted_loss_offsets_listed_gain() {
        let mut input = input(vec![Account::new("gb", AccountType::GeneralBrokerage)]);
        input.transactions = vec![
            tx("gb", "listed", "listed_share_foreign", dec!(5000)),
            tx("gb", "unlisted", "unlisted_share", dec!(-2000)),
        ];
        let result = run(&input);
        assert_eq!(result.share_income.tax.taxable, dec!(3000));
        assert_eq!(
            result.closing_snapshot.pools,
            vec![LossPool {
                key: PoolKey::UnlistedShare,
                balance: dec!(0),
                year: 2025,
                status: PoolStatus::Empty,
            }]
        );
    }

    #[test]
    fn listed_loss_does_not_offset_unlisted_gain() {
        let mut input = input(vec![Account::new("gb", AccountType::GeneralBrokerage)]);
        input.transactions = vec![
            tx("gb", "listed", "listed_share_foreign", dec!(-5000)),
            tx("gb", "unlisted", "unlisted_share", dec!(2000)),
        ];
        let result = run(&input);
        assert_eq!(result.share_income.tax.taxable, dec!(2000));
        assert_eq!(
            result.closing_snapshot.pools[0],
            LossPool {
                key: PoolKey::ListedShare,
                balance: dec!(5000),
                year: 2025,
                status: PoolStatus::Accumulating,
            }
        );
    }

    #[test]
    fn capital_income_loss_becomes_a_credit() {
        let mut input = input(vec![Account::new("gb", AccountType::GeneralBrokerage)]);
        input.transactions = vec![tx("gb", "bond", "OBLIGATION", dec!(-40000))];
        let result = run(&input);
        assert_eq!(result.capital_income.tax_effect, dec!(-13200));
        assert_eq!(result.capital_income_balance_after.net_amount, dec!(0));
        assert_eq!(result.total_tax, dec!(-13200));
        assert!(result.closing_snapshot.pools.is_empty());
    }

    #[test]
    fn financial_contract_gain_after_pool_is_capital_income() {
        let mut input = input(vec![Account::new("gb", AccountType::GeneralBrokerage)]);
        input.opening = Some(Snapshot {
            year: 2024,
            pools: vec![LossPool {
                key: PoolKey::FinancialContract,
                balance: dec!(1000),
                year: 2024,
                status: PoolStatus::Accumulating,
            }],
            capital_income: None,
        });
        input.transactions = vec![tx("gb", "call", "OPTION", dec!(3000))];
        let result = run(&input);
        assert_eq!(result.capital_income.balance.net_amount, dec!(2000));
        assert_eq!(result.share_income.tax.total, dec!(0));
    }

    #[test]
    fn unknown_asset_type_is_warned_and_treated_as_capital_income() {
        let mut input = input(vec![Account::new("gb", AccountType::GeneralBrokerage)]);
        input.holdings = vec![holding("gb", "gold", "GOLD_ETC", dec!(100), dec!(300))];
        let result = run(&input);
        assert_eq!(
            result.warnings,
            vec![Warning::UnknownAssetType {
                asset_id: "gold".into(),
                raw: "GOLD_ETC".into(),
                assumed: AssetType::EtfNotApproved,
            }]
        );
        assert_eq!(result.capital_income.balance.net_amount, dec!(200));
    }

    #[test]
    fn realization_holdings_are_ignored_with_warning() {
        let mut input = input(vec![Account::new("gb", AccountType::GeneralBrokerage)]);
        input.holdings = vec![holding("gb", "novo", "listed_share_domestic", dec!(100), dec!(300))];
        let result = run(&input);
        assert!(matches!(result.warnings[0], Warning::NotMarkToMarket { .. }));
        assert_eq!(result.share_income.tax.total, dec!(0));
    }

    #[test]
    fn stale_capital_balance_is_reset() {
        let mut input = input(vec![]);
        input.opening = Some(Snapshot {
            year: 2024,
            pools: vec![],
            capital_income: Some(CapitalIncomeBalance {
                year: 2024,
                net_amount: dec!(-5000),
                gains: dec!(0),
                losses: dec!(5000),
            }),
        });
        let result = run(&input);
        assert_eq!(result.capital_income.balance.net_amount, dec!(0));
        assert_eq!(
            result.warnings,
            vec![Warning::CapitalBalanceReset {
                from_year: 2024,
                amount: dec!(-5000)
            }]
        );
    }

    #[test]
    fn deposit_cap_warning() {
        let mut ask = Account::new("ask", AccountType::EquitySavings);
        ask.deposits = Some(dec!(200000));
        let result = run(&input(vec![ask]));
        assert_eq!(
            result.warnings,
            vec![Warning::DepositCapExceeded {
                account_id: "ask".into(),
                deposits: dec!(200000),
                cap: dec!(166200),
            }]
        );
    }

    #[test]
    fn pension_and_child_savings() {
        let mut input = input(vec![
            Account::new("pen", AccountType::RatePension),
            Account::new("kid", AccountType::ChildSavings),
        ]);
        input.holdings = vec![
            holding("pen", "bond", "bond", dec!(10000), dec!(11000)),
            holding("kid", "etf", "etf_approved", dec!(5000), dec!(9000)),
        ];
        let result = run(&input);
        assert_eq!(result.per_account_liability["pen"].tax, Some(dec!(153)));
        assert_eq!(result.per_account_liability["kid"].tax, Some(dec!(0)));
        assert_eq!(
            result.per_account_liability["kid"].method,
            AssessmentMethod::TaxExempt
        );
        assert_eq!(result.total_tax, dec!(153));
    }

    #[test]
    fn identical_inputs_give_identical_results() {
        let mut input = input(vec![
            Account::new("gb", AccountType::GeneralBrokerage),
            Account::new("ask", AccountType::EquitySavings),
        ]);
        input.transactions = vec![
            tx("gb", "a", "listed_share_domestic", dec!(12345.67)),
            tx("gb", "b", "crypto", dec!(-800)),
        ];
        input.holdings = vec![holding("ask", "c", "etf_approved", dec!(100), dec!(50))];
        assert_eq!(run(&input), run(&input));
    }

    #[test]
    fn dividends_draw_on_what_gains_left_of_the_pool() {
        let mut input = input(vec![Account::new("gb", AccountType::GeneralBrokerage)]);
        input.opening = listed_pool(dec!(10000));
        input.transactions = vec![tx("gb", "novo", "listed_share_domestic", dec!(6000))];
        input.dividends = vec![dividend("gb", "AAPL", "US", dec!(20000), dec!(3000))];
        let result = run(&input);
        let share = &result.share_income;
        assert_eq!(share.nettings[0].consumed(), dec!(6000));
        let netting = share.dividend_netting.as_ref().unwrap();
        assert_eq!(netting.consumed(), dec!(4000));
        assert_eq!(netting.taxable_amount, dec!(16000));
        assert_eq!(share.dividends, dec!(20000));
        assert_eq!(share.tax.taxable, dec!(16000));
        assert_eq!(share.tax.total, dec!(4320));
        assert_eq!(share.withholding_credit, dec!(3000));
        assert_eq!(share.residual_tax, dec!(1320));
        assert_eq!(result.total_tax, dec!(4320));
        assert_eq!(result.settlement.via_annual_assessment, dec!(1320));
        assert_eq!(result.settlement.withheld_at_source, dec!(3000));
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn withholding_above_treaty_rate_is_not_credited() {
        let mut input = input(vec![Account::new("gb", AccountType::GeneralBrokerage)]);
        input.dividends = vec![dividend("gb", "NESN", "ch", dec!(1000), dec!(350))];
        let result = run(&input);
        assert_eq!(result.share_income.tax.total, dec!(270));
        assert_eq!(result.share_income.withholding_credit, dec!(150));
        assert_eq!(result.share_income.residual_tax, dec!(120));
        assert_eq!(
            result.warnings,
            vec![Warning::WithholdingAboveCredit {
                asset_id: "NESN".into(),
                country: "CH".into(),
                excess: dec!(200),
            }]
        );
    }

    #[test]
    fn unknown_withholding_country_uses_default_rate() {
        let mut input = input(vec![Account::new("gb", AccountType::GeneralBrokerage)]);
        input.dividends = vec![dividend("gb", "VALE", "BR", dec!(1000), dec!(100))];
        let result = run(&input);
        assert_eq!(result.share_income.withholding_credit, dec!(100));
        assert_eq!(
            result.warnings,
            vec![Warning::UnknownWithholdingCountry {
                asset_id: "VALE".into(),
                country: "BR".into(),
                assumed_rate: dec!(0.15),
            }]
        );
    }

    #[test]
    fn withholding_credit_is_capped_at_share_income_tax() {
        let mut input = input(vec![Account::new("gb", AccountType::GeneralBrokerage)]);
        input.opening = listed_pool(dec!(5000));
        input.dividends = vec![dividend("gb", "NOVO-B", "DK", dec!(1000), dec!(270))];
        let result = run(&input);
        let share = &result.share_income;
        assert_eq!(share.tax.total, dec!(0));
        assert_eq!(share.withholding[0].creditable, dec!(270));
        assert_eq!(share.withholding_credit, dec!(0));
        assert_eq!(share.residual_tax, dec!(0));
        assert_eq!(result.closing_snapshot.pools[0].balance, dec!(4000));
    }

    #[test]
    fn dividend_on_inventory_taxed_account_is_ignored() {
        let mut input = input(vec![Account::new("ask", AccountType::EquitySavings)]);
        input.dividends = vec![dividend("ask", "DSV", "DK", dec!(500), dec!(135))];
        let result = run(&input);
        assert_eq!(result.share_income.dividends, dec!(0));
        assert!(result.share_income.withholding.is_empty());
        assert_eq!(result.total_tax, dec!(0));
        assert_eq!(
            result.warnings,
            vec![Warning::DividendInAccountValue {
                account_id: "ask".into(),
                asset_id: "DSV".into(),
            }]
        );
    }

    #[test]
    fn invalid_dividends_are_rejected() {
        let mut input = input(vec![Account::new("gb", AccountType::GeneralBrokerage)]);
        let mut wrong_year = dividend("gb", "a", "US", dec!(100), dec!(15));
        wrong_year.year = 2024;
        input.dividends = vec![
            dividend("gb", "b", "US", dec!(-100), dec!(0)),
            dividend("gb", "c", "US", dec!(100), dec!(-1)),
            wrong_year,
            dividend("nope", "d", "US", dec!(100), dec!(15)),
        ];
        let result = run(&input);
        let kinds: Vec<_> = result.errors.iter().map(|e| e.error.as_str()).collect();
        assert_eq!(
            kinds,
            ["NegativeQuantity", "NegativeQuantity", "YearMismatch", "UnknownAccount"]
        );
        assert_eq!(
            result.errors[0].record,
            RecordRef::Dividend {
                index: 0,
                asset_id: "b".into()
            }
        );
        assert_eq!(result.share_income.dividends, dec!(0));
    }

    #[test]
    fn settlement_adds_up_to_total_tax() {
        let mut input = input(vec![
            Account::new("gb", AccountType::GeneralBrokerage),
            Account::new("ask", AccountType::EquitySavings),
            Account::new("pen", AccountType::RatePension),
        ]);
        input.transactions = vec![
            tx("gb", "novo", "listed_share_domestic", dec!(15000)),
            tx("gb", "bond", "bond", dec!(-40000)),
        ];
        input.holdings = vec![
            holding("ask", "etf", "etf_approved", dec!(10000), dec!(15000)),
            holding("pen", "fund", "mixed_fund_bond", dec!(10000), dec!(11000)),
        ];
        input.dividends = vec![dividend("gb", "AAPL", "US", dec!(2000), dec!(300))];
        let result = run(&input);
        assert_eq!(settled(&result), result.total_tax);
        assert_eq!(result.settlement.withheld_automatically, dec!(1003));
        assert_eq!(result.settlement.withheld_at_source, dec!(300));
        assert_eq!(result.settlement.capital_income_credit, dec!(-13200));
        // 17,000 share income at 27% less the 300 credit
        assert_eq!(result.settlement.via_annual_assessment, dec!(4290));
    }

    #[test]
    fn duplicate_account_ids_are_rejected_with_their_records() {
        let mut input = input(vec![
            Account::new("a", AccountType::GeneralBrokerage),
            Account::new("a", AccountType::EquitySavings),
        ]);
        input.transactions = vec![tx("a", "novo", "listed_share_domestic", dec!(10000))];
        let result = run(&input);
        let kinds: Vec<_> = result.errors.iter().map(|e| e.error.as_str()).collect();
        assert_eq!(kinds, ["DuplicateAccount"; 3]);
        assert_eq!(
            result.errors[1].record,
            RecordRef::Account {
                index: 1,
                account_id: "a".into()
            }
        );
        assert!(result.per_account_liability.is_empty());
        assert_eq!(result.share_income.tax.total, dec!(0));
        assert_eq!(result.total_tax, dec!(0));
    }

    #[test]
    fn empty_account_id_is_rejected() {
        let mut input = input(vec![Account::new("", AccountType::EquitySavings)]);
        input.holdings = vec![holding("", "etf", "etf_approved", dec!(2000), dec!(1000))];
        let result = run(&input);
        let kinds: Vec<_> = result.errors.iter().map(|e| e.error.as_str()).collect();
        assert_eq!(kinds, ["EmptyAccountId", "EmptyAccountId"]);
        assert!(result.closing_snapshot.pools.is_empty());

        let json = serde_json::to_string(&result.closing_snapshot).unwrap();
        let snapshot: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(snapshot, result.closing_snapshot);
    }

    #[test]
    fn snapshot_from_two_years_back_is_flagged() {
        let mut input = input(vec![]);
        input.opening = Some(Snapshot {
            year: 2023,
            pools: vec![],
            capital_income: None,
        });
        let result = run(&input);
        assert_eq!(
            result.warnings,
            vec![Warning::SnapshotYearGap {
                snapshot_year: 2023,
                year: 2025
            }]
        );
    }
}
