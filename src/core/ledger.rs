//! Loss pools (tabsbanker) and the rules for using them.
//!
//! The ledger is a value: every operation returns a new ledger and leaves the
//! old one untouched. Balances are stored as positive numbers (the unused loss)
//! and can never go below zero.

use crate::core::classify::PoolKind;
use crate::core::error::TaxError;
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Identity of a loss pool. Shared pools span every general brokerage account of
/// the taxpayer; isolated pools belong to exactly one account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PoolKey {
    ListedShare,
    UnlistedShare,
    FinancialContract,
    AskIsolated(String),
    PensionIsolated(String),
}

impl PoolKey {
    /// Key for a pool kind. Isolated kinds need the owning account id.
    pub fn new(kind: PoolKind, account_id: &str) -> PoolKey {
        match kind {
            PoolKind::ListedShare => PoolKey::ListedShare,
            PoolKind::UnlistedShare => PoolKey::UnlistedShare,
            PoolKind::FinancialContract => PoolKey::FinancialContract,
            PoolKind::AskIsolated => PoolKey::AskIsolated(account_id.to_string()),
            PoolKind::PensionIsolated => PoolKey::PensionIsolated(account_id.to_string()),
        }
    }

    pub fn kind(&self) -> PoolKind {
        match self {
            PoolKey::ListedShare => PoolKind::ListedShare,
            PoolKey::UnlistedShare => PoolKind::UnlistedShare,
            PoolKey::FinancialContract => PoolKind::FinancialContract,
            PoolKey::AskIsolated(_) => PoolKind::AskIsolated,
            PoolKey::PensionIsolated(_) => PoolKind::PensionIsolated,
        }
    }

    /// Owning account for isolated pools.
    pub fn account_id(&self) -> Option<&str> {
        match self {
            PoolKey::AskIsolated(id) | PoolKey::PensionIsolated(id) => Some(id),
            PoolKey::ListedShare | PoolKey::UnlistedShare | PoolKey::FinancialContract => None,
        }
    }

    /// Pools a gain of this pool's kind may be netted against, in order.
    ///
    /// Listed gains use up unlisted losses once their own pool is empty, since
    /// unlisted losses offset share income in general. Nothing else crosses over.
    pub fn offset_sources(&self) -> Vec<PoolKey> {
        match self {
            PoolKey::ListedShare => vec![PoolKey::ListedShare, PoolKey::UnlistedShare],
            other => vec![other.clone()],
        }
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolKey::ListedShare => f.write_str("listed_share"),
            PoolKey::UnlistedShare => f.write_str("unlisted_share"),
            PoolKey::FinancialContract => f.write_str("financial_contract"),
            PoolKey::AskIsolated(id) => write!(f, "ask:{id}"),
            PoolKey::PensionIsolated(id) => write!(f, "pension:{id}"),
        }
    }
}

impl FromStr for PoolKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "listed_share" => return Ok(PoolKey::ListedShare),
            "unlisted_share" => return Ok(PoolKey::UnlistedShare),
            "financial_contract" => return Ok(PoolKey::FinancialContract),
            _ => {}
        }
        match s.split_once(':') {
            Some(("ask", id)) if !id.is_empty() => Ok(PoolKey::AskIsolated(id.to_string())),
            Some(("pension", id)) if !id.is_empty() => {
                Ok(PoolKey::PensionIsolated(id.to_string()))
            }
            _ => Err(format!("invalid pool key '{s}'")),
        }
    }
}

impl Serialize for PoolKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PoolKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl JsonSchema for PoolKey {
    fn schema_name() -> String {
        "PoolKey".to_string()
    }

    fn json_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        String::json_schema(gen)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PoolStatus {
    #[default]
    Empty,
    Accumulating,
    PartiallyConsumed,
    /// Terminal. Only equity savings pools on account closure.
    Forfeited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SpousalTransfer {
    Mandatory,
    Optional,
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Carryforward {
    Unlimited,
    ForfeitedOnClosure,
}

/// Whether unused losses may (or must) be moved to a spouse. The transfer is up
/// to the caller.
pub fn spousal_transfer(kind: PoolKind) -> SpousalTransfer {
    match kind {
        PoolKind::ListedShare => SpousalTransfer::Mandatory,
        PoolKind::UnlistedShare | PoolKind::FinancialContract => SpousalTransfer::Optional,
        PoolKind::AskIsolated | PoolKind::PensionIsolated => SpousalTransfer::Never,
    }
}

pub fn carryforward(kind: PoolKind) -> Carryforward {
    match kind {
        PoolKind::AskIsolated => Carryforward::ForfeitedOnClosure,
        PoolKind::ListedShare
        | PoolKind::UnlistedShare
        | PoolKind::FinancialContract
        | PoolKind::PensionIsolated => Carryforward::Unlimited,
    }
}

/// One loss pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct LossPool {
    pub key: PoolKey,
    /// Unused loss, never negative
    #[schemars(with = "f64")]
    pub balance: Decimal,
    /// Year of the last movement
    pub year: i32,
    #[serde(default)]
    pub status: PoolStatus,
}

impl LossPool {
    fn new(key: PoolKey, year: i32) -> Self {
        LossPool {
            key,
            balance: Decimal::ZERO,
            year,
            status: PoolStatus::Empty,
        }
    }

    fn add_loss(&mut self, loss: Decimal, year: i32) {
        self.balance += loss;
        self.year = self.year.max(year);
        self.status = PoolStatus::Accumulating;
        log::debug!(
            "pool {}: +{} loss in {}, balance {}",
            self.key,
            loss,
            year,
            self.balance
        );
    }

    /// Net a gain against the balance. Returns the consumed amount.
    fn net(&mut self, gain: Decimal, year: i32) -> Result<Decimal, TaxError> {
        if year < self.year {
            log::debug!(
                "pool {}: gain from {} predates losses from {}, not netted",
                self.key,
                year,
                self.year
            );
            return Ok(Decimal::ZERO);
        }
        let consumed = self.balance.min(gain);
        if consumed.is_zero() {
            return Ok(Decimal::ZERO);
        }
        let remaining = self.balance - consumed;
        if remaining < Decimal::ZERO {
            return Err(TaxError::BalanceUnderflow {
                pool: self.key.clone(),
                balance: self.balance,
                amount: consumed,
            });
        }
        self.balance = remaining;
        self.year = year;
        self.status = if remaining.is_zero() {
            PoolStatus::Empty
        } else {
            PoolStatus::PartiallyConsumed
        };
        log::debug!(
            "pool {}: -{} consumed by gain {} in {}, balance {}",
            self.key,
            consumed,
            gain,
            year,
            self.balance
        );
        Ok(consumed)
    }
}

/// Result of recording one event on one pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Netting {
    pub pool: PoolKey,
    #[schemars(with = "f64")]
    pub amount: Decimal,
    #[schemars(with = "f64")]
    pub consumed: Decimal,
    /// Part of a gain left after netting. Zero for losses.
    #[schemars(with = "f64")]
    pub taxable_amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PoolDraw {
    pub pool: PoolKey,
    #[schemars(with = "f64")]
    pub amount: Decimal,
}

/// A gain netted against every pool it may draw on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct GainNetting {
    pub source: PoolKey,
    #[schemars(with = "f64")]
    pub gain: Decimal,
    pub draws: Vec<PoolDraw>,
    #[schemars(with = "f64")]
    pub taxable_amount: Decimal,
}

impl GainNetting {
    pub fn consumed(&self) -> Decimal {
        self.draws.iter().map(|d| d.amount).sum()
    }
}

/// A pool with its transfer and carryforward rules, for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PoolOverview {
    pub pool: PoolKey,
    pub kind: PoolKind,
    pub account_id: Option<String>,
    #[schemars(with = "f64")]
    pub balance: Decimal,
    pub status: PoolStatus,
    pub year: i32,
    pub spousal_transfer: SpousalTransfer,
    pub carryforward: Carryforward,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LossLedger {
    pools: BTreeMap<PoolKey, LossPool>,
}

impl LossLedger {
    pub fn new() -> Self {
        LossLedger::default()
    }

    /// Build a ledger from persisted pools. Negative balances are rejected.
    ///
    /// A forfeited pool holds nothing, whatever balance it was stored with, and
    /// stays forfeited when merged with another pool under the same key.
    pub fn from_pools(pools: impl IntoIterator<Item = LossPool>) -> Result<Self, TaxError> {
        let mut ledger = LossLedger::new();
        for mut pool in pools {
            if pool.balance < Decimal::ZERO {
                return Err(TaxError::NegativeQuantity {
                    field: "pool balance",
                    amount: pool.balance,
                });
            }
            if pool.status == PoolStatus::Forfeited {
                if !pool.balance.is_zero() {
                    log::warn!(
                        "pool {}: forfeited pool stored with balance {}, dropped",
                        pool.key,
                        pool.balance
                    );
                }
                pool.balance = Decimal::ZERO;
            } else if pool.balance.is_zero() {
                pool.status = PoolStatus::Empty;
            } else if pool.status == PoolStatus::Empty {
                pool.status = PoolStatus::Accumulating;
            }
            match ledger.pools.get_mut(&pool.key) {
                Some(existing) if existing.status == PoolStatus::Forfeited => {}
                Some(existing) if pool.status == PoolStatus::Forfeited => {
                    pool.year = pool.year.max(existing.year);
                    *existing = pool;
                }
                Some(existing) => {
                    existing.balance += pool.balance;
                    existing.year = existing.year.max(pool.year);
                    if !existing.balance.is_zero() && existing.status == PoolStatus::Empty {
                        existing.status = PoolStatus::Accumulating;
                    }
                }
                None => {
                    ledger.pools.insert(pool.key.clone(), pool);
                }
            }
        }
        Ok(ledger)
    }

    pub fn pool(&self, key: &PoolKey) -> Option<&LossPool> {
        self.pools.get(key)
    }

    pub fn pools(&self) -> impl Iterator<Item = &LossPool> {
        self.pools.values()
    }

    pub fn into_pools(self) -> Vec<LossPool> {
        self.pools.into_values().collect()
    }

    pub fn balance(&self, key: &PoolKey) -> Decimal {
        self.pool(key).map_or(Decimal::ZERO, |p| p.balance)
    }

    /// Sum of balances across every pool of a kind.
    pub fn total_for(&self, kind: PoolKind) -> Decimal {
        self.pools()
            .filter(|p| p.key.kind() == kind)
            .map(|p| p.balance)
            .sum()
    }

    pub fn is_forfeited(&self, key: &PoolKey) -> bool {
        self.pool(key)
            .is_some_and(|p| p.status == PoolStatus::Forfeited)
    }

    /// Record a gain (`amount > 0`) or a loss (`amount < 0`) on a single pool.
    pub fn record_event(
        &self,
        key: &PoolKey,
        amount: Decimal,
        year: i32,
    ) -> Result<(LossLedger, Netting), TaxError> {
        let mut next = self.clone();
        let netting = next.apply(key, amount, year)?;
        Ok((next, netting))
    }

    /// Net a gain against the pool it belongs to and then any other pool it
    /// may draw on.
    pub fn net_gain(
        &self,
        source: &PoolKey,
        gain: Decimal,
        year: i32,
    ) -> Result<(LossLedger, GainNetting), TaxError> {
        let mut next = self.clone();
        let netting = next.apply_gain(source, gain, year)?;
        Ok((next, netting))
    }

    /// Forfeit the equity savings pool of a closed account. Returns the lost balance.
    ///
    /// Pension pools stay: their losses carry forward without limit.
    pub fn close_account(&self, account_id: &str, year: i32) -> (LossLedger, Decimal) {
        let mut next = self.clone();
        let key = PoolKey::AskIsolated(account_id.to_string());
        let pool = next
            .pools
            .entry(key.clone())
            .or_insert_with(|| LossPool::new(key, year));
        let forfeited = pool.balance;
        pool.balance = Decimal::ZERO;
        pool.year = pool.year.max(year);
        pool.status = PoolStatus::Forfeited;
        if forfeited.is_zero() {
            log::debug!("pool {}: forfeited on closure (empty)", pool.key);
        } else {
            log::warn!("pool {}: unused loss {} forfeited on closure", pool.key, forfeited);
        }
        (next, forfeited)
    }

    pub fn overview(&self) -> Vec<PoolOverview> {
        self.pools()
            .map(|p| {
                let kind = p.key.kind();
                PoolOverview {
                    pool: p.key.clone(),
                    kind,
                    account_id: p.key.account_id().map(str::to_string),
                    balance: p.balance,
                    status: p.status,
                    year: p.year,
                    spousal_transfer: spousal_transfer(kind),
                    carryforward: carryforward(kind),
                }
            })
            .collect()
    }

    pub(crate) fn apply(
        &mut self,
        key: &PoolKey,
        amount: Decimal,
        year: i32,
    ) -> Result<Netting, TaxError> {
        if self.is_forfeited(key) {
            return Err(TaxError::PoolClosed(key.clone()));
        }
        let mut consumed = Decimal::ZERO;
        if amount < Decimal::ZERO {
            self.pools
                .entry(key.clone())
                .or_insert_with(|| LossPool::new(key.clone(), year))
                .add_loss(-amount, year);
        } else if amount > Decimal::ZERO {
            if let Some(pool) = self.pools.get_mut(key) {
                consumed = pool.net(amount, year)?;
            }
        }
        Ok(Netting {
            pool: key.clone(),
            amount,
            consumed,
            taxable_amount: (amount - consumed).max(Decimal::ZERO),
        })
    }

    pub(crate) fn apply_gain(
        &mut self,
        source: &PoolKey,
        gain: Decimal,
        year: i32,
    ) -> Result<GainNetting, TaxError> {
        if self.is_forfeited(source) {
            return Err(TaxError::PoolClosed(source.clone()));
        }
        let mut remaining = gain.max(Decimal::ZERO);
        let mut draws = Vec::new();
        for key in source.offset_sources() {
            if remaining.is_zero() {
                break;
            }
            if self.is_forfeited(&key) {
                continue;
            }
            let netting = self.apply(&key, remaining, year)?;
            if !netting.consumed.is_zero() {
                draws.push(PoolDraw {
                    pool: key,
                    amount: netting.consumed,
                });
            }
            remaining = netting.taxable_amount;
        }
        Ok(GainNetting {
            source: source.clone(),
            gain,
            draws,
            taxable_amount: remaining,
        })
    }

    pub(crate) fn close_account_in_place(&mut self, account_id: &str, year: i32) -> Decimal {
        let (next, forfeited) = self.close_account(account_id, year);
        *self = next;
        forfeited
    }
}
