use crate::core::accounts::AssetType;
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Non-fatal anomalies found while running a tax year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type")]
pub enum Warning {
    /// Asset type was not recognised and the most conservative classification was assumed.
    UnknownAssetType {
        asset_id: String,
        raw: String,
        assumed: AssetType,
    },
    /// Deposits into an equity savings account exceed the year's cap.
    DepositCapExceeded {
        account_id: String,
        #[schemars(with = "f64")]
        deposits: Decimal,
        #[schemars(with = "f64")]
        cap: Decimal,
    },
    /// A closed equity savings account took its unused losses with it.
    AskLossForfeited {
        account_id: String,
        #[schemars(with = "f64")]
        amount: Decimal,
    },
    /// The opening snapshot carried a capital income balance from an earlier
    /// year. Capital income never carries forward, so it was dropped.
    CapitalBalanceReset {
        from_year: i32,
        #[schemars(with = "f64")]
        amount: Decimal,
    },
    /// The opening snapshot is not from the year immediately before.
    SnapshotYearGap { snapshot_year: i32, year: i32 },
    /// A holding of a realization-taxed asset. Only sales are taxed, so its
    /// value change was left out.
    NotMarkToMarket {
        account_id: String,
        asset_id: String,
    },
    /// A dividend booked on an inventory-taxed account. It is already part of
    /// the account's value change, so it was not taxed again.
    DividendInAccountValue {
        account_id: String,
        asset_id: String,
    },
    /// No credit ceiling is configured for the dividend's country.
    UnknownWithholdingCountry {
        asset_id: String,
        country: String,
        #[schemars(with = "f64")]
        assumed_rate: Decimal,
    },
    /// More tax was withheld abroad than Denmark credits. The excess has to
    /// be reclaimed from the source country.
    WithholdingAboveCredit {
        asset_id: String,
        country: String,
        #[schemars(with = "f64")]
        excess: Decimal,
    },
}

impl Warning {
    pub fn message(&self) -> String {
        match self {
            Warning::UnknownAssetType {
                asset_id,
                raw,
                assumed,
            } => format!("{asset_id}: unknown asset type '{raw}', treated as {assumed}"),
            Warning::DepositCapExceeded {
                account_id,
                deposits,
                cap,
            } => format!("{account_id}: deposits {deposits} exceed the cap of {cap}"),
            Warning::AskLossForfeited { account_id, amount } => {
                format!("{account_id}: account closed, unused loss {amount} forfeited")
            }
            Warning::CapitalBalanceReset { from_year, amount } => {
                format!("capital income balance {amount} from {from_year} discarded")
            }
            Warning::SnapshotYearGap {
                snapshot_year,
                year,
            } => format!("opening snapshot is from {snapshot_year}, expected {}", year - 1),
            Warning::NotMarkToMarket {
                account_id,
                asset_id,
            } => format!("{account_id}/{asset_id}: taxed on realization, value change ignored"),
            Warning::DividendInAccountValue {
                account_id,
                asset_id,
            } => format!("{account_id}/{asset_id}: dividend is part of the account value, ignored"),
            Warning::UnknownWithholdingCountry {
                asset_id,
                country,
                assumed_rate,
            } => format!("{asset_id}: no credit rate for '{country}', assumed {assumed_rate}"),
            Warning::WithholdingAboveCredit {
                asset_id,
                country,
                excess,
            } => format!("{asset_id}: {excess} withheld in {country} above the credit, reclaim it there"),
        }
    }
}
