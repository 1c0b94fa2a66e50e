//! Input readers: the JSON year input and the flat CSV transaction format.

use crate::core::engine::{TaxTransaction, YearInput};
use crate::core::rates::TaxYear;
use chrono::NaiveDate;
use dktax_derive::CsvSchema;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::io::Read;

/// One CSV column as described by `#[derive(CsvSchema)]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvColumn {
    pub name: &'static str,
    pub required: bool,
    pub description: &'static str,
}

/// One row of the transactions CSV.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, CsvSchema)]
pub struct TransactionRecord {
    /// Account id, must match an account in the year input
    pub account_id: String,
    /// Instrument identifier (ticker, ISIN)
    pub asset_id: String,
    /// Asset type, e.g. listed_share_domestic or AKTIE_DK
    pub asset_type: String,
    /// Realized gain (positive) or loss (negative) in DKK
    pub realized_gain_loss: Decimal,
    /// Trade date (YYYY-MM-DD), used for the tax year when `year` is empty
    pub date: Option<NaiveDate>,
    /// Tax year; defaults to the date's year, then to the input's year
    pub year: Option<i32>,
}

impl TransactionRecord {
    /// A row giving both a year and a date must agree on the tax year.
    pub fn check_dates(&self) -> anyhow::Result<()> {
        if let (Some(year), Some(date)) = (self.year, self.date) {
            if !TaxYear(year).contains(date) {
                anyhow::bail!("trade date {} is outside tax year {}", date, year);
            }
        }
        Ok(())
    }

    pub fn into_transaction(self, default_year: i32) -> TaxTransaction {
        let year = self
            .year
            .or_else(|| self.date.map(|date| TaxYear::from_date(date).0))
            .unwrap_or(default_year);
        TaxTransaction {
            account_id: self.account_id,
            asset_id: self.asset_id,
            asset_type: self.asset_type,
            realized_gain_loss: self.realized_gain_loss,
            year,
        }
    }
}

/// Read transactions from CSV. Rows without a year or date get `default_year`.
pub fn read_transactions_csv<R: Read>(
    reader: R,
    default_year: i32,
) -> anyhow::Result<Vec<TaxTransaction>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut transactions = Vec::new();
    for (index, row) in rdr.deserialize::<TransactionRecord>().enumerate() {
        let record = row?;
        // Row 1 is the header
        record
            .check_dates()
            .map_err(|err| anyhow::anyhow!("row {}: {}", index + 2, err))?;
        transactions.push(record.into_transaction(default_year));
    }
    Ok(transactions)
}

/// Read a year input from JSON.
pub fn read_year_input<R: Read>(reader: R) -> anyhow::Result<YearInput> {
    Ok(serde_json::from_reader(reader)?)
}
