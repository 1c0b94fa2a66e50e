pub mod calculate;
pub mod classify;
pub mod pools;
pub mod rates;
pub mod schema;
pub mod validate;

use crate::core::{read_transactions_csv, read_year_input, FilingStatus, RateTable, YearInput};
use anyhow::Context;
use clap::{Args, ValueEnum};
use rust_decimal::Decimal;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

/// Input options shared by every command that runs a tax year.
#[derive(Args, Debug)]
pub struct InputArgs {
    /// Year input (JSON). Reads from stdin if not specified or "-".
    #[arg(default_value = "-")]
    pub input: PathBuf,

    /// Extra realized transactions (CSV), appended to the input's transactions
    #[arg(short, long)]
    pub transactions: Option<PathBuf>,

    /// Rate table (JSON) replacing the built-in Danish rates
    #[arg(short, long)]
    pub rates: Option<PathBuf>,

    /// Override the input's filing status
    #[arg(long, value_enum)]
    pub filing_status: Option<FilingStatusArg>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FilingStatusArg {
    Single,
    Married,
}

impl From<FilingStatusArg> for FilingStatus {
    fn from(arg: FilingStatusArg) -> Self {
        match arg {
            FilingStatusArg::Single => FilingStatus::Single,
            FilingStatusArg::Married => FilingStatus::Married,
        }
    }
}

impl InputArgs {
    /// Read the year input, merge CSV transactions and apply overrides.
    pub fn load(&self) -> anyhow::Result<(YearInput, RateTable)> {
        let mut input = read_year_input(open(&self.input)?)
            .with_context(|| format!("reading year input {}", self.input.display()))?;
        if let Some(path) = &self.transactions {
            let transactions = read_transactions_csv(open(path)?, input.year)
                .with_context(|| format!("reading transactions {}", path.display()))?;
            log::info!("{} transactions from {}", transactions.len(), path.display());
            input.transactions.extend(transactions);
        }
        if let Some(status) = self.filing_status {
            input.filing_status = status.into();
        }
        let rates = load_rates(self.rates.as_deref())?;
        Ok((input, rates))
    }
}

pub fn load_rates(path: Option<&Path>) -> anyhow::Result<RateTable> {
    match path {
        Some(path) => RateTable::from_json(open(path)?)
            .with_context(|| format!("reading rate table {}", path.display())),
        None => Ok(RateTable::danish()),
    }
}

/// Open a file, or stdin for "-".
fn open(path: &Path) -> anyhow::Result<Box<dyn Read>> {
    if path.as_os_str() == "-" {
        let mut buffer = Vec::new();
        BufReader::new(io::stdin().lock()).read_to_end(&mut buffer)?;
        if buffer.is_empty() {
            anyhow::bail!("No input received. Provide a file or pipe data to stdin.");
        }
        Ok(Box::new(io::Cursor::new(buffer)))
    } else {
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        Ok(Box::new(BufReader::new(file)))
    }
}

fn format_dkk(amount: Decimal) -> String {
    if amount < Decimal::ZERO {
        format!("-{:.2} kr", amount.abs().round_dp(2))
    } else {
        format!("{:.2} kr", amount.round_dp(2))
    }
}

fn format_rate(rate: Decimal) -> String {
    format!("{}%", (rate * Decimal::ONE_HUNDRED).normalize())
}
