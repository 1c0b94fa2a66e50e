//! Rates command - print the configured rate table

use super::{format_dkk, format_rate, load_rates};
use crate::core::{AccountType, YearRates};
use clap::Args;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tabled::{
    settings::{object::Columns, Alignment, Modify, Style},
    Table, Tabled,
};

#[derive(Args, Debug)]
pub struct RatesCommand {
    /// Only this tax year
    #[arg(short, long)]
    year: Option<i32>,

    /// Rate table (JSON) replacing the built-in Danish rates
    #[arg(short, long)]
    rates: Option<PathBuf>,

    /// Output as JSON instead of formatted table
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Tabled)]
struct RateRow {
    #[tabled(rename = "Rate")]
    name: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

impl RatesCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        let table = load_rates(self.rates.as_deref())?;
        let years: BTreeMap<i32, &YearRates> = match self.year {
            Some(year) => [(year, table.for_year(year)?)].into_iter().collect(),
            None => table.years().map(|(year, rates)| (*year, rates)).collect(),
        };

        if self.json {
            println!("{}", serde_json::to_string_pretty(&years)?);
            return Ok(());
        }

        for (year, rates) in years {
            println!();
            println!("RATES {}", year);
            let table = Table::new(rate_rows(rates))
                .with(Style::rounded())
                .with(Modify::new(Columns::new(1..)).with(Alignment::right()))
                .to_string();
            println!("{}", table);
        }
        Ok(())
    }
}

fn rate_rows(rates: &YearRates) -> Vec<RateRow> {
    let share = &rates.share_income;
    let capital = &rates.capital_income;
    let row = |name: &'static str, value: String| RateRow { name, value };
    vec![
        row("Share income, low rate", format_rate(share.low_rate)),
        row("Share income, high rate", format_rate(share.high_rate)),
        row("Share income threshold", format_dkk(share.threshold)),
        row(
            "Share income threshold (spouses)",
            format_dkk(share.threshold_married),
        ),
        row("Capital income, base rate", format_rate(capital.base_rate)),
        row("Capital income, surtax", format_rate(capital.surtax_rate)),
        row(
            "Capital income, surtax threshold",
            format_dkk(capital.surtax_threshold),
        ),
        row("Capital income, ceiling", format_rate(capital.ceiling_rate)),
        row(
            "Negative capital income, below threshold",
            format_rate(capital.municipal_deduction_rate + capital.deduction_supplement_rate),
        ),
        row(
            "Negative capital income, above threshold",
            format_rate(capital.municipal_deduction_rate),
        ),
        row(
            "Deduction threshold (single)",
            format_dkk(capital.deduction_threshold_single),
        ),
        row(
            "Deduction threshold (married)",
            format_dkk(capital.deduction_threshold_married),
        ),
        row(
            "Equity savings (ASK)",
            format_rate(rates.equity_savings.rate),
        ),
        row(
            "Equity savings deposit cap",
            format_dkk(rates.equity_savings.deposit_cap),
        ),
        row(
            "Pension (PAL)",
            rates
                .flat_rate(AccountType::RatePension)
                .map_or("-".to_string(), format_rate),
        ),
        row("Child savings", format_rate(rates.child_savings_rate)),
        row(
            "Dividend withholding credit (default)",
            format_rate(rates.withholding_credit.default_rate),
        ),
    ]
}
