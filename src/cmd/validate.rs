//! Validate command - surface rejected records and warnings without the full report

use super::InputArgs;
use crate::core::{run_year, RecordError, RecordRef, Warning};
use clap::Args;
use serde::Serialize;

#[derive(Args, Debug)]
pub struct ValidateCommand {
    #[command(flatten)]
    input: InputArgs,

    /// Output as JSON instead of formatted text
    #[arg(long)]
    json: bool,
}

/// JSON output structure
#[derive(Debug, Serialize)]
struct ValidationOutput<'a> {
    year: i32,
    error_count: usize,
    warning_count: usize,
    errors: &'a [RecordError],
    warnings: &'a [Warning],
}

impl ValidateCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        let (input, rates) = self.input.load()?;
        let result = run_year(&rates, &input)?;

        if self.json {
            let output = ValidationOutput {
                year: result.year,
                error_count: result.errors.len(),
                warning_count: result.warnings.len(),
                errors: &result.errors,
                warnings: &result.warnings,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            print_text(result.year, &result.errors, &result.warnings);
        }

        // Warnings never block, errors do
        if !result.errors.is_empty() {
            std::process::exit(1);
        }
        Ok(())
    }
}

fn print_text(year: i32, errors: &[RecordError], warnings: &[Warning]) {
    println!();
    println!("VALIDATION RESULTS ({})", year);
    println!();

    if errors.is_empty() && warnings.is_empty() {
        println!("\u{2713} No issues found.");
        return;
    }

    if !errors.is_empty() {
        println!("\u{2717} {} record(s) rejected:", errors.len());
        println!();
        for (i, error) in errors.iter().enumerate() {
            println!("  {}. [{}] {}", i + 1, error.error, record_name(&error.record));
            println!("     {}", error.message);
            println!();
        }
    }

    if !warnings.is_empty() {
        println!("\u{26A0} {} warning(s):", warnings.len());
        println!();
        for (i, warning) in warnings.iter().enumerate() {
            println!("  {}. {}", i + 1, warning.message());
        }
        println!();
    }
}

fn record_name(record: &RecordRef) -> String {
    match record {
        RecordRef::Transaction { index, asset_id } => {
            format!("transaction #{} ({})", index + 1, asset_id)
        }
        RecordRef::Holding { index, asset_id } => format!("holding #{} ({})", index + 1, asset_id),
        RecordRef::Dividend { index, asset_id } => {
            format!("dividend #{} ({})", index + 1, asset_id)
        }
        RecordRef::Account { index, account_id } => {
            format!("account #{} ('{}')", index + 1, account_id)
        }
    }
}
