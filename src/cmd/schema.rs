//! Schema command - print expected input formats

use crate::core::{RateTable, TransactionRecord, YearInput};
use clap::Args;
use schemars::schema_for;

#[derive(Args, Debug)]
pub struct SchemaCommand {
    /// Output format
    #[arg(value_enum, default_value = "json-schema")]
    format: SchemaFormat,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum SchemaFormat {
    /// JSON Schema for the year input
    JsonSchema,
    /// JSON Schema for a custom rate table
    RatesSchema,
    /// CSV header row for the transactions file
    CsvHeader,
    /// CSV column descriptions
    CsvFields,
}

impl SchemaCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        match self.format {
            SchemaFormat::JsonSchema => {
                let schema = schema_for!(YearInput);
                println!("{}", serde_json::to_string_pretty(&schema)?);
            }
            SchemaFormat::RatesSchema => {
                let schema = schema_for!(RateTable);
                println!("{}", serde_json::to_string_pretty(&schema)?);
            }
            SchemaFormat::CsvHeader => println!("{}", TransactionRecord::csv_header()),
            SchemaFormat::CsvFields => print_csv_fields(),
        }
        Ok(())
    }
}

fn print_csv_fields() {
    println!("CSV Input Format");
    println!("================");
    println!();
    for column in TransactionRecord::csv_columns() {
        let req = if column.required {
            "required"
        } else {
            "optional"
        };
        println!("{:20} ({:8})  {}", column.name, req, column.description);
    }
    println!();
    println!("Amounts are in DKK. Gains are positive, losses negative.");
}
