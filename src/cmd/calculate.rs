//! Calculate command - run one tax year and print the liabilities

use super::{format_dkk, format_rate, InputArgs};
use crate::core::{audit_digest, run_year, AssessmentMethod, TaxResult, TaxYear, YearInput};
use clap::Args;
use rust_decimal::Decimal;
use serde::Serialize;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

#[derive(Args, Debug)]
pub struct CalculateCommand {
    #[command(flatten)]
    input: InputArgs,

    /// Output as JSON instead of formatted tables
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct CalculateOutput<'a> {
    result: &'a TaxResult,
    audit_digest: String,
}

#[derive(Debug, Clone, Tabled)]
struct AccountRow {
    #[tabled(rename = "Account")]
    account: String,
    #[tabled(rename = "Type")]
    account_type: String,
    #[tabled(rename = "Realized")]
    realized: String,
    #[tabled(rename = "Unrealized")]
    unrealized: String,
    #[tabled(rename = "Loss Used")]
    loss_used: String,
    #[tabled(rename = "Taxable")]
    taxable: String,
    #[tabled(rename = "Rate")]
    rate: String,
    #[tabled(rename = "Tax")]
    tax: String,
}

impl CalculateCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        let (input, rates) = self.input.load()?;
        let result = run_year(&rates, &input)?;
        if self.json {
            self.print_json(&input, &result)
        } else {
            self.print_summary(&result);
            Ok(())
        }
    }

    fn print_json(&self, input: &YearInput, result: &TaxResult) -> anyhow::Result<()> {
        let output = CalculateOutput {
            result,
            audit_digest: audit_digest(input, result)?,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        Ok(())
    }

    fn print_summary(&self, result: &TaxResult) {
        println!();
        println!("TAX ESTIMATE {}", result.year);
        println!();

        let rows: Vec<AccountRow> = result
            .per_account_liability
            .values()
            .map(|l| AccountRow {
                account: l.display_name.clone(),
                account_type: l.account_type.label().to_string(),
                realized: format_dkk(l.realized),
                unrealized: format_dkk(l.unrealized),
                loss_used: format_dkk(l.loss_used),
                taxable: match l.method {
                    AssessmentMethod::Joint => "joint".to_string(),
                    _ => format_dkk(l.taxable),
                },
                rate: l.rate.map_or("-".to_string(), format_rate),
                tax: l.tax.map_or("see below".to_string(), format_dkk),
            })
            .collect();
        if rows.is_empty() {
            println!("  (no accounts)");
        } else {
            let table = Table::new(rows)
                .with(Style::rounded())
                .with(Modify::new(Rows::new(1..)).with(Alignment::right()))
                .to_string();
            println!("{}", table);
        }
        for accrual in result.accruals.iter().filter(|a| !a.holdings.is_empty()) {
            if let Some(account_tax) = accrual.account_tax {
                let indicative = accrual.indicative_total();
                if indicative != account_tax {
                    println!(
                        "  {}: holdings taxed one by one would be {}, the account net gives {}",
                        accrual.account_id,
                        format_dkk(indicative),
                        format_dkk(account_tax)
                    );
                }
            }
        }
        println!();

        let share = &result.share_income;
        println!("SHARE INCOME");
        for (kind, net) in &share.net_by_pool {
            println!("  Net {}: {}", kind, format_dkk(*net));
        }
        let consumed: Decimal = share.nettings.iter().map(|n| n.consumed()).sum();
        println!("  Losses used: {}", format_dkk(consumed));
        println!("  Taxable: {}", format_dkk(share.tax.taxable));
        println!(
            "  Low band: {} -> {} | High band: {} -> {}",
            format_dkk(share.tax.low_band_amount),
            format_dkk(share.tax.low_band_tax),
            format_dkk(share.tax.high_band_amount),
            format_dkk(share.tax.high_band_tax),
        );
        if !share.dividends.is_zero() {
            println!("  Dividends: {}", format_dkk(share.dividends));
        }
        println!("  Tax: {}", format_dkk(share.tax.total));
        if !share.withholding.is_empty() {
            println!(
                "  Withheld at source: {} credited | Residual tax: {}",
                format_dkk(share.withholding_credit),
                format_dkk(share.residual_tax)
            );
            for credit in share.withholding.iter().filter(|c| c.excess > Decimal::ZERO) {
                println!(
                    "    {} ({}): reclaim {} abroad",
                    credit.asset_id,
                    credit.country,
                    format_dkk(credit.excess)
                );
            }
        }
        println!();

        let capital = &result.capital_income;
        println!("CAPITAL INCOME");
        println!(
            "  Gains: {} | Losses: {} | Net: {}",
            format_dkk(capital.balance.gains),
            format_dkk(capital.balance.losses),
            format_dkk(capital.balance.net_amount)
        );
        match &capital.deduction {
            Some(d) => println!(
                "  Deduction: {} @ {} + {} @ {} = {}",
                format_dkk(d.lower_tier_amount),
                format_rate(d.lower_tier_rate),
                format_dkk(d.upper_tier_amount),
                format_rate(d.upper_tier_rate),
                format_dkk(d.value)
            ),
            None => println!("  Tax: {}", format_dkk(capital.tax_effect)),
        }
        println!();

        println!("TOTAL: {}", format_dkk(result.total_tax));
        let settlement = &result.settlement;
        println!(
            "  Via annual assessment: {} | Withheld by institutions: {}",
            format_dkk(settlement.via_annual_assessment),
            format_dkk(settlement.withheld_automatically)
        );
        println!(
            "  Withheld at source: {} | Capital income deduction: {}",
            format_dkk(settlement.withheld_at_source),
            format_dkk(settlement.capital_income_credit)
        );
        if let Some(date) = TaxYear(result.year).assessment_date() {
            println!("Assessment expected from {}", date.format("%Y-%m-%d"));
        }
        println!();

        if !result.warnings.is_empty() {
            println!("\u{26A0} {} warning(s):", result.warnings.len());
            for warning in &result.warnings {
                println!("  - {}", warning.message());
            }
            println!();
        }
        if !result.errors.is_empty() {
            println!("\u{2717} {} record(s) rejected:", result.errors.len());
            for error in &result.errors {
                println!("  - [{}] {}", error.error, error.message);
            }
            println!();
        }
    }
}
