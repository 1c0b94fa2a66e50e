//! Pools command - loss pool balances at year end

use super::{format_dkk, InputArgs};
use crate::core::{run_year, Carryforward, PoolOverview, PoolStatus, SpousalTransfer};
use clap::Args;
use serde::Serialize;
use tabled::{
    settings::{object::Columns, Alignment, Modify, Style},
    Table, Tabled,
};

#[derive(Args, Debug)]
pub struct PoolsCommand {
    #[command(flatten)]
    input: InputArgs,

    /// Only show pools of this account (isolated pools)
    #[arg(short, long)]
    account: Option<String>,

    /// Output as JSON instead of formatted table
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Tabled)]
struct PoolRow {
    #[tabled(rename = "Pool")]
    pool: String,
    #[tabled(rename = "Balance")]
    balance: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Spousal Transfer")]
    spousal_transfer: String,
    #[tabled(rename = "Carryforward")]
    carryforward: String,
}

#[derive(Debug, Serialize)]
struct PoolsOutput<'a> {
    year: i32,
    pools: Vec<&'a PoolOverview>,
}

impl PoolsCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        let (input, rates) = self.input.load()?;
        let result = run_year(&rates, &input)?;
        let pools: Vec<&PoolOverview> = result
            .per_pool_state
            .iter()
            .filter(|p| {
                self.account
                    .as_deref()
                    .map_or(true, |id| p.account_id.as_deref() == Some(id))
            })
            .collect();

        if self.json {
            let output = PoolsOutput {
                year: result.year,
                pools,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
            return Ok(());
        }

        println!();
        println!("LOSS POOLS (end of {})", result.year);
        println!();
        if pools.is_empty() {
            println!("No loss pools found matching filters");
            return Ok(());
        }

        let rows: Vec<PoolRow> = pools
            .iter()
            .map(|p| PoolRow {
                pool: match &p.account_id {
                    Some(id) => format!("{} ({})", p.kind, id),
                    None => p.kind.to_string(),
                },
                balance: format_dkk(p.balance),
                status: status_name(p.status).to_string(),
                spousal_transfer: spousal_name(p.spousal_transfer).to_string(),
                carryforward: carryforward_name(p.carryforward).to_string(),
            })
            .collect();
        let table = Table::new(rows)
            .with(Style::rounded())
            .with(Modify::new(Columns::new(1..2)).with(Alignment::right()))
            .to_string();
        println!("{}", table);
        Ok(())
    }
}

fn status_name(status: PoolStatus) -> &'static str {
    match status {
        PoolStatus::Empty => "empty",
        PoolStatus::Accumulating => "accumulating",
        PoolStatus::PartiallyConsumed => "partially consumed",
        PoolStatus::Forfeited => "forfeited",
    }
}

fn spousal_name(rule: SpousalTransfer) -> &'static str {
    match rule {
        SpousalTransfer::Mandatory => "mandatory",
        SpousalTransfer::Optional => "optional",
        SpousalTransfer::Never => "never",
    }
}

fn carryforward_name(rule: Carryforward) -> &'static str {
    match rule {
        Carryforward::Unlimited => "unlimited",
        Carryforward::ForfeitedOnClosure => "forfeited on closure",
    }
}
