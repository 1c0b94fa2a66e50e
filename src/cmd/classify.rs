//! Classify command - the account/asset classification matrix

use crate::core::{classify, forbidden_asset_types, AccountType, AssetType, Classification};
use clap::Args;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

#[derive(Args, Debug)]
pub struct ClassifyCommand {
    /// Only this account type (e.g. general_brokerage, ASK)
    #[arg(short, long)]
    account: Option<AccountType>,

    /// Only this asset type (e.g. etf_approved, AKTIE_DK, WARRANT)
    #[arg(short = 's', long)]
    asset: Option<String>,

    /// Include combinations the account type does not allow
    #[arg(long)]
    all: bool,

    /// Output as JSON instead of formatted table
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct MatrixEntry {
    account_type: AccountType,
    asset_type: AssetType,
    allowed: bool,
    classification: Option<Classification>,
}

#[derive(Debug, Clone, Tabled)]
struct MatrixRow {
    #[tabled(rename = "Account")]
    account: String,
    #[tabled(rename = "Asset")]
    asset: String,
    #[tabled(rename = "Income")]
    income: String,
    #[tabled(rename = "Method")]
    method: String,
    #[tabled(rename = "Loss Pool")]
    pool: String,
}

impl ClassifyCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        let assets = match &self.asset {
            Some(raw) => {
                let resolved = AssetType::resolve(raw);
                if !resolved.recognized {
                    eprintln!(
                        "Unknown asset type '{}', showing the conservative default ({})",
                        raw, resolved.asset_type
                    );
                }
                vec![resolved.asset_type]
            }
            None => AssetType::ALL.to_vec(),
        };
        let accounts = match self.account {
            Some(account) => vec![account],
            None => AccountType::ALL.to_vec(),
        };

        let entries: Vec<MatrixEntry> = accounts
            .iter()
            .flat_map(|account| {
                assets.iter().map(move |asset| {
                    let classification = classify(*account, *asset).ok();
                    MatrixEntry {
                        account_type: *account,
                        asset_type: *asset,
                        allowed: classification.is_some(),
                        classification,
                    }
                })
            })
            .filter(|entry| self.all || entry.allowed || self.asset.is_some())
            .collect();

        if self.json {
            println!("{}", serde_json::to_string_pretty(&entries)?);
            return Ok(());
        }

        let rows: Vec<MatrixRow> = entries
            .iter()
            .map(|entry| match &entry.classification {
                Some(c) => MatrixRow {
                    account: entry.account_type.label().to_string(),
                    asset: entry.asset_type.to_string(),
                    income: c.income_category.to_string(),
                    method: c.taxation_method.to_string(),
                    pool: c.loss_pool.map_or("-".to_string(), |kind| kind.to_string()),
                },
                None => MatrixRow {
                    account: entry.account_type.label().to_string(),
                    asset: entry.asset_type.to_string(),
                    income: "not allowed".to_string(),
                    method: "-".to_string(),
                    pool: "-".to_string(),
                },
            })
            .collect();
        println!("{}", Table::new(rows).with(Style::rounded()));

        if let (Some(account), false) = (self.account, self.all) {
            let forbidden: Vec<String> = forbidden_asset_types(account)
                .into_iter()
                .map(|asset| asset.to_string())
                .collect();
            if !forbidden.is_empty() {
                println!("Not allowed on {}: {}", account.label(), forbidden.join(", "));
            }
        }
        Ok(())
    }
}
