mod cmd;
mod core;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "dktax",
    version,
    about = "Estimate Danish tax on share income, capital income and inventory-taxed accounts"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a tax year and show liabilities per account
    Calculate(cmd::calculate::CalculateCommand),
    /// Show loss pool balances at year end
    Pools(cmd::pools::PoolsCommand),
    /// Show how account and asset types are classified
    Classify(cmd::classify::ClassifyCommand),
    /// Check input records without the full report
    Validate(cmd::validate::ValidateCommand),
    /// Show the rate table
    Rates(cmd::rates::RatesCommand),
    /// Print the expected input formats
    Schema(cmd::schema::SchemaCommand),
}

fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        Command::Calculate(cmd) => cmd.exec(),
        Command::Pools(cmd) => cmd.exec(),
        Command::Classify(cmd) => cmd.exec(),
        Command::Validate(cmd) => cmd.exec(),
        Command::Rates(cmd) => cmd.exec(),
        Command::Schema(cmd) => cmd.exec(),
    }
}
