use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = risk_register_cli::Cli::parse();
    risk_register_cli::run_cli(cli)
}
