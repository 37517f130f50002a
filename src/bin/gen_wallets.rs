//! Generate Wallets
//!
//! Without `--count`, prints one fresh `privateKey\taddress` line.
//! With `--count N`, appends N such lines to `--out` (default wallets.tsv).

use anyhow::Result;
use clap::Parser;
use mint_sentinel::chain::wallet::generate;
use mint_sentinel::logging;
use mint_sentinel::tools::{append_wallets, wallet_line};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "gen-wallets")]
struct Args {
    #[arg(long)]
    count: Option<usize>,

    #[arg(long, default_value = "wallets.tsv")]
    out: PathBuf,
}

fn main() -> Result<()> {
    logging::init_console();
    let args = Args::parse();

    match args.count {
        None => println!("{}", wallet_line(&generate())),
        Some(count) => {
            let written = append_wallets(&args.out, count)?;
            info!("Appended {} wallets to {}", written.len(), args.out.display());
        }
    }
    Ok(())
}
