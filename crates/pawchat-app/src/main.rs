use anyhow::Result;
use clap::Parser;

use pawchat::{run_repl, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    run_repl(&cli).await
}
