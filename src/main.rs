use clap::Parser;

use stepledger::bootstrap::{LogFormat, init_tracing, load_env};
use stepledger::cli::{Cli, run};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_env();
    init_tracing(LogFormat::from_env());

    let cli = Cli::parse();
    run(cli).await
}
