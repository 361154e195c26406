//! `stepledger` command-line interface.

pub mod doctor;

use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

use crate::config::Config;
use crate::engine::{FixedAnswer, SwitchPrompt};
use crate::indexer::EtherscanClient;
use crate::ledger::RpcLedgerConnector;
use crate::rpc::JsonRpcClient;
use crate::session::{
    FileResumeStore, Presenter, Session, SessionDeps, SessionEvent, SessionSnapshot,
};
use crate::view::{OutputFormat, TerminalPresenter};
use crate::wallet::{ChainDefinition, JsonRpcWallet, Network, ProviderWatcher, WalletProvider, WatchState};

#[derive(Parser, Debug)]
#[command(name = "stepledger", version, about = "Track and advance your on-chain step ledger")]
pub struct Cli {
    /// Print output as JSON lines.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Connect the wallet and print the current step status.
    Status {
        /// Reuse the remembered account without prompting the wallet.
        #[arg(long)]
        resume: bool,
    },

    /// Submit a step to the ledger.
    Submit {
        /// 1-based step number.
        step: usize,

        /// Switch networks without asking.
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// Follow account and network changes until Ctrl-C.
    Watch {
        #[arg(long)]
        resume: bool,
    },

    /// Forget the remembered account.
    Disconnect,

    /// Check configuration and connectivity.
    Doctor {
        /// Exit with an error if any check fails.
        #[arg(long)]
        strict: bool,
    },
}

/// Asks on the terminal; reads one line from stdin.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdinPrompt;

#[async_trait]
impl SwitchPrompt for StdinPrompt {
    async fn confirm_switch(&self, observed: &Network, target: &ChainDefinition) -> bool {
        let question = format!(
            "Wallet is on {} (chain {}). Switch to {}? [y/N] ",
            observed.name, observed.id, target.name
        );
        let answer = tokio::task::spawn_blocking(move || {
            eprint!("{question}");
            let _ = std::io::stderr().flush();
            let mut line = String::new();
            std::io::stdin().read_line(&mut line).map(|_| line)
        })
        .await;
        match answer {
            Ok(Ok(line)) => matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
            _ => false,
        }
    }
}

/// Keeps one-shot commands from printing every intermediate pass.
struct Quiet;

impl Presenter for Quiet {
    fn render(&self, _snapshot: &SessionSnapshot) {}
}

struct Runtime {
    wallet: Arc<dyn WalletProvider>,
    session: Session,
}

fn build_runtime(
    config: &Config,
    presenter: Arc<dyn Presenter>,
    prompt: Arc<dyn SwitchPrompt>,
) -> Runtime {
    let client = Arc::new(JsonRpcClient::new(
        config.wallet.rpc_url.clone(),
        config.wallet.rpc_timeout,
    ));
    let wallet: Arc<dyn WalletProvider> = Arc::new(JsonRpcWallet::new(
        client.clone(),
        config.wallet.poll_interval,
        config.wallet.confirmation_timeout,
    ));
    let deps = SessionDeps {
        wallet: wallet.clone(),
        ledgers: Arc::new(RpcLedgerConnector::new(
            client,
            config.ledger.contracts.clone(),
        )),
        history: Arc::new(EtherscanClient::new(
            config.indexer.etherscan_api_key.clone(),
            config.indexer.timeout,
        )),
        resume: Arc::new(FileResumeStore::new(config.resume.path.clone())),
        presenter,
    };
    let session = Session::new(deps, config.ledger.chain, config.ledger.total_steps)
        .with_prompt(prompt);
    Runtime { wallet, session }
}

async fn open(session: &Session, resume: bool) -> anyhow::Result<()> {
    if resume && session.try_resume().await? {
        return Ok(());
    }
    session.connect().await?;
    Ok(())
}

/// Dispatch a parsed command line.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };
    let terminal = TerminalPresenter::new(format);

    if let Command::Doctor { strict } = cli.command {
        return doctor::run_doctor_command(strict).await;
    }

    let config = Config::from_env()?;
    tracing::debug!(
        settings = %config.settings_path.display(),
        wallet = %config.wallet.rpc_url,
        chain_id = config.ledger.chain.chain_id,
        "Configuration loaded"
    );

    match cli.command {
        Command::Status { resume } => {
            let runtime = build_runtime(&config, Arc::new(Quiet), Arc::new(StdinPrompt));
            open(&runtime.session, resume).await?;
            terminal.render(&runtime.session.snapshot().await);
        }
        Command::Submit { step, yes } => {
            let prompt: Arc<dyn SwitchPrompt> = if yes {
                Arc::new(FixedAnswer(true))
            } else {
                Arc::new(StdinPrompt)
            };
            let runtime = build_runtime(&config, Arc::new(Quiet), prompt);
            open(&runtime.session, true).await?;
            let result = runtime.session.submit(step).await;
            terminal.render(&runtime.session.snapshot().await);
            let confirmed = result?;
            eprintln!(
                "Step {} confirmed in transaction {}",
                confirmed.step, confirmed.hash
            );
        }
        Command::Watch { resume } => {
            let (tx, rx) = mpsc::unbounded_channel();
            let Runtime { wallet, session } =
                build_runtime(&config, Arc::new(terminal), Arc::new(StdinPrompt));
            let session = Arc::new(session.with_events(tx.clone()));
            open(&session, resume).await?;

            let snapshot = session.snapshot().await;
            let seed = match &snapshot.identity {
                Some(identity) => WatchState::seeded(
                    wallet.accounts().await.unwrap_or_default(),
                    identity.network.id,
                ),
                None => WatchState::default(),
            };
            let watcher =
                ProviderWatcher::new(wallet, config.wallet.poll_interval, seed).spawn(tx.clone());
            let runner = {
                let session = session.clone();
                tokio::spawn(async move { session.run(rx).await })
            };

            tokio::signal::ctrl_c().await?;
            tracing::info!("Stopping");
            let _ = tx.send(SessionEvent::Shutdown);
            watcher.abort();
            let _ = runner.await;
        }
        Command::Disconnect => {
            let runtime = build_runtime(&config, Arc::new(Quiet), Arc::new(FixedAnswer(false)));
            runtime.session.disconnect().await;
            eprintln!("Forgot the remembered account.");
        }
        Command::Doctor { .. } => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_submit_with_global_json() {
        let cli = Cli::try_parse_from(["stepledger", "submit", "3", "--yes", "--json"]).unwrap();
        assert!(cli.json);
        assert!(matches!(cli.command, Command::Submit { step: 3, yes: true }));
    }

    #[test]
    fn rejects_non_numeric_step() {
        assert!(Cli::try_parse_from(["stepledger", "submit", "three"]).is_err());
    }
}
