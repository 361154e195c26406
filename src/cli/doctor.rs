//! `stepledger doctor` - active health diagnostics.
//!
//! Validates configuration and probes the wallet endpoint and the ledger so
//! problems surface before a submission. Each check reports pass/fail with
//! actionable guidance on failures.

use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::engine::{Capability, CapabilityProfile};
use crate::ledger::{LedgerConnector, RpcLedgerConnector};
use crate::rpc::JsonRpcClient;
use crate::session::{FileResumeStore, ResumeHintStore};
use crate::types::{Address, parse_quantity};
use crate::view::mask_address;
use crate::wallet::network_name;

/// Run diagnostic checks and print results.
pub async fn run_doctor_command(strict: bool) -> anyhow::Result<()> {
    println!("stepledger doctor");
    println!("=================\n");

    let mut passed = 0u32;
    let mut failed = 0u32;

    // ── Configuration checks ──────────────────────────────────

    let settings_path = crate::config::helpers::optional_env("STEPLEDGER_SETTINGS_PATH")
        .ok()
        .flatten()
        .map(std::path::PathBuf::from)
        .unwrap_or_else(crate::settings::Settings::default_path);
    check(
        "Settings file",
        check_settings_file(&settings_path),
        &mut passed,
        &mut failed,
    );

    let config = Config::from_env();
    check(
        "Configuration",
        match &config {
            Ok(config) => CheckResult::Pass(format!(
                "target {} ({}), {} steps",
                config.ledger.chain.name, config.ledger.chain.chain_id, config.ledger.total_steps
            )),
            Err(e) => CheckResult::Fail(e.to_string()),
        },
        &mut passed,
        &mut failed,
    );

    let Ok(config) = config else {
        summarize(passed, failed, strict)?;
        return Ok(());
    };

    check(
        "Etherscan API key",
        if config.indexer.etherscan_api_key.is_some() {
            CheckResult::Pass("configured".to_string())
        } else {
            CheckResult::Skip("not set; approval links use the keyless rate limit".to_string())
        },
        &mut passed,
        &mut failed,
    );

    check(
        "Resume hint",
        check_resume_hint(&FileResumeStore::new(config.resume.path.clone())).await,
        &mut passed,
        &mut failed,
    );

    // ── Connectivity checks ───────────────────────────────────

    let client = Arc::new(JsonRpcClient::new(
        config.wallet.rpc_url.clone(),
        config.wallet.rpc_timeout,
    ));
    let wallet_chain = check_wallet_endpoint(&client).await;
    let on_target = matches!(&wallet_chain, Ok(id) if *id == config.ledger.chain.chain_id);
    check(
        "Wallet endpoint",
        match &wallet_chain {
            Ok(id) => CheckResult::Pass(format!(
                "{} on {} ({})",
                redact_url_for_display(&config.wallet.rpc_url),
                network_name(*id),
                id
            )),
            Err(e) => CheckResult::Fail(format!(
                "{} unreachable: {e}",
                redact_url_for_display(&config.wallet.rpc_url)
            )),
        },
        &mut passed,
        &mut failed,
    );

    check(
        "Wallet network",
        match wallet_chain {
            Ok(_) if on_target => CheckResult::Pass(config.ledger.chain.name.to_string()),
            Ok(id) => CheckResult::Fail(format!(
                "wallet is on {} ({id}); switch to {} before submitting",
                network_name(id),
                config.ledger.chain.name
            )),
            Err(_) => CheckResult::Skip("wallet endpoint unreachable".to_string()),
        },
        &mut passed,
        &mut failed,
    );

    let ledger_check = if on_target {
        let connector = RpcLedgerConnector::new(client, config.ledger.contracts.clone());
        let ledger = connector.connect(config.ledger.chain.chain_id);
        let profile = crate::engine::resolve(ledger.as_ref(), Address::ZERO).await;
        describe_profile(ledger.address(), &profile)
    } else {
        CheckResult::Skip("wallet is not on the target network".to_string())
    };
    check("Ledger capabilities", ledger_check, &mut passed, &mut failed);

    summarize(passed, failed, strict)
}

fn summarize(passed: u32, failed: u32, strict: bool) -> anyhow::Result<()> {
    println!();
    println!("  {passed} passed, {failed} failed");

    if failed > 0 {
        println!("\n  Some checks failed. Fix them before submitting steps.");
        if strict {
            anyhow::bail!("doctor strict mode failed with {failed} check(s)");
        }
    }

    Ok(())
}

// ── Individual checks ───────────────────────────────────────

fn check(name: &str, result: CheckResult, passed: &mut u32, failed: &mut u32) {
    match result {
        CheckResult::Pass(detail) => {
            *passed += 1;
            println!("  [pass] {name}: {detail}");
        }
        CheckResult::Fail(detail) => {
            *failed += 1;
            println!("  [FAIL] {name}: {detail}");
        }
        CheckResult::Skip(reason) => {
            println!("  [skip] {name}: {reason}");
        }
    }
}

enum CheckResult {
    Pass(String),
    Fail(String),
    Skip(String),
}

fn check_settings_file(path: &Path) -> CheckResult {
    if !path.exists() {
        return CheckResult::Skip(format!("{} not found; using defaults", path.display()));
    }
    match std::fs::read_to_string(path) {
        Ok(data) => match serde_json::from_str::<crate::settings::Settings>(&data) {
            Ok(_) => CheckResult::Pass(path.display().to_string()),
            Err(e) => CheckResult::Fail(format!("{} is not valid: {e}", path.display())),
        },
        Err(e) => CheckResult::Fail(format!("cannot read {}: {e}", path.display())),
    }
}

async fn check_resume_hint(store: &dyn ResumeHintStore) -> CheckResult {
    match store.load().await {
        Some(hint) => CheckResult::Pass(format!(
            "{} (saved {})",
            mask_address(&hint.account),
            hint.saved_at.format("%Y-%m-%d %H:%M UTC")
        )),
        None => CheckResult::Skip("no remembered account".to_string()),
    }
}

async fn check_wallet_endpoint(client: &JsonRpcClient) -> Result<u64, String> {
    let raw: String = client
        .call_as("eth_chainId", serde_json::json!([]))
        .await
        .map_err(|e| e.to_string())?;
    parse_quantity(&raw)
        .and_then(|id| u64::try_from(id).ok())
        .ok_or_else(|| format!("unexpected chain id {raw}"))
}

fn describe_profile(address: Address, profile: &CapabilityProfile) -> CheckResult {
    if !profile.reachable {
        return CheckResult::Fail(format!("ledger at {address} did not answer any probe"));
    }
    let slot = |capability: Capability| {
        capability
            .method()
            .map(|m| m.name().to_string())
            .unwrap_or_else(|| "-".to_string())
    };
    let detail = format!(
        "{address}: position {}, completed {}, per-step {}",
        slot(profile.read_position),
        slot(profile.read_completed_count),
        slot(profile.read_per_step_status)
    );
    if profile.read_per_step_status.is_resolved() || profile.has_aggregate() {
        CheckResult::Pass(detail)
    } else {
        CheckResult::Fail(format!("{detail}; no status read is available"))
    }
}

fn redact_url_for_display(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut url) => {
            if !url.username().is_empty() {
                let _ = url.set_username("redacted");
            }
            if url.password().is_some() {
                let _ = url.set_password(Some("redacted"));
            }
            url.to_string()
        }
        Err(_) => "<invalid-url>".to_string(),
    }
}
