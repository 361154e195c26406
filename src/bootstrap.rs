//! Bootstrap helpers for stepledger.
//!
//! Env vars can be kept in `~/.stepledger/.env` (standard dotenvy format) so
//! the CLI works without exporting anything in the shell.

use std::path::{Path, PathBuf};

use tracing_subscriber::EnvFilter;

/// Default log filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "stepledger=info";

/// Directory holding stepledger's files: `~/.stepledger`.
pub fn stepledger_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".stepledger")
}

/// Path to the stepledger-specific `.env` file: `~/.stepledger/.env`.
pub fn stepledger_env_path() -> PathBuf {
    stepledger_dir().join(".env")
}

/// Load env vars from `./.env` and then `~/.stepledger/.env`.
///
/// dotenvy never overwrites existing env vars, so the effective priority is:
///
///   explicit env vars > `./.env` > `~/.stepledger/.env`
pub fn load_env() {
    let _ = dotenvy::dotenv();
    load_env_file(&stepledger_env_path());
}

fn load_env_file(path: &Path) {
    if path.exists()
        && let Err(e) = dotenvy::from_path(path)
    {
        eprintln!("Warning: failed to load {}: {}", path.display(), e);
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    /// Read `STEPLEDGER_LOG_FORMAT`; anything but `json` means text.
    pub fn from_env() -> Self {
        match std::env::var("STEPLEDGER_LOG_FORMAT") {
            Ok(value) if value.trim().eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Text,
        }
    }
}

/// Install the global tracing subscriber. Logs go to stderr so stdout stays
/// clean for rendered output.
pub fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let result = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.with_target(false).try_init(),
    };
    if let Err(e) = result {
        eprintln!("Warning: tracing already initialized: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_stepledger_env_path() {
        let path = stepledger_env_path();
        assert!(path.ends_with(".stepledger/.env"));
    }

    #[test]
    fn test_env_file_with_quoted_values_parses() {
        let dir = tempdir().unwrap();
        let env_path = dir.path().join(".env");
        std::fs::write(
            &env_path,
            "STEPLEDGER_WALLET_RPC_URL=\"http://127.0.0.1:1248\"\nETHERSCAN_API_KEY=\"a#b\"\n",
        )
        .unwrap();

        let parsed: Vec<(String, String)> = dotenvy::from_path_iter(&env_path)
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].1, "http://127.0.0.1:1248");
        // Quoting keeps `#` from being read as a comment.
        assert_eq!(parsed[1].1, "a#b");
    }

    #[test]
    fn test_missing_env_file_is_ignored() {
        let dir = tempdir().unwrap();
        load_env_file(&dir.path().join("missing.env"));
    }
}
