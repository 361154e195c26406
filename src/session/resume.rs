//! Last-connected-account hint.
//!
//! The hint is stored in `~/.stepledger/session.json` and only ever used to
//! silently re-establish a session when the wallet still authorizes the same
//! account. It is never a substitute for live authorization.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ResumeError;
use crate::types::Address;

/// Hint data persisted to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeHint {
    pub account: Address,
    pub saved_at: DateTime<Utc>,
}

/// Get the default hint file path (~/.stepledger/session.json).
pub fn default_resume_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".stepledger")
        .join("session.json")
}

fn parse_saved_at(value: Option<&serde_json::Value>) -> DateTime<Utc> {
    value
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

/// Accepts the current object format, a bare address string, and objects
/// using `connectedAccount` as the key.
fn parse_hint_from_json(data: &str) -> Result<ResumeHint, ResumeError> {
    let value: serde_json::Value =
        serde_json::from_str(data).map_err(|e| ResumeError::Parse(format!("invalid JSON: {e}")))?;

    if let Ok(hint) = serde_json::from_value::<ResumeHint>(value.clone()) {
        return Ok(hint);
    }

    let parse_account = |raw: &str| {
        raw.parse::<Address>()
            .map_err(|e| ResumeError::Parse(format!("bad account: {e}")))
    };

    if let Some(raw) = value.as_str() {
        return Ok(ResumeHint {
            account: parse_account(raw)?,
            saved_at: Utc::now(),
        });
    }

    if let Some(obj) = value.as_object() {
        let raw = obj
            .get("account")
            .or_else(|| obj.get("connectedAccount"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| ResumeError::Parse("missing account field".to_string()))?;
        return Ok(ResumeHint {
            account: parse_account(raw)?,
            saved_at: parse_saved_at(obj.get("saved_at")),
        });
    }

    Err(ResumeError::Parse("unsupported hint format".to_string()))
}

/// Best-effort persistence of the resume hint.
#[async_trait]
pub trait ResumeHintStore: Send + Sync {
    async fn load(&self) -> Option<ResumeHint>;

    async fn save(&self, account: Address) -> Result<(), ResumeError>;

    async fn clear(&self) -> Result<(), ResumeError>;
}

/// Hint stored as a JSON file.
#[derive(Debug, Clone)]
pub struct FileResumeStore {
    path: PathBuf,
}

impl FileResumeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ResumeHintStore for FileResumeStore {
    async fn load(&self) -> Option<ResumeHint> {
        let data = tokio::fs::read_to_string(&self.path).await.ok()?;
        match parse_hint_from_json(&data) {
            Ok(hint) => {
                tracing::debug!("Loaded resume hint from {}", self.path.display());
                Some(hint)
            }
            Err(e) => {
                tracing::warn!("Ignoring resume hint at {}: {}", self.path.display(), e);
                None
            }
        }
    }

    async fn save(&self, account: Address) -> Result<(), ResumeError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let hint = ResumeHint {
            account,
            saved_at: Utc::now(),
        };
        let json = serde_json::to_string_pretty(&hint)
            .map_err(|e| ResumeError::Parse(e.to_string()))?;
        tokio::fs::write(&self.path, json).await?;
        tracing::debug!("Saved resume hint to {}", self.path.display());
        Ok(())
    }

    async fn clear(&self) -> Result<(), ResumeError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const ACCOUNT: &str = "0xdd63024953ad565748493f6b48a54e4886809667";

    #[tokio::test]
    async fn test_hint_save_load_clear() {
        let dir = tempdir().unwrap();
        let store = FileResumeStore::new(dir.path().join("nested").join("session.json"));
        let account: Address = ACCOUNT.parse().unwrap();

        assert!(store.load().await.is_none());
        store.save(account).await.unwrap();
        assert_eq!(store.load().await.unwrap().account, account);

        store.clear().await.unwrap();
        assert!(store.load().await.is_none());
        // Clearing twice is fine.
        store.clear().await.unwrap();
    }

    #[test]
    fn test_parse_bare_string_hint() {
        let hint = parse_hint_from_json(&format!("\"{ACCOUNT}\"")).unwrap();
        assert_eq!(hint.account.to_lower_hex(), ACCOUNT);
    }

    #[test]
    fn test_parse_connected_account_object() {
        let hint = parse_hint_from_json(&format!(
            r#"{{ "connectedAccount": "{ACCOUNT}", "saved_at": "2026-01-02T03:04:05Z" }}"#
        ))
        .unwrap();
        assert_eq!(hint.account.to_lower_hex(), ACCOUNT);
        assert_eq!(hint.saved_at.to_rfc3339(), "2026-01-02T03:04:05+00:00");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_hint_from_json("{").is_err());
        assert!(parse_hint_from_json("42").is_err());
        assert!(parse_hint_from_json(r#"{ "account": "0x12" }"#).is_err());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(FileResumeStore::new(path).load().await.is_none());
    }
}
