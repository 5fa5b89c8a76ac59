//! Persisted API credentials.
//!
//! Credentials live in a small JSON object keyed by name, next to the
//! config file. Values are never logged; use [`redact`] for display.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use capburn_common::config::credentials_file_path;
use capburn_common::error::{CapburnError, CapburnResult};

const MAX_CREDENTIAL_LEN: usize = 1024;

/// File-backed credential store.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the standard location.
    pub fn open_default() -> Self {
        Self::new(credentials_file_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, name: &str) -> CapburnResult<Option<String>> {
        Ok(self.read_all()?.remove(name))
    }

    /// Fetch a credential that must be present.
    pub fn require(&self, name: &str) -> CapburnResult<String> {
        self.get(name)?
            .filter(|v| !v.is_empty())
            .ok_or_else(|| CapburnError::MissingCredential {
                name: name.to_string(),
            })
    }

    pub fn set(&self, name: &str, value: &str) -> CapburnResult<()> {
        let value = value.trim();
        if value.is_empty() {
            return Err(CapburnError::config("credential value is empty"));
        }
        if value.len() > MAX_CREDENTIAL_LEN {
            return Err(CapburnError::config("credential value is too long"));
        }

        let mut all = self.read_all()?;
        all.insert(name.to_string(), value.to_string());
        self.write_all(&all)?;
        tracing::info!(credential = name, value = %redact(value), "Credential stored");
        Ok(())
    }

    /// Remove a credential. Returns whether one was present.
    pub fn clear(&self, name: &str) -> CapburnResult<bool> {
        let mut all = self.read_all()?;
        let removed = all.remove(name).is_some();
        if removed {
            self.write_all(&all)?;
            tracing::info!(credential = name, "Credential cleared");
        }
        Ok(removed)
    }

    fn read_all(&self) -> CapburnResult<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&content).map_err(|e| {
            CapburnError::config(format!(
                "credential file {} is unreadable: {e}",
                self.path.display()
            ))
        })
    }

    fn write_all(&self, all: &BTreeMap<String, String>) -> CapburnResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(all)?)?;
        restrict_permissions(&self.path)?;
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> CapburnResult<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> CapburnResult<()> {
    Ok(())
}

/// A display-safe preview of a credential.
pub fn redact(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() < 12 {
        "*".repeat(chars.len())
    } else {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, CredentialStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("nested").join("credentials.json"));
        (dir, store)
    }

    #[test]
    fn test_missing_credential_is_a_config_error() {
        let (_dir, store) = store();
        let err = store.require("gemini_api_key").unwrap_err();
        assert!(matches!(err, CapburnError::MissingCredential { .. }));
    }

    #[test]
    fn test_set_get_clear() {
        let (_dir, store) = store();
        store.set("gemini_api_key", "  AIzaSecretValue123  ").unwrap();
        assert_eq!(
            store.get("gemini_api_key").unwrap().as_deref(),
            Some("AIzaSecretValue123")
        );
        assert!(store.clear("gemini_api_key").unwrap());
        assert!(!store.clear("gemini_api_key").unwrap());
        assert!(store.get("gemini_api_key").unwrap().is_none());
    }

    #[test]
    fn test_other_names_are_preserved() {
        let (_dir, store) = store();
        store.set("a", "one").unwrap();
        store.set("b", "two").unwrap();
        store.clear("a").unwrap();
        assert_eq!(store.get("b").unwrap().as_deref(), Some("two"));
    }

    #[test]
    fn test_empty_value_is_rejected() {
        let (_dir, store) = store();
        assert!(store.set("k", "   ").is_err());
    }

    #[test]
    fn test_redact() {
        assert_eq!(redact("short"), "*****");
        assert_eq!(redact("AIzaSyAbcdefghij1234"), "AIza...1234");
    }
}
