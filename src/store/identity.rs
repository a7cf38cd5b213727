//! Persisted identity marker.
//!
//! Remembers which username last logged in so the next launch can skip the
//! login form. This is the only state that survives a session; conversations
//! and presence are rebuilt from the server.

use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Serialize, Deserialize)]
struct StoredIdentity {
    username: String,
}

pub struct IdentityStore {
    path: PathBuf,
}

impl IdentityStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read identity file {}", self.path.display()))?;
        let stored: StoredIdentity =
            serde_json::from_str(&raw).context("identity file is not valid JSON")?;
        Ok(Some(stored.username))
    }

    pub fn save(&self, username: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let stored = StoredIdentity {
            username: username.to_string(),
        };
        fs::write(&self.path, serde_json::to_string(&stored)?)
            .with_context(|| format!("failed to write identity file {}", self.path.display()))?;
        debug!(target: "Store", "Saved identity marker for {username}");
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)
                .with_context(|| format!("failed to remove {}", self.path.display()))?;
        }
        Ok(())
    }
}
