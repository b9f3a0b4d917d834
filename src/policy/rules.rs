//! Rules-file persistence.
//!
//! The rules file is a TOML document with three recognized keys:
//!
//! ```toml
//! allow_always = ["api.example.com", "*.github.com"]
//! deny_always = ["tracker.example.com"]
//! upstream_proxy = "http://proxy.corp.example:3128"
//! ```
//!
//! The on-disk copy is best-effort; the in-process snapshot is the source of
//! truth while the proxy runs.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::store::PolicySnapshot;
use crate::error::Result;

/// The serialized rule set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulesFile {
    /// Ordered allow patterns.
    #[serde(default)]
    pub allow_always: Vec<String>,

    /// Ordered deny patterns.
    #[serde(default)]
    pub deny_always: Vec<String>,

    /// Optional upstream proxy URL for forwarded traffic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_proxy: Option<String>,
}

impl RulesFile {
    pub fn into_snapshot(self) -> PolicySnapshot {
        PolicySnapshot {
            allow: self.allow_always,
            deny: self.deny_always,
            upstream_proxy: self.upstream_proxy,
        }
    }
}

impl From<&PolicySnapshot> for RulesFile {
    fn from(snapshot: &PolicySnapshot) -> Self {
        Self {
            allow_always: snapshot.allow.clone(),
            deny_always: snapshot.deny.clone(),
            upstream_proxy: snapshot.upstream_proxy.clone(),
        }
    }
}

/// Load and parse the rules file at the given path.
pub fn load(path: &Path) -> Result<RulesFile> {
    let content = std::fs::read_to_string(path)?;
    let file: RulesFile = toml::from_str(&content)?;
    Ok(file)
}

/// Serialize and write the rules file, creating parent directories as needed.
pub fn save(path: &Path, file: &RulesFile) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let content = toml::to_string_pretty(file)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Load the rules file, creating it with empty lists if it does not exist.
pub fn load_or_init(path: &Path) -> Result<RulesFile> {
    if !path.exists() {
        let file = RulesFile::default();
        save(path, &file)?;
        return Ok(file);
    }
    load(path)
}
