//! Concurrency-safe policy store.
//!
//! The live rule set is an immutable [`PolicySnapshot`] behind an
//! `RwLock<Arc<...>>`: readers clone the `Arc` and evaluate against a frozen
//! view, writers swap in a whole new snapshot. No reader ever observes a
//! half-updated list.
//!
//! Appends triggered by "always" answers persist to the rules file
//! best-effort: a failed save is logged and the in-memory snapshot remains
//! the canonical rule set for the running process.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tracing::warn;

use super::rules::{self, RulesFile};
use crate::error::Result;

/// An immutable, atomically-published view of the current rule set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicySnapshot {
    /// Ordered allow patterns.
    pub allow: Vec<String>,
    /// Ordered deny patterns, always evaluated first.
    pub deny: Vec<String>,
    /// Optional upstream proxy URL applied to forwarded traffic.
    pub upstream_proxy: Option<String>,
}

/// Which list an appended pattern belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RuleKind {
    Allow,
    Deny,
}

/// Holds the live [`PolicySnapshot`] and the rules-file path used for
/// persistence.
pub struct PolicyStore {
    snapshot: RwLock<Arc<PolicySnapshot>>,
    rules_path: Option<PathBuf>,
}

impl PolicyStore {
    /// Create a store from an initial snapshot, without persistence.
    pub fn new(snapshot: PolicySnapshot) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(snapshot)),
            rules_path: None,
        }
    }

    /// Persist appended rules to the given rules file.
    pub fn with_rules_path(mut self, path: PathBuf) -> Self {
        self.rules_path = Some(path);
        self
    }

    /// Load the rules file (creating it with empty lists if missing) and
    /// build a store that persists back to it.
    pub fn from_rules_file(path: &Path) -> Result<Self> {
        let file = rules::load_or_init(path)?;
        Ok(Self::new(file.into_snapshot()).with_rules_path(path.to_path_buf()))
    }

    /// The current snapshot. Safe under arbitrary concurrent readers.
    pub fn snapshot(&self) -> Arc<PolicySnapshot> {
        self.snapshot.read().unwrap().clone()
    }

    /// Atomically install an entirely new snapshot.
    pub fn replace(&self, snapshot: PolicySnapshot) {
        *self.snapshot.write().unwrap() = Arc::new(snapshot);
    }

    /// Append a pattern to the allow list. Returns `false` (and skips the
    /// persistence call) if the exact pattern already exists.
    pub fn append_allow(&self, pattern: &str) -> bool {
        self.append(pattern, RuleKind::Allow)
    }

    /// Append a pattern to the deny list. Returns `false` (and skips the
    /// persistence call) if the exact pattern already exists.
    pub fn append_deny(&self, pattern: &str) -> bool {
        self.append(pattern, RuleKind::Deny)
    }

    fn append(&self, pattern: &str, kind: RuleKind) -> bool {
        let published = {
            let mut guard = self.snapshot.write().unwrap();
            let list = match kind {
                RuleKind::Allow => &guard.allow,
                RuleKind::Deny => &guard.deny,
            };
            if list.iter().any(|p| p == pattern) {
                return false;
            }
            let mut next = guard.as_ref().clone();
            match kind {
                RuleKind::Allow => next.allow.push(pattern.to_string()),
                RuleKind::Deny => next.deny.push(pattern.to_string()),
            }
            let next = Arc::new(next);
            *guard = next.clone();
            next
        };
        self.persist(&published);
        true
    }

    /// Best-effort save; the in-memory snapshot stays authoritative on error.
    fn persist(&self, snapshot: &PolicySnapshot) {
        let Some(path) = &self.rules_path else {
            return;
        };
        if let Err(e) = rules::save(path, &RulesFile::from(snapshot)) {
            warn!(
                "failed to persist rules to {}: {} (in-memory rules remain active)",
                path.display(),
                e
            );
        }
    }
}
