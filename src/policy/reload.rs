//! Rules hot-reload support.
//!
//! Watches the rules file for changes and replaces the [`PolicyStore`]
//! snapshot without restarting the proxy. Invalid content is handled
//! fail-safe: the old snapshot is retained and a warning is logged.
//!
//! Reload triggers:
//!
//! - **File change**: [`start_file_watcher`] uses the [`notify`] crate.
//! - **SIGHUP** (Unix only): [`start_sighup_handler`] listens for the HUP
//!   signal for manual reload via `kill -HUP <pid>`.
//!
//! The store's own appends rewrite the rules file and therefore trigger one
//! reload of identical content; `replace` with an equal snapshot is harmless.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{info, warn};

use super::rules;
use super::store::PolicyStore;
use crate::error::Result;

/// Reload the rules file from disk and replace the live snapshot.
///
/// On failure (I/O error, invalid TOML) the old snapshot is retained and the
/// error is returned.
pub fn reload_rules(store: &Arc<PolicyStore>, path: &Path) -> Result<()> {
    let file = rules::load(path)?;
    let snapshot = file.into_snapshot();
    info!(
        "rules reloaded from {} ({} allow, {} deny)",
        path.display(),
        snapshot.allow.len(),
        snapshot.deny.len()
    );
    store.replace(snapshot);
    Ok(())
}

/// Start a file-system watcher that triggers [`reload_rules`] on changes.
///
/// Returns a [`RecommendedWatcher`] handle that must be kept alive for the
/// duration of the watch. Dropping the handle stops the watcher.
pub fn start_file_watcher(
    rules_path: PathBuf,
    store: Arc<PolicyStore>,
) -> notify::Result<RecommendedWatcher> {
    let path = rules_path.clone();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => {
            if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                info!("rules file changed, reloading...");
                if let Err(e) = reload_rules(&store, &path) {
                    warn!("rules reload failed (keeping old rules): {}", e);
                }
            }
        }
        Err(e) => {
            warn!("file watcher error: {}", e);
        }
    })?;

    watcher.watch(&rules_path, RecursiveMode::NonRecursive)?;
    info!("watching {} for changes", rules_path.display());
    Ok(watcher)
}

/// Start a SIGHUP handler that reloads the rules on signal.
#[cfg(unix)]
pub fn start_sighup_handler(rules_path: PathBuf, store: Arc<PolicyStore>) {
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sig = signal(SignalKind::hangup()).expect("Failed to register SIGHUP handler");
        loop {
            sig.recv().await;
            info!("SIGHUP received, reloading rules...");
            if let Err(e) = reload_rules(&store, &rules_path) {
                warn!("rules reload on SIGHUP failed (keeping old rules): {}", e);
            }
        }
    });
}

/// No-op SIGHUP handler for non-Unix platforms.
#[cfg(not(unix))]
pub fn start_sighup_handler(_rules_path: PathBuf, _store: Arc<PolicyStore>) {
    // SIGHUP is not available on this platform
}
