//! Decision broker: the human-in-the-loop fallback.
//!
//! When a target matches neither rule list, the handling task calls
//! [`DecisionBroker::request_decision`] and blocks until an outcome exists.
//! Requests from concurrent connections are queued FIFO; a single worker
//! task drives the [`DecisionProvider`] one prompt at a time, so the
//! operator sees prompts in arrival order and never more than one at once.
//!
//! Outcome delivery is exactly-once: each request carries a [`ResponseSlot`]
//! whose sender is consumed on first fulfillment. Two sources may race to
//! deliver — the provider's explicit answer, and a fail-closed guard that
//! fires if the provider terminates abnormally (panic, cancellation) without
//! answering. Whichever fires first wins; the loser observes "already
//! delivered" and drops silently.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use crate::error::Result;

/// The operator's answer for one undecided request, or a synthesized
/// fail-closed substitute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionOutcome {
    /// Forward this request only; no rule change.
    AllowOnce,
    /// Reject this request only; no rule change.
    DenyOnce,
    /// Append the rule to the allow list and forward. An empty rule defaults
    /// to the target's host.
    AllowAlways(String),
    /// Append the rule to the deny list and reject. An empty rule defaults
    /// to the target's host.
    DenyAlways(String),
    /// The prompt was dismissed without an explicit choice.
    Dismissed,
    /// The decision provider itself failed.
    ProviderError,
}

/// What the provider is asked to show: the target URL and a pre-filled rule
/// suggestion (typically the target's host).
#[derive(Debug, Clone)]
pub struct DecisionPrompt {
    pub target: String,
    pub suggested_rule: String,
}

/// External prompt backend. The broker invokes this at most once
/// concurrently.
#[async_trait]
pub trait DecisionProvider: Send + Sync {
    /// Present the prompt and return the operator's choice.
    async fn show_prompt(&self, prompt: &DecisionPrompt) -> Result<DecisionOutcome>;
}

/// Single-use outcome slot shared between the delivery paths.
///
/// `fulfill` takes the inner sender, so exactly one caller ever delivers; all
/// later attempts return `false` and do nothing.
pub struct ResponseSlot {
    tx: Mutex<Option<oneshot::Sender<DecisionOutcome>>>,
}

impl ResponseSlot {
    pub fn new() -> (Arc<Self>, oneshot::Receiver<DecisionOutcome>) {
        let (tx, rx) = oneshot::channel();
        (
            Arc::new(Self {
                tx: Mutex::new(Some(tx)),
            }),
            rx,
        )
    }

    /// Deliver the outcome if nothing has been delivered yet. Returns whether
    /// this call was the one that delivered.
    pub fn fulfill(&self, outcome: DecisionOutcome) -> bool {
        let sender = self.tx.lock().unwrap().take();
        match sender {
            // A dropped receiver means the caller is gone; the slot still
            // counts as consumed.
            Some(tx) => {
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }
}

/// Delivers `DenyOnce` on drop unless the slot was already fulfilled.
///
/// Armed by the worker before the provider runs, disarmed implicitly by an
/// explicit delivery: if the provider panics or the worker is cancelled
/// mid-prompt, the waiting request still unblocks, fail-closed.
struct FailClosedGuard {
    slot: Arc<ResponseSlot>,
}

impl Drop for FailClosedGuard {
    fn drop(&mut self) {
        if self.slot.fulfill(DecisionOutcome::DenyOnce) {
            warn!("decision prompt ended without an explicit choice; denying once");
        }
    }
}

struct DecisionRequest {
    prompt: DecisionPrompt,
    slot: Arc<ResponseSlot>,
}

/// Serializes concurrent undecided requests into one FIFO prompt queue.
pub struct DecisionBroker {
    tx: mpsc::UnboundedSender<DecisionRequest>,
}

impl DecisionBroker {
    /// Create a broker and spawn its worker task driving `provider`.
    pub fn new(provider: Arc<dyn DecisionProvider>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(decision_worker(rx, provider));
        Self { tx }
    }

    /// Enqueue a decision request and block until an outcome is delivered.
    ///
    /// No timeout is imposed here: an unresponsive provider blocks the
    /// waiting request indefinitely. A dead worker (provider panicked on an
    /// earlier request) yields `ProviderError`.
    pub async fn request_decision(&self, target: String, suggested_rule: String) -> DecisionOutcome {
        let (slot, rx) = ResponseSlot::new();
        let request = DecisionRequest {
            prompt: DecisionPrompt {
                target,
                suggested_rule,
            },
            slot,
        };
        if self.tx.send(request).is_err() {
            warn!("decision worker is gone; treating as provider error");
            return DecisionOutcome::ProviderError;
        }
        match rx.await {
            Ok(outcome) => outcome,
            // Slot dropped without delivery; should not happen with the
            // fail-closed guard, but never leave the caller hanging.
            Err(_) => DecisionOutcome::ProviderError,
        }
    }
}

async fn decision_worker(
    mut rx: mpsc::UnboundedReceiver<DecisionRequest>,
    provider: Arc<dyn DecisionProvider>,
) {
    while let Some(request) = rx.recv().await {
        let guard = FailClosedGuard {
            slot: request.slot.clone(),
        };
        match provider.show_prompt(&request.prompt).await {
            Ok(outcome) => {
                request.slot.fulfill(outcome);
            }
            Err(e) => {
                warn!("decision provider failed for {}: {}", request.prompt.target, e);
                request.slot.fulfill(DecisionOutcome::ProviderError);
            }
        }
        drop(guard);
    }
}
