//! Per-request interception.
//!
//! Each inbound request walks a fixed path: derive the target, classify it
//! against the current policy snapshot, escalate to the decision broker when
//! undecided, apply any "always" answer to the store, and end in a terminal
//! disposition: forward or reject. Every failure along the way degrades to
//! rejecting that one request.

use std::sync::Arc;

use tracing::{info, warn};

use super::forward::Router;
use super::target::Target;
use crate::ask::{DecisionBroker, DecisionOutcome};
use crate::policy::matcher::{self, Verdict};
use crate::policy::store::{PolicySnapshot, PolicyStore};

/// An inbound request as seen by the interceptor.
#[derive(Debug, Clone)]
pub enum ProxiedRequest {
    /// CONNECT tunnel request carrying only `host:port`.
    Connect { authority: String },
    /// Absolute-form request (`GET http://example.com/path HTTP/1.1`).
    Absolute { method: String, uri: String },
}

impl ProxiedRequest {
    pub fn method(&self) -> &str {
        match self {
            Self::Connect { .. } => "CONNECT",
            Self::Absolute { method, .. } => method,
        }
    }

    /// The raw target string, for logs.
    pub fn raw_target(&self) -> &str {
        match self {
            Self::Connect { authority } => authority,
            Self::Absolute { uri, .. } => uri,
        }
    }
}

/// Terminal disposition of one request.
#[derive(Debug)]
pub enum Disposition {
    /// Hand the request to the forwarder.
    Forward(Target),
    /// Reject with the given HTTP status.
    Reject { status: u16 },
}

/// A disposition plus the audit classification behind it.
#[derive(Debug)]
pub struct Decision {
    pub disposition: Disposition,
    /// Audit action label: `allow`, `deny`, `ask-allow`, `ask-deny`, `error`.
    pub action: &'static str,
    /// Human-readable reason, also sent back in the reject header.
    pub reason: String,
}

impl Decision {
    fn reject(status: u16, action: &'static str, reason: impl Into<String>) -> Self {
        Self {
            disposition: Disposition::Reject { status },
            action,
            reason: reason.into(),
        }
    }

    fn forward(target: Target, action: &'static str, reason: impl Into<String>) -> Self {
        Self {
            disposition: Disposition::Forward(target),
            action,
            reason: reason.into(),
        }
    }
}

/// Orchestrates matcher, store, broker, and routing for each request.
pub struct Interceptor {
    store: Arc<PolicyStore>,
    broker: Arc<DecisionBroker>,
    router: Arc<Router>,
}

impl Interceptor {
    pub fn new(store: Arc<PolicyStore>, broker: Arc<DecisionBroker>, router: Arc<Router>) -> Self {
        Self {
            store,
            broker,
            router,
        }
    }

    /// Decide what to do with one request.
    pub async fn intercept(&self, request: &ProxiedRequest) -> Decision {
        let target = match derive_target(request) {
            Ok(target) => target,
            Err(e) => {
                // Fail closed: anything we cannot parse, we do not forward.
                warn!("rejecting unparsable target '{}': {}", request.raw_target(), e);
                return Decision::reject(403, "deny", "malformed target");
            }
        };

        let snapshot = self.store.snapshot();
        match matcher::evaluate(&snapshot, &target) {
            Verdict::Denied => {
                info!("denied {} by rule", target.display());
                Decision::reject(403, "deny", "blocked by policy")
            }
            Verdict::Allowed => {
                self.install_routing(&snapshot);
                Decision::forward(target, "allow", "matched allow rule")
            }
            Verdict::Undecided => self.escalate(target, &snapshot).await,
        }
    }

    async fn escalate(&self, target: Target, snapshot: &PolicySnapshot) -> Decision {
        info!("prompting for {}", target.display());
        let outcome = self
            .broker
            .request_decision(target.display().to_string(), target.host().to_string())
            .await;

        // The single point the outcome is consumed; the match is exhaustive
        // so a new variant cannot silently fall through to an allow.
        match outcome {
            DecisionOutcome::AllowOnce => {
                self.install_routing(snapshot);
                Decision::forward(target, "ask-allow", "allowed once by user")
            }
            DecisionOutcome::DenyOnce => Decision::reject(403, "ask-deny", "denied once by user"),
            DecisionOutcome::AllowAlways(rule) => {
                let rule = effective_rule(rule, &target);
                if self.store.append_allow(&rule) {
                    info!("added allow rule '{}'", rule);
                }
                self.install_routing(snapshot);
                Decision::forward(target, "ask-allow", format!("allow rule added: {rule}"))
            }
            DecisionOutcome::DenyAlways(rule) => {
                let rule = effective_rule(rule, &target);
                if self.store.append_deny(&rule) {
                    info!("added deny rule '{}'", rule);
                }
                Decision::reject(403, "ask-deny", format!("deny rule added: {rule}"))
            }
            DecisionOutcome::Dismissed => {
                warn!("prompt for {} dismissed without a choice", target.display());
                Decision::reject(500, "error", "prompt dismissed without a choice")
            }
            DecisionOutcome::ProviderError => {
                warn!("decision provider failed for {}", target.display());
                Decision::reject(500, "error", "failed to obtain a decision")
            }
        }
    }

    /// Apply the snapshot's upstream value to the shared routing
    /// configuration before forwarding.
    fn install_routing(&self, snapshot: &PolicySnapshot) {
        match &snapshot.upstream_proxy {
            Some(url) => self.router.set_upstream(url.clone()),
            None => self.router.clear_upstream(),
        }
    }
}

fn derive_target(request: &ProxiedRequest) -> crate::error::Result<Target> {
    match request {
        ProxiedRequest::Connect { authority } => Target::from_connect_authority(authority),
        ProxiedRequest::Absolute { uri, .. } => Target::from_absolute_uri(uri),
    }
}

fn effective_rule(rule: String, target: &Target) -> String {
    let rule = rule.trim().to_string();
    if rule.is_empty() {
        target.host().to_string()
    } else {
        rule
    }
}
