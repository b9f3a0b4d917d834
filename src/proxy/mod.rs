//! TCP proxy server.
//!
//! [`ProxyServer`] wires the policy store, decision broker, and forwarder
//! together and runs the accept loop. [`intercept`] holds the per-request
//! state machine, [`target`] the canonical target derivation, [`forward`]
//! the traffic forwarding with the shared upstream routing override.

pub mod connect;
pub mod forward;
pub mod intercept;
pub mod target;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use crate::ask::{DecisionBroker, DecisionProvider};
use crate::audit::DbPool;
use crate::error::Result;
use crate::policy::store::PolicyStore;
use connect::{accept_loop, ProxyContext};
use forward::{Forwarder, Router};
use intercept::Interceptor;

/// The proxy server: one listener, shared policy and routing state.
pub struct ProxyServer {
    listen_addr: String,
    store: Arc<PolicyStore>,
    provider: Arc<dyn DecisionProvider>,
    audit: Option<DbPool>,
}

impl ProxyServer {
    pub fn new(
        listen_addr: String,
        store: Arc<PolicyStore>,
        provider: Arc<dyn DecisionProvider>,
    ) -> Self {
        Self {
            listen_addr,
            store,
            provider,
            audit: None,
        }
    }

    /// Record every decision to the given audit database pool.
    pub fn with_audit(mut self, pool: DbPool) -> Self {
        self.audit = Some(pool);
        self
    }

    /// Start the proxy server and return the actual bound address.
    pub async fn start(&self) -> Result<SocketAddr> {
        let listener = TcpListener::bind(&self.listen_addr).await?;
        let local_addr = listener.local_addr()?;

        let router = Arc::new(Router::new());
        let broker = Arc::new(DecisionBroker::new(self.provider.clone()));
        let interceptor = Interceptor::new(self.store.clone(), broker, router.clone());
        let forwarder = Forwarder::new(router);
        let ctx = Arc::new(ProxyContext {
            interceptor,
            forwarder,
            audit: self.audit.clone(),
        });

        info!("netwarden proxy listening on {}", local_addr);
        tokio::spawn(accept_loop(listener, ctx));

        Ok(local_addr)
    }
}
