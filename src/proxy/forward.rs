//! Traffic forwarding and the shared upstream routing override.
//!
//! The upstream proxy URL is a single process-wide mutable value used by all
//! forwarded requests. [`Router`] guards it with one lock; each forward
//! operation reads it exactly once before dialing, so no request observes a
//! routing change mid-flight.

use std::sync::Mutex;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::warn;

use super::target::Target;
use crate::error::{Result, WardenError};

/// Timeout for establishing a TCP connection.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
/// Timeout for the upstream CONNECT handshake (the tunnel/TLS establish
/// window).
pub const TUNNEL_ESTABLISH_TIMEOUT: Duration = Duration::from_secs(10);
/// Timeout for the first response bytes (headers) from the remote.
pub const RESPONSE_HEADER_TIMEOUT: Duration = Duration::from_secs(60);

/// Default port for an upstream proxy URL without an explicit one.
const DEFAULT_UPSTREAM_PORT: u16 = 3128;

/// Lock-guarded holder of the upstream proxy URL shared by all forwards.
#[derive(Debug, Default)]
pub struct Router {
    upstream: Mutex<Option<String>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install an upstream proxy URL; all subsequent forwards route through
    /// it.
    pub fn set_upstream(&self, url: String) {
        *self.upstream.lock().unwrap() = Some(url);
    }

    /// Restore direct routing.
    pub fn clear_upstream(&self) {
        *self.upstream.lock().unwrap() = None;
    }

    /// Single atomic read of the current routing value.
    pub fn upstream(&self) -> Option<String> {
        self.upstream.lock().unwrap().clone()
    }
}

/// Forwards allowed traffic, directly or through the configured upstream.
pub struct Forwarder {
    router: std::sync::Arc<Router>,
}

impl Forwarder {
    pub fn new(router: std::sync::Arc<Router>) -> Self {
        Self { router }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Open a raw tunnel to `authority` for a CONNECT request.
    ///
    /// With an upstream configured, connects to the upstream and issues a
    /// nested CONNECT, expecting a 2xx reply before handing the stream back.
    pub async fn open_tunnel(&self, authority: &str) -> Result<TcpStream> {
        match self.resolve_upstream() {
            Some(proxy_addr) => {
                let mut stream = connect(&proxy_addr).await?;
                let handshake = format!("CONNECT {authority} HTTP/1.1\r\nHost: {authority}\r\n\r\n");
                stream.write_all(handshake.as_bytes()).await?;

                let mut buf = vec![0u8; 4096];
                let n = timeout(TUNNEL_ESTABLISH_TIMEOUT, stream.read(&mut buf))
                    .await
                    .map_err(|_| {
                        WardenError::Proxy(format!(
                            "timed out establishing tunnel to {authority} via {proxy_addr}"
                        ))
                    })??;
                let head = String::from_utf8_lossy(&buf[..n]);
                let accepted = head
                    .split_whitespace()
                    .nth(1)
                    .map(|code| code.starts_with('2'))
                    .unwrap_or(false);
                if !accepted {
                    return Err(WardenError::Proxy(format!(
                        "upstream refused CONNECT to {}: {}",
                        authority,
                        head.lines().next().unwrap_or("")
                    )));
                }
                Ok(stream)
            }
            None => connect(authority).await,
        }
    }

    /// Forward an absolute-form HTTP request and stream the response back.
    pub async fn forward_http(
        &self,
        client: &mut TcpStream,
        raw_request: &[u8],
        target: &Target,
    ) -> Result<()> {
        let addr = self
            .resolve_upstream()
            .unwrap_or_else(|| target.forward_addr());
        let mut remote = connect(&addr).await?;

        // Inject Connection: close so the remote closes after the response.
        let request_str = String::from_utf8_lossy(raw_request);
        let modified = if !request_str.to_lowercase().contains("connection:") {
            request_str.replacen("\r\n\r\n", "\r\nConnection: close\r\n\r\n", 1)
        } else {
            request_str.to_string()
        };
        remote.write_all(modified.as_bytes()).await?;

        // Wait for the response headers, then stream the remainder.
        let mut buf = vec![0u8; 8192];
        let n = timeout(RESPONSE_HEADER_TIMEOUT, remote.read(&mut buf))
            .await
            .map_err(|_| {
                WardenError::Proxy(format!("timed out waiting for response headers from {addr}"))
            })??;
        client.write_all(&buf[..n]).await?;
        if n > 0 {
            tokio::io::copy(&mut remote, client).await?;
        }
        Ok(())
    }

    /// Read the routing value once and turn it into a dialable address.
    ///
    /// An upstream URL with a non-http(s) scheme is logged and ignored,
    /// falling back to direct routing.
    fn resolve_upstream(&self) -> Option<String> {
        let url = self.router.upstream()?;
        match upstream_addr(&url) {
            Some(addr) => Some(addr),
            None => {
                warn!("upstream proxy URL '{}' is unsupported; routing directly", url);
                None
            }
        }
    }
}

async fn connect(addr: &str) -> Result<TcpStream> {
    let stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
        .await
        .map_err(|_| WardenError::Proxy(format!("timed out connecting to {addr}")))?
        .map_err(|e| WardenError::Proxy(format!("failed to connect to {addr}: {e}")))?;
    Ok(stream)
}

/// Extract `host:port` from an upstream proxy URL, defaulting the port.
/// Returns `None` for unsupported schemes or an empty authority.
fn upstream_addr(url: &str) -> Option<String> {
    let rest = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"))?;
    let authority = rest.split('/').next().unwrap_or(rest);
    if authority.is_empty() {
        return None;
    }
    if authority.contains(':') {
        Some(authority.to_string())
    } else {
        Some(format!("{authority}:{DEFAULT_UPSTREAM_PORT}"))
    }
}
