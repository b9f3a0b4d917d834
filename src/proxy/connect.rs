//! Accept loop and per-connection handling.
//!
//! Each accepted connection runs on its own task. The first read is parsed
//! into a CONNECT or absolute-form request, handed to the [`Interceptor`],
//! and the resulting disposition is executed: tunnel, forward, or a reject
//! response carrying the reason in an `X-NetWarden-Reason` header.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};

use super::forward::Forwarder;
use super::intercept::{Decision, Disposition, Interceptor, ProxiedRequest};
use crate::audit::{self, DbPool};

/// Shared state for all connections of one proxy instance.
pub struct ProxyContext {
    pub interceptor: Interceptor,
    pub forwarder: Forwarder,
    pub audit: Option<DbPool>,
}

/// Main accept loop: accept incoming connections and handle them.
pub async fn accept_loop(listener: TcpListener, ctx: Arc<ProxyContext>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer_addr)) => {
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, ctx).await {
                        error!("error handling connection from {}: {}", peer_addr, e);
                    }
                });
            }
            Err(e) => {
                error!("failed to accept connection: {}", e);
            }
        }
    }
}

/// Handle a single client connection.
async fn handle_connection(mut client: TcpStream, ctx: Arc<ProxyContext>) -> anyhow::Result<()> {
    let mut buf = vec![0u8; 8192];
    let n = client.read(&mut buf).await?;
    if n == 0 {
        return Ok(());
    }

    let head = String::from_utf8_lossy(&buf[..n]);
    let first_line = head.lines().next().unwrap_or("");
    let request = match parse_request_line(first_line) {
        Some(request) => request,
        None => {
            client
                .write_all(b"HTTP/1.1 400 Bad Request\r\n\r\n")
                .await?;
            return Ok(());
        }
    };

    let decision = ctx.interceptor.intercept(&request).await;
    record_decision(&ctx, &request, &decision);

    match decision.disposition {
        Disposition::Reject { status } => {
            let status_text = match status {
                403 => "Forbidden",
                _ => "Internal Server Error",
            };
            let response = format!(
                "HTTP/1.1 {} {}\r\nX-NetWarden-Reason: {}\r\n\r\n",
                status, status_text, decision.reason
            );
            client.write_all(response.as_bytes()).await?;
        }
        Disposition::Forward(target) => match &request {
            ProxiedRequest::Connect { authority } => {
                handle_tunnel(&mut client, authority, &ctx).await?;
            }
            ProxiedRequest::Absolute { .. } => {
                if let Err(e) = ctx.forwarder.forward_http(&mut client, &buf[..n], &target).await {
                    warn!("forward to {} failed: {}", target.forward_addr(), e);
                    let _ = client
                        .write_all(b"HTTP/1.1 502 Bad Gateway\r\n\r\n")
                        .await;
                }
            }
        },
    }

    Ok(())
}

/// Establish the tunnel and splice bytes both ways until either side closes.
async fn handle_tunnel(
    client: &mut TcpStream,
    authority: &str,
    ctx: &ProxyContext,
) -> anyhow::Result<()> {
    let mut remote = match ctx.forwarder.open_tunnel(authority).await {
        Ok(remote) => remote,
        Err(e) => {
            warn!("tunnel to {} failed: {}", authority, e);
            client
                .write_all(b"HTTP/1.1 502 Bad Gateway\r\n\r\n")
                .await?;
            return Ok(());
        }
    };

    client
        .write_all(b"HTTP/1.1 200 Connection Established\r\n\r\n")
        .await?;
    info!("tunnel established to {}", authority);

    let (mut client_read, mut client_write) = tokio::io::split(client);
    let (mut remote_read, mut remote_write) = tokio::io::split(&mut remote);

    let client_to_remote = tokio::io::copy(&mut client_read, &mut remote_write);
    let remote_to_client = tokio::io::copy(&mut remote_read, &mut client_write);

    tokio::select! {
        r = client_to_remote => {
            if let Err(e) = r { warn!("client->remote error: {}", e); }
        }
        r = remote_to_client => {
            if let Err(e) = r { warn!("remote->client error: {}", e); }
        }
    }

    Ok(())
}

/// Parse the request line into a CONNECT or absolute-form request.
///
/// Origin-form targets (plain `GET / HTTP/1.1`) are not proxy requests and
/// yield `None`.
fn parse_request_line(line: &str) -> Option<ProxiedRequest> {
    let mut parts = line.split_whitespace();
    let method = parts.next()?;
    let target = parts.next()?;

    if method == "CONNECT" {
        return Some(ProxiedRequest::Connect {
            authority: target.to_string(),
        });
    }
    if target.starts_with("http://") || target.starts_with("https://") {
        return Some(ProxiedRequest::Absolute {
            method: method.to_string(),
            uri: target.to_string(),
        });
    }
    None
}

/// Record the decision in the audit log if one is configured.
fn record_decision(ctx: &ProxyContext, request: &ProxiedRequest, decision: &Decision) {
    let Some(pool) = &ctx.audit else {
        return;
    };
    match pool.get() {
        Ok(conn) => {
            let record = audit::DecisionRecord {
                id: None,
                timestamp: chrono::Utc::now().to_rfc3339(),
                method: request.method().to_string(),
                target: request.raw_target().to_string(),
                action: decision.action.to_string(),
                reason: decision.reason.clone(),
            };
            if let Err(e) = audit::record_decision(&conn, &record) {
                warn!("failed to record decision: {}", e);
            }
        }
        Err(e) => warn!("audit pool unavailable: {}", e),
    }
}
