//! Canonical request targets.
//!
//! Rules are matched against the `host[:port]path` form of a request. Tunnel
//! (CONNECT) requests carry only an authority, so a pseudo-target
//! `https://host:port` is synthesized for them. Query strings and fragments
//! are stripped before matching; nothing else is normalized.

use crate::error::{Result, WardenError};

/// The destination of an intercepted request, in the forms the rest of the
/// pipeline needs: rule matching, prompt display, and forwarding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    display: String,
    authority: String,
    host: String,
    path: String,
    tls: bool,
}

impl Target {
    /// Derive a target from an absolute-form request URI
    /// (e.g. `http://example.com:8080/path?q=1`).
    pub fn from_absolute_uri(uri: &str) -> Result<Self> {
        let (rest, tls) = if let Some(rest) = uri.strip_prefix("http://") {
            (rest, false)
        } else if let Some(rest) = uri.strip_prefix("https://") {
            (rest, true)
        } else {
            return Err(WardenError::Target(format!(
                "not an absolute http(s) URI: {uri}"
            )));
        };

        // Strip fragment, then query.
        let rest = rest.split('#').next().unwrap_or(rest);
        let rest = rest.split('?').next().unwrap_or(rest);

        let (authority, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, ""),
        };
        let host = parse_authority(authority)?;

        Ok(Self {
            display: uri.to_string(),
            authority: authority.to_string(),
            host,
            path: path.to_string(),
            tls,
        })
    }

    /// Synthesize a pseudo-target from a CONNECT authority
    /// (e.g. `example.com:443`).
    pub fn from_connect_authority(authority: &str) -> Result<Self> {
        let host = parse_authority(authority)?;
        Ok(Self {
            display: format!("https://{authority}"),
            authority: authority.to_string(),
            host,
            path: String::new(),
            tls: true,
        })
    }

    /// The string rules are matched against: `host[:port]path` (path may be
    /// empty).
    pub fn rule_string(&self) -> String {
        format!("{}{}", self.authority, self.path)
    }

    /// URL form shown in prompts and logs.
    pub fn display(&self) -> &str {
        &self.display
    }

    /// `host[:port]` as it appeared in the request.
    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Hostname without the port; the suggested default rule for "always"
    /// answers.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// `host:port` to dial for a direct forward, defaulting the port from the
    /// scheme when the request did not carry one.
    pub fn forward_addr(&self) -> String {
        if self.authority.contains(':') {
            self.authority.clone()
        } else {
            let port = if self.tls { 443 } else { 80 };
            format!("{}:{}", self.host, port)
        }
    }
}

/// Validate `host[:port]` and return the bare host.
fn parse_authority(authority: &str) -> Result<String> {
    let (host, port) = match authority.rsplit_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (authority, None),
    };

    if host.is_empty() {
        return Err(WardenError::Target(format!("empty host in '{authority}'")));
    }
    if !host
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_')
    {
        return Err(WardenError::Target(format!("invalid host in '{authority}'")));
    }
    if let Some(port) = port {
        if port.parse::<u16>().is_err() {
            return Err(WardenError::Target(format!("invalid port in '{authority}'")));
        }
    }

    Ok(host.to_string())
}
