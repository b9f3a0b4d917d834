//! # netwarden
//!
//! **Policy-gating local proxy for untrusted client processes.**
//!
//! netwarden is a local HTTP/HTTPS proxy that intercepts outbound requests and
//! decides, per connection, whether to allow, deny, or escalate the decision to
//! a human operator. "Always" answers are written back into the rules file so
//! they apply to every future request.
//!
//! ## Architecture
//!
//! - **[`proxy`]** — TCP proxy server handling CONNECT tunneling and
//!   absolute-form HTTP, with the per-request interception state machine and
//!   the lock-guarded upstream routing override
//! - **[`policy`]** — glob rule matching, the copy-on-write policy snapshot
//!   store, rules-file persistence, and live reload
//! - **[`ask`]** — the decision broker: serializes concurrent undecided
//!   requests into one FIFO prompt queue with exactly-once outcome delivery
//! - **[`audit`]** — SQLite-backed decision logging with JSON/CSV export
//! - **[`cli`]** — command-line interface (clap) and the terminal prompt
//! - **[`error`]** — unified error types using `thiserror`
//!
//! ## Quick Start
//!
//! ```bash
//! # Create the rules file and decision log database
//! netwarden init
//!
//! # Start the proxy
//! netwarden start --listen 127.0.0.1:3128
//!
//! # Route client traffic through the proxy
//! export HTTPS_PROXY=http://127.0.0.1:3128
//! ```

pub mod ask;
pub mod audit;
pub mod cli;
pub mod error;
pub mod policy;
pub mod proxy;
