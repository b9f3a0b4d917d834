//! Policy engine for netwarden.
//!
//! [`matcher`] classifies a request target against the current allow/deny
//! patterns, [`store`] holds the live rule set as atomically-replaced
//! immutable snapshots, [`rules`] reads and writes the on-disk rule document,
//! and [`reload`] keeps the snapshot current when the file changes.

pub mod matcher;
pub mod reload;
pub mod rules;
pub mod store;
