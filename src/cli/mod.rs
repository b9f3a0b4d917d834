pub mod prompt;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "netwarden")]
#[command(about = "Interactive egress gatekeeper - prompt-on-unknown HTTP(S) proxy")]
#[command(version)]
pub struct Cli {
    /// Path to the rules file
    #[arg(short, long, default_value = "netwarden.toml")]
    pub rules: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the proxy server
    Start {
        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:3128")]
        listen: String,
        /// Upstream proxy URL to chain through (overrides the rules file)
        #[arg(long)]
        upstream: Option<String>,
    },
    /// View decision logs
    Logs {
        /// Show last N entries
        #[arg(long, default_value = "50")]
        tail: usize,
        /// Export logs
        #[arg(long)]
        export: bool,
        /// Export format (json or csv)
        #[arg(long, default_value = "json")]
        format: String,
    },
    /// Rules management
    Rules {
        #[command(subcommand)]
        action: RulesAction,
    },
    /// Create a starter rules file
    Init,
}

#[derive(Subcommand)]
pub enum RulesAction {
    /// Show current allow and deny rules
    Show,
}
