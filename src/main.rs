use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use netwarden::audit;
use netwarden::cli::prompt::TerminalProvider;
use netwarden::cli::{Cli, Commands, RulesAction};
use netwarden::policy::reload;
use netwarden::policy::rules;
use netwarden::policy::store::PolicyStore;
use netwarden::proxy::ProxyServer;

fn db_path() -> std::path::PathBuf {
    dirs_path().join("netwarden.db")
}

fn dirs_path() -> std::path::PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    let dir = std::path::PathBuf::from(home).join(".netwarden");
    std::fs::create_dir_all(&dir).ok();
    dir
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start { listen, upstream } => {
            cmd_start(&cli.rules, &listen, upstream).await?;
        }
        Commands::Logs {
            tail,
            export,
            format,
        } => {
            cmd_logs(tail, export, &format)?;
        }
        Commands::Rules { action } => match action {
            RulesAction::Show => cmd_rules_show(&cli.rules)?,
        },
        Commands::Init => {
            cmd_init(&cli.rules)?;
        }
    }

    Ok(())
}

async fn cmd_start(
    rules_path: &Path,
    listen: &str,
    upstream: Option<String>,
) -> anyhow::Result<()> {
    let store = Arc::new(PolicyStore::from_rules_file(rules_path)?);

    // A CLI upstream overrides whatever the rules file says.
    if let Some(url) = upstream {
        let mut snapshot = (*store.snapshot()).clone();
        snapshot.upstream_proxy = Some(url);
        store.replace(snapshot);
    }

    let snapshot = store.snapshot();
    println!("NetWarden starting...");
    println!("Rules:  {}", rules_path.display());
    println!(
        "Loaded: {} allow, {} deny",
        snapshot.allow.len(),
        snapshot.deny.len()
    );
    if let Some(url) = &snapshot.upstream_proxy {
        println!("Upstream proxy: {}", url);
    }

    let pool = audit::open_pool(&db_path())?;
    let provider = Arc::new(TerminalProvider);

    let server = ProxyServer::new(listen.to_string(), store.clone(), provider).with_audit(pool);
    let addr = server.start().await?;
    println!("Proxy running on {}", addr);
    println!("Set HTTPS_PROXY=http://{} to route traffic through NetWarden", addr);

    // The watcher handle must stay alive for hot reload to keep working.
    let _watcher = match reload::start_file_watcher(rules_path.to_path_buf(), store.clone()) {
        Ok(w) => Some(w),
        Err(e) => {
            eprintln!("warning: rules file watcher unavailable: {}", e);
            None
        }
    };
    reload::start_sighup_handler(rules_path.to_path_buf(), store);

    tokio::signal::ctrl_c().await?;
    println!("\nShutting down...");
    Ok(())
}

fn cmd_logs(tail: usize, export: bool, format: &str) -> anyhow::Result<()> {
    let db = db_path();
    if !db.exists() {
        println!("No log database found. Run 'netwarden start' first.");
        return Ok(());
    }

    let conn = audit::open_db(&db)?;

    if export {
        let records = audit::query_recent(&conn, usize::MAX)?;
        match format {
            "csv" => {
                print!("{}", audit::export::export_csv(&records));
            }
            _ => {
                println!("{}", audit::export::export_json(&records)?);
            }
        }
    } else {
        let records = audit::query_recent(&conn, tail)?;
        if records.is_empty() {
            println!("No log entries found.");
        } else {
            println!(
                "{:<22} {:<8} {:<40} {:<10} {}",
                "TIMESTAMP", "METHOD", "TARGET", "ACTION", "REASON"
            );
            println!("{}", "─".repeat(110));
            for record in &records {
                println!(
                    "{:<22} {:<8} {:<40} {:<10} {}",
                    record.timestamp, record.method, record.target, record.action, record.reason
                );
            }
        }
    }
    Ok(())
}

fn cmd_rules_show(rules_path: &Path) -> anyhow::Result<()> {
    let file = rules::load(rules_path)?;
    println!("Current rules ({})", rules_path.display());
    println!("═══════════════════════════════════════");
    println!("Allow ({}):", file.allow_always.len());
    for pattern in &file.allow_always {
        println!("  {}", pattern);
    }
    println!("Deny ({}):", file.deny_always.len());
    for pattern in &file.deny_always {
        println!("  {}", pattern);
    }
    match &file.upstream_proxy {
        Some(url) => println!("Upstream proxy: {}", url),
        None => println!("Upstream proxy: (direct)"),
    }
    Ok(())
}

fn cmd_init(rules_path: &Path) -> anyhow::Result<()> {
    println!("Initializing NetWarden...");

    let data_dir = dirs_path();
    std::fs::create_dir_all(&data_dir)?;
    println!("  Created data dir: {}", data_dir.display());

    let db = db_path();
    audit::open_db(&db)?;
    println!("  Initialized database: {}", db.display());

    if !rules_path.exists() {
        rules::save(rules_path, &rules::RulesFile::default())?;
        println!("  Created rules file: {}", rules_path.display());
    } else {
        println!("  Rules file already exists: {}", rules_path.display());
    }

    println!("\nDone! Next steps:");
    println!("  1. Start the proxy:  netwarden start");
    println!("  2. Set env variable: HTTPS_PROXY=http://127.0.0.1:3128");
    Ok(())
}
