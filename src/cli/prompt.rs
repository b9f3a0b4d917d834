use std::io::{BufRead, Write};

use async_trait::async_trait;

use crate::ask::{DecisionOutcome, DecisionPrompt, DecisionProvider};
use crate::error::{Result, WardenError};

/// Display the approval prompt and return the operator's choice.
/// Uses the provided reader/writer for testability.
pub fn prompt_decision<R: BufRead, W: Write>(
    prompt: &DecisionPrompt,
    reader: &mut R,
    writer: &mut W,
) -> Result<DecisionOutcome> {
    writeln!(writer)?;
    writeln!(writer, "┌────────────────────────────────────────────────┐")?;
    writeln!(writer, "│  NetWarden: unknown outbound request           │")?;
    writeln!(writer, "├────────────────────────────────────────────────┤")?;
    writeln!(writer, "│  {}", prompt.target)?;
    writeln!(writer, "│                                                │")?;
    writeln!(writer, "│  [a] Allow once                                │")?;
    writeln!(writer, "│  [r] Always allow (add rule)                   │")?;
    writeln!(writer, "│  [d] Deny once                                 │")?;
    writeln!(writer, "│  [x] Always deny (add rule)                    │")?;
    writeln!(writer, "└────────────────────────────────────────────────┘")?;
    write!(writer, "Choice: ")?;
    writer.flush()?;

    let mut input = String::new();
    // Zero bytes read means the input stream was closed.
    if reader.read_line(&mut input)? == 0 {
        return Ok(DecisionOutcome::Dismissed);
    }
    let choice = input.trim().to_lowercase();

    match choice.as_str() {
        "a" => Ok(DecisionOutcome::AllowOnce),
        "r" => {
            write!(writer, "Rule [{}]: ", prompt.suggested_rule)?;
            writer.flush()?;
            let rule = read_rule(reader, &prompt.suggested_rule)?;
            Ok(DecisionOutcome::AllowAlways(rule))
        }
        "d" => Ok(DecisionOutcome::DenyOnce),
        "x" => Ok(DecisionOutcome::DenyAlways(prompt.suggested_rule.clone())),
        _ => Ok(DecisionOutcome::DenyOnce), // default to deny for safety
    }
}

fn read_rule<R: BufRead>(reader: &mut R, suggested: &str) -> Result<String> {
    let mut input = String::new();
    reader.read_line(&mut input)?;
    let rule = input.trim();
    if rule.is_empty() {
        Ok(suggested.to_string())
    } else {
        Ok(rule.to_string())
    }
}

/// Prompt backend that asks on the controlling terminal via stdin/stdout.
///
/// The blocking read runs on the blocking thread pool so the async worker
/// is not stalled at the runtime level while waiting for input.
pub struct TerminalProvider;

#[async_trait]
impl DecisionProvider for TerminalProvider {
    async fn show_prompt(&self, prompt: &DecisionPrompt) -> Result<DecisionOutcome> {
        let prompt = prompt.clone();
        tokio::task::spawn_blocking(move || {
            let stdin = std::io::stdin();
            let stdout = std::io::stdout();
            let mut reader = stdin.lock();
            let mut writer = stdout.lock();
            prompt_decision(&prompt, &mut reader, &mut writer)
        })
        .await
        .map_err(|e| WardenError::Proxy(format!("prompt task failed: {}", e)))?
    }
}
