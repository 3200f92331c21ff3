// Status output for the blelink CLI
//
// Human-readable colored lines by default, one JSON object per line with
// --json.

use blelink_core::SessionStatus;
use colored::*;
use serde::Serialize;
use std::time::Instant;

#[derive(Serialize)]
struct StatusLine<'a> {
    role: &'a str,
    elapsed_ms: u64,
    status: &'a SessionStatus,
}

#[derive(Serialize)]
struct SummaryLine<'a> {
    role: &'a str,
    elapsed_ms: u64,
    outcome: &'a str,
    detail: &'a str,
}

pub struct Printer {
    json: bool,
    started: Instant,
}

impl Printer {
    pub fn new(json: bool) -> Self {
        Self {
            json,
            started: Instant::now(),
        }
    }

    pub fn is_json(&self) -> bool {
        self.json
    }

    /// Print one status from `role`'s stream
    pub fn status(&self, role: &str, status: &SessionStatus) {
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        if self.json {
            let line = StatusLine {
                role,
                elapsed_ms,
                status,
            };
            match serde_json::to_string(&line) {
                Ok(json) => println!("{}", json),
                Err(e) => tracing::warn!("Failed to serialize status: {}", e),
            }
            return;
        }

        let tag = match role {
            "central" => format!("{:<10}", role).bright_cyan(),
            _ => format!("{:<10}", role).bright_magenta(),
        };
        let text = describe(status);
        let text = match status {
            SessionStatus::Failed(_) => text.bright_red(),
            SessionStatus::Connected
            | SessionStatus::DataSent
            | SessionStatus::DataReceived(_)
            | SessionStatus::PeersFound(_) => text.green(),
            SessionStatus::Stopped | SessionStatus::Disconnected => text.yellow(),
            _ => text.normal(),
        };
        println!("{:>7} {} {}", format!("{}ms", elapsed_ms).dimmed(), tag, text);
    }

    /// Print how a run ended
    pub fn summary(&self, role: &str, ok: bool, detail: &str) {
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        if self.json {
            let line = SummaryLine {
                role,
                elapsed_ms,
                outcome: if ok { "ok" } else { "failed" },
                detail,
            };
            match serde_json::to_string(&line) {
                Ok(json) => println!("{}", json),
                Err(e) => tracing::warn!("Failed to serialize summary: {}", e),
            }
            return;
        }

        println!();
        if ok {
            println!("{} {}", "✓".green(), detail);
        } else {
            println!("{} {}", "✗".bright_red(), detail);
        }
    }
}

/// Plain one-line description of a status
pub fn describe(status: &SessionStatus) -> String {
    match status {
        SessionStatus::PeersFound(peers) => {
            let names: Vec<String> = peers
                .iter()
                .map(|p| match &p.local_name {
                    Some(name) => format!("{} ({})", p.handle, name),
                    None => p.handle.to_string(),
                })
                .collect();
            format!("PeersFound [{}]", names.join(", "))
        }
        SessionStatus::DataReceived(data) => match std::str::from_utf8(data) {
            Ok(text) => format!("DataReceived ({} bytes): {:?}", data.len(), text),
            Err(_) => status.to_string(),
        },
        other => other.to_string(),
    }
}
