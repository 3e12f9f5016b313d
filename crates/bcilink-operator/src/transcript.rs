//! Timestamped transcript of operator traffic

use anyhow::Result;
use chrono::Local;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use tracing::warn;

/// Append-only log of commands and responses
pub struct Transcript {
    file: File,
    log_states: bool,
    log_prompts: bool,
}

impl Transcript {
    /// Open `path` for appending, creating it if needed
    pub fn open(path: &Path, log_states: bool, log_prompts: bool) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file,
            log_states,
            log_prompts,
        })
    }

    /// Record one round trip, subject to the state and prompt filters
    pub fn record(&mut self, command: &str, response: &str) {
        if is_state_command(command) && !self.log_states {
            return;
        }
        let stamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        let mut entry = format!("{} > {}\n", stamp, command);
        if !response.is_empty() {
            entry.push_str(&format!("{} < {}\n", stamp, response));
        } else if self.log_prompts {
            entry.push_str(&format!("{} < >\n", stamp));
        }
        if let Err(e) = self.file.write_all(entry.as_bytes()) {
            warn!(error = %e, "Failed to write transcript");
        }
    }

    /// Record a free-form note such as a connection event
    pub fn note(&mut self, text: &str) {
        let stamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        if let Err(e) = writeln!(self.file, "{} # {}", stamp, text) {
            warn!(error = %e, "Failed to write transcript");
        }
    }
}

fn is_state_command(command: &str) -> bool {
    let lower = command.to_ascii_lowercase();
    ["set state ", "get state ", "add state "]
        .iter()
        .any(|prefix| lower.starts_with(prefix))
}
