//! Sync progress reporting for the CLI.
//!
//! Reports what `sdx index` and `sdx sync` are doing so operators see which
//! doctype is being worked on and how far along a phase is. Progress goes
//! to **stderr** so stdout stays parseable for scripts.

use std::io::Write;

use shadowdex_core::progress::{SyncProgressEvent, SyncProgressReporter};

/// Human-friendly progress on stderr: "rebuild forum/post  1,234 / 5,000".
pub struct StderrProgress;

impl SyncProgressReporter for StderrProgress {
    fn report(&self, event: SyncProgressEvent) {
        let line = match &event {
            SyncProgressEvent::Discovering { doc_type } => {
                format!("index {}  discovering...\n", doc_type)
            }
            SyncProgressEvent::Working {
                phase,
                doc_type,
                item_type,
                n,
                total,
            } => format!(
                "{} {}/{}  {} / {}\n",
                phase.as_str(),
                doc_type,
                item_type,
                format_number(*n),
                format_number(*total)
            ),
            SyncProgressEvent::Committed { phase, documents } => format!(
                "{}  committed {} documents\n",
                phase.as_str(),
                format_number(*documents)
            ),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl SyncProgressReporter for JsonProgress {
    fn report(&self, event: SyncProgressEvent) {
        let obj = match &event {
            SyncProgressEvent::Discovering { doc_type } => serde_json::json!({
                "event": "progress",
                "doc_type": doc_type,
                "phase": "discovering"
            }),
            SyncProgressEvent::Working {
                phase,
                doc_type,
                item_type,
                n,
                total,
            } => serde_json::json!({
                "event": "progress",
                "doc_type": doc_type,
                "item_type": item_type,
                "phase": phase.as_str(),
                "n": n,
                "total": total
            }),
            SyncProgressEvent::Committed { phase, documents } => serde_json::json!({
                "event": "commit",
                "phase": phase.as_str(),
                "documents": documents
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

pub(crate) fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    /// Human progress when stderr is a TTY, otherwise off.
    Auto,
    Off,
    Human,
    Json,
}

impl ProgressMode {
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Build a reporter for this mode.
    pub fn reporter(&self) -> Box<dyn SyncProgressReporter> {
        match self {
            ProgressMode::Auto => Self::default_for_tty().reporter(),
            ProgressMode::Off => Box::new(shadowdex_core::progress::NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn auto_never_resolves_to_itself() {
        assert_ne!(ProgressMode::default_for_tty(), ProgressMode::Auto);
    }
}
