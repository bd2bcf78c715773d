//! Cycle journal - appends finished lane cycles to a file
//!
//! Cycles are written in JSONL format (one JSON object per line).

use crate::domain::cycle::LaneCycle;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::{debug, error, info};

pub struct Journal {
    file_path: String,
}

impl Journal {
    pub fn new(file_path: &str) -> Self {
        info!(file_path = %file_path, "journal_initialized");
        Self { file_path: file_path.to_string() }
    }

    /// Append one finished cycle; returns false if the write failed
    pub fn record(&self, cycle: &LaneCycle) -> bool {
        let outcome = cycle.outcome.map_or("open", |o| o.as_str());
        match self.append_line(&cycle.to_json()) {
            Ok(()) => {
                info!(
                    cycle_id = %cycle.id,
                    lane = %cycle.lane,
                    outcome = %outcome,
                    "cycle_journaled"
                );
                true
            }
            Err(e) => {
                error!(cycle_id = %cycle.id, error = %e, "cycle_journal_failed");
                false
            }
        }
    }

    fn append_line(&self, line: &str) -> std::io::Result<()> {
        let path = Path::new(&self.file_path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", line)?;
        debug!(file = %self.file_path, bytes = %line.len(), "journal_written");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cycle::{CycleOutcome, CycleTrigger};
    use crate::domain::types::LaneId;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_appends_one_line_per_cycle() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("cycles.jsonl");
        fs::write(&file_path, "{\"existing\":true}\n").unwrap();

        let journal = Journal::new(file_path.to_str().unwrap());
        let cycle = LaneCycle::begin(LaneId::Exit, CycleTrigger::Checkout).finish(CycleOutcome::Rejected);
        assert!(journal.record(&cycle));

        let content = fs::read_to_string(&file_path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(parsed["id"], cycle.id);
        assert_eq!(parsed["outcome"], "rejected");
    }

    #[test]
    fn test_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("var").join("station").join("cycles.jsonl");

        let journal = Journal::new(nested.to_str().unwrap());
        let cycle = LaneCycle::begin(LaneId::Entry, CycleTrigger::Remote).finish(CycleOutcome::Completed);
        assert!(journal.record(&cycle));
        assert!(nested.exists());
    }
}
