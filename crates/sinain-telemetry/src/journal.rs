//! Trace journal — append-only daily `<date>.jsonl` files
//!
//! Rotates when the UTC date changes: the old stream is closed and a new
//! file opened. Write failures are logged and swallowed; the journal must
//! never fail a tick.

use crate::tracer::Trace;
use chrono::Utc;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::warn;

pub struct TraceJournal {
    dir: PathBuf,
    state: Mutex<JournalState>,
}

struct JournalState {
    date: String,
    file: Option<File>,
}

impl TraceJournal {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            state: Mutex::new(JournalState {
                date: String::new(),
                file: None,
            }),
        }
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    /// Append one trace as a JSON line, rotating on UTC date change.
    pub fn append(&self, trace: &Trace) {
        let today = Utc::now().format("%Y-%m-%d").to_string();
        let mut state = self.state.lock().unwrap();

        if state.date != today || state.file.is_none() {
            state.file = None; // close the previous stream
            match self.open_for(&today) {
                Ok(file) => {
                    state.date = today;
                    state.file = Some(file);
                }
                Err(err) => {
                    warn!(dir = %self.dir.display(), error = %err, "trace journal open failed");
                    return;
                }
            }
        }

        let line = match serde_json::to_string(trace) {
            Ok(line) => line,
            Err(err) => {
                warn!(error = %err, "trace serialization failed");
                return;
            }
        };

        if let Some(file) = state.file.as_mut() {
            if let Err(err) = writeln!(file, "{}", line) {
                warn!(error = %err, "trace journal write failed");
                state.file = None;
            }
        }
    }

    /// Flush the current stream, if any. Called on shutdown.
    pub fn flush(&self) {
        let mut state = self.state.lock().unwrap();
        if let Some(file) = state.file.as_mut() {
            if let Err(err) = file.flush() {
                warn!(error = %err, "trace journal flush failed");
            }
        }
    }

    fn open_for(&self, date: &str) -> std::io::Result<File> {
        std::fs::create_dir_all(&self.dir)?;
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(format!("{}.jsonl", date)))
    }
}
