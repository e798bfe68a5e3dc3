//! Situation snapshot file — atomic write of the current situation
//!
//! Written after every tick for external consumers (the wearable HUD reads
//! it over sshfs). Write goes to a `.tmp` sibling then renames, so no
//! reader ever observes a headerless or partial file. On any failure the
//! `.tmp` is best-effort removed.

use crate::parse::truncate_chars;
use sinain_core::{AgentEntry, ContextWindow};
use std::path::PathBuf;
use tracing::warn;

const SECTION_TEXT_CHARS: usize = 500;

pub struct SituationWriter {
    path: PathBuf,
}

impl SituationWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Render and atomically replace the situation file. Errors are logged,
    /// never propagated to the tick.
    pub fn write(&self, entry: &AgentEntry, window: &ContextWindow) {
        let content = render(entry, window);
        if let Err(err) = self.write_atomic(&content) {
            warn!(path = %self.path.display(), error = %err, "situation write failed");
        }
    }

    fn write_atomic(&self, content: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("md.tmp");
        let result = std::fs::write(&tmp, content).and_then(|_| std::fs::rename(&tmp, &self.path));
        if result.is_err() {
            let _ = std::fs::remove_file(&tmp);
        }
        result
    }
}

fn render(entry: &AgentEntry, window: &ContextWindow) -> String {
    let now = sinain_core::now_ms();
    let mut out = String::from("# Situation\n");
    out.push_str(&format!(
        "Tick #{} | {} | {}\n",
        entry.id,
        entry.model,
        chrono_like_ts(entry.ts)
    ));

    out.push_str("\n## Digest\n");
    out.push_str(entry.digest.trim());
    out.push('\n');

    out.push_str("\n## Active Application\n");
    out.push_str(&window.current_app);
    out.push('\n');

    if !window.app_history.is_empty() {
        out.push_str("\n## App History\n");
        let chain: Vec<&str> = window
            .app_history
            .iter()
            .map(|visit| visit.app.as_str())
            .collect();
        out.push_str(&chain.join(" → "));
        out.push('\n');
    }

    if !window.screen.is_empty() {
        out.push_str("\n## Screen (OCR)\n");
        for event in &window.screen {
            let age_s = now.saturating_sub(event.ts) / 1000;
            let ocr = event.ocr.split_whitespace().collect::<Vec<_>>().join(" ");
            out.push_str(&format!(
                "- [{}s ago] [{}] {}\n",
                age_s,
                event.meta.app,
                truncate_chars(&ocr, SECTION_TEXT_CHARS)
            ));
        }
    }

    if !window.audio.is_empty() {
        out.push_str("\n## Audio Transcripts\n");
        for item in &window.audio {
            let age_s = now.saturating_sub(item.ts) / 1000;
            out.push_str(&format!(
                "- [{}s ago] {}\n",
                age_s,
                truncate_chars(&item.text, SECTION_TEXT_CHARS)
            ));
        }
    }

    out.push_str("\n## Metadata\n");
    out.push_str(&format!("- Screen events: {}\n", window.screen.len()));
    out.push_str(&format!("- Audio entries: {}\n", window.audio.len()));
    out.push_str(&format!("- Parsed OK: {}\n", entry.parsed_ok));
    out
}

fn chrono_like_ts(ts_ms: u64) -> String {
    chrono::DateTime::from_timestamp_millis(ts_ms as i64)
        .map(|dt| dt.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
        .unwrap_or_else(|| ts_ms.to_string())
}
