//! Escalation message construction
//!
//! Mode-sized structured text: digest, active context, error-bearing OCR
//! first, then recent screen and audio slices, then response instructions.
//! The richness preset bounds every raw-text section; even rich mode stays
//! far under the 256 KB transport envelope.

use crate::score::ocr_matches_error;
use sinain_core::{AgentEntry, ContextWindow, EscalationMode, RichnessPreset};

pub fn build_escalation_message(
    entry: &AgentEntry,
    window: &ContextWindow,
    mode: EscalationMode,
) -> String {
    let preset = mode.richness().preset();
    let now = sinain_core::now_ms();
    let mut out = String::new();

    out.push_str(&format!("[sinain-hud live context — tick #{}]\n", entry.id));

    out.push_str("\n## Digest\n");
    out.push_str(entry.digest.trim());
    out.push('\n');

    out.push_str("\n## Active Context\n");
    out.push_str(&format!("App: {}\n", window.current_app));
    if !window.app_history.is_empty() {
        let chain: Vec<&str> = window
            .app_history
            .iter()
            .map(|visit| visit.app.as_str())
            .collect();
        out.push_str(&format!("History: {}\n", chain.join(" → ")));
    }

    let errors: Vec<_> = window
        .screen
        .iter()
        .filter(|event| ocr_matches_error(&event.ocr))
        .collect();
    if !errors.is_empty() {
        out.push_str("\n## Errors (high priority)\n");
        for event in &errors {
            out.push_str("```\n");
            out.push_str(&cap(&event.ocr, preset.max_ocr_chars));
            out.push_str("\n```\n");
        }
    }

    if !window.screen.is_empty() {
        out.push_str("\n## Screen (recent OCR)\n");
        for event in &window.screen {
            let age_s = now.saturating_sub(event.ts) / 1000;
            let ocr = event.ocr.split_whitespace().collect::<Vec<_>>().join(" ");
            out.push_str(&format!(
                "- [{}s ago] [{}] {}\n",
                age_s,
                event.meta.app,
                cap(&ocr, preset.max_ocr_chars)
            ));
        }
    }

    if !window.audio.is_empty() {
        out.push_str("\n## Audio (recent transcripts)\n");
        for item in &window.audio {
            let age_s = now.saturating_sub(item.ts) / 1000;
            out.push_str(&format!(
                "- [{}s ago] \"{}\"\n",
                age_s,
                cap(&item.text, preset.max_transcript_chars)
            ));
        }
    }

    out.push('\n');
    out.push_str(instructions(mode, preset));
    out.push_str("\nRespond naturally — this will appear on the user's HUD overlay.\n");
    out
}

fn instructions(mode: EscalationMode, _preset: RichnessPreset) -> &'static str {
    if mode.is_eager() {
        "Respond with substantive help for the situation above. NO_REPLY is not an option in \
         this mode; always produce a response.\n"
    } else {
        "If you have something genuinely useful to add, respond in 2-5 sentences, actionable \
         when relevant. Otherwise reply NO_REPLY.\n"
    }
}

fn cap(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        text.chars().take(max).collect()
    }
}
