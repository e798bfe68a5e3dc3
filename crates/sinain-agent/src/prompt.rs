//! Prompt construction for the tick model call
//!
//! Fixed structure: activity intro, active app, app chain, newest-first
//! screen OCR lines, newest-first audio lines, strict JSON output
//! instructions. Per-event text is capped by the richness preset and OCR
//! newlines are collapsed to spaces so one event stays one line.

use crate::parse::truncate_chars;
use sinain_core::ContextWindow;
use sinain_llm::ChatMessage;

const SYSTEM_INTRO: &str = "You are a real-time activity analyst. You watch one user's screen \
captures (OCR text) and audio transcripts and describe what is happening right now. Be factual \
and terse; never invent activity that is not in the context.";

pub fn build_prompt(window: &ContextWindow, now_ms: u64) -> Vec<ChatMessage> {
    let mut body = String::from("Current user activity context:\n\n");

    body.push_str(&format!("Active app: {}\n", window.current_app));

    if !window.app_history.is_empty() {
        let chain: Vec<&str> = window
            .app_history
            .iter()
            .map(|visit| visit.app.as_str())
            .collect();
        body.push_str(&format!("App chain: {}\n", chain.join(" → ")));
    }

    if !window.screen.is_empty() {
        body.push_str("\nScreen (newest first):\n");
        for event in &window.screen {
            let age_s = now_ms.saturating_sub(event.ts) / 1000;
            let ocr = collapse_lines(&event.ocr);
            body.push_str(&format!(
                "- [{}s ago] [{}] {}\n",
                age_s,
                event.meta.app,
                truncate_chars(&ocr, window.preset.max_ocr_chars)
            ));
        }
    }

    if !window.audio.is_empty() {
        body.push_str("\nAudio transcripts (newest first):\n");
        for item in &window.audio {
            let age_s = now_ms.saturating_sub(item.ts) / 1000;
            body.push_str(&format!(
                "- [{}s ago] \"{}\"\n",
                age_s,
                truncate_chars(&item.text, window.preset.max_transcript_chars)
            ));
        }
    }

    body.push_str(
        "\nRespond with STRICT JSON only, no prose, no code fences:\n\
         {\"hud\": \"<status line, 15 words max>\", \"digest\": \"<3-5 factual sentences \
         describing the current situation>\"}\n",
    );

    vec![ChatMessage::system(SYSTEM_INTRO), ChatMessage::user(body)]
}

fn collapse_lines(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
