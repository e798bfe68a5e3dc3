//! Model output parsing — strict JSON first, permissive extraction second,
//! raw fallback last
//!
//! Models are asked for `{ "hud": ..., "digest": ... }` but routinely wrap
//! the object in a fenced code block or lead with prose. Parsing never
//! fails the tick: the worst case degrades to the raw text as digest.

use serde::Deserialize;

#[derive(Clone, Debug, PartialEq)]
pub struct TickOutput {
    pub hud: String,
    pub digest: String,
    pub parsed_ok: bool,
}

#[derive(Deserialize)]
struct WireOutput {
    hud: String,
    digest: String,
}

const RAW_HUD_CHARS: usize = 80;

pub fn parse_tick_output(raw: &str) -> TickOutput {
    let unfenced = strip_fences(raw);

    if let Ok(output) = serde_json::from_str::<WireOutput>(unfenced.trim()) {
        return ok(output);
    }

    // Second pass: first '{' .. last '}' substring.
    if let Some(candidate) = extract_object(&unfenced) {
        if let Ok(output) = serde_json::from_str::<WireOutput>(candidate) {
            return ok(output);
        }
    }

    TickOutput {
        hud: truncate_chars(raw.trim(), RAW_HUD_CHARS),
        digest: raw.trim().to_string(),
        parsed_ok: false,
    }
}

fn ok(output: WireOutput) -> TickOutput {
    TickOutput {
        hud: output.hud.trim().to_string(),
        digest: output.digest.trim().to_string(),
        parsed_ok: true,
    }
}

/// Remove a ```/```json fence wrapper, if present.
fn strip_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    let body = trimmed
        .lines()
        .skip(1)
        .take_while(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n");
    body.trim().to_string()
}

fn extract_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end > start {
        Some(&text[start..=end])
    } else {
        None
    }
}

pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        text.chars().take(max).collect()
    }
}
