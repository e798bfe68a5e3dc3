//! App-name normalizer
//!
//! Sense producers report raw frontmost-process names ("Google Chrome",
//! "iTerm2", sometimes with a bundle or binary extension). Normalization
//! strips those extensions and folds the common aliases so the same
//! application reads identically in HUD lines, app chains, and prompts.

const STRIP_SUFFIXES: &[&str] = &[".app", ".exe", ".bin"];

/// (lowercase raw name, canonical display name)
const ALIASES: &[(&str, &str)] = &[
    ("code", "VS Code"),
    ("code - insiders", "VS Code"),
    ("visual studio code", "VS Code"),
    ("iterm", "Terminal"),
    ("iterm2", "Terminal"),
    ("terminal", "Terminal"),
    ("google chrome", "Chrome"),
    ("chromium", "Chrome"),
    ("microsoft edge", "Edge"),
    ("firefox", "Firefox"),
    ("safari", "Safari"),
    ("slack", "Slack"),
    ("zoom.us", "Zoom"),
    ("electron", "Electron"),
];

/// Normalize a raw frontmost-application name for display. Empty input
/// maps to "unknown".
pub fn normalize_app_name(raw: &str) -> String {
    let mut name = raw.trim();
    if name.is_empty() {
        return "unknown".to_string();
    }
    for suffix in STRIP_SUFFIXES {
        if let Some(stripped) = strip_suffix_ignore_case(name, suffix) {
            name = stripped.trim_end_matches('.');
            break;
        }
    }
    let lower = name.to_lowercase();
    for (alias, canonical) in ALIASES {
        if lower == *alias {
            return canonical.to_string();
        }
    }
    name.to_string()
}

fn strip_suffix_ignore_case<'a>(value: &'a str, suffix: &str) -> Option<&'a str> {
    if value.len() >= suffix.len() && value[value.len() - suffix.len()..].eq_ignore_ascii_case(suffix)
    {
        Some(&value[..value.len() - suffix.len()])
    } else {
        None
    }
}
