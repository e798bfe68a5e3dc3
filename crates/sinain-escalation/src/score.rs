//! Escalation scoring — deterministic pattern+history signals
//!
//! Additive score over fixed word sets; each category contributes at most
//! once. The decision gate is a pure function over the score, the mode,
//! and the orchestrator's cooldown/dedup history.

use sinain_core::{ContextWindow, EscalationMode};

pub const ESCALATION_THRESHOLD: u32 = 3;

const ERROR_WORDS: &[&str] = &[
    "error",
    "failed",
    "failure",
    "exception",
    "crash",
    "traceback",
    "typeerror",
    "referenceerror",
    "syntaxerror",
    "cannot read",
    "undefined is not",
    "exit code",
    "segfault",
    "panic",
    "fatal",
    "enoent",
];

const HELP_PHRASES: &[&str] = &[
    "how do i",
    "how to",
    "what if",
    "why is",
    "help me",
    "not working",
    "stuck",
    "confused",
    "any ideas",
    "suggestions",
];

const CODE_ISSUE_WORDS: &[&str] = &["todo", "fixme", "hack", "workaround", "deprecated"];

const APP_CHURN_MIN: usize = 4;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EscalationScore {
    pub total: u32,
    pub reasons: Vec<String>,
}

/// Pure: same digest + context always yields the same score.
pub fn calculate_escalation_score(digest: &str, window: &ContextWindow) -> EscalationScore {
    let mut score = EscalationScore::default();
    let digest_lower = digest.to_lowercase();

    if let Some(word) = ERROR_WORDS.iter().find(|w| digest_lower.contains(**w)) {
        score.total += 3;
        score.reasons.push(format!("error signal ({})", word));
    }

    let heard_help = window.audio.iter().any(|item| {
        let text = item.text.to_lowercase();
        HELP_PHRASES.iter().any(|phrase| text.contains(phrase))
    });
    if heard_help {
        score.total += 2;
        score.reasons.push("question/help in audio".to_string());
    }

    if let Some(word) = CODE_ISSUE_WORDS.iter().find(|w| digest_lower.contains(**w)) {
        score.total += 1;
        score.reasons.push(format!("code issue ({})", word));
    }

    if window.app_history.len() >= APP_CHURN_MIN {
        score.total += 1;
        score
            .reasons
            .push(format!("app churn ({} switches)", window.app_history.len()));
    }

    score
}

/// True when an OCR text carries any of the error words. Used to pull
/// error-bearing screen events into the high-priority message section.
pub fn ocr_matches_error(ocr: &str) -> bool {
    let lower = ocr.to_lowercase();
    ERROR_WORDS.iter().any(|word| lower.contains(word))
}

pub struct GateInput<'a> {
    pub mode: EscalationMode,
    pub now: u64,
    pub last_escalation_ts: u64,
    pub cooldown_ms: u64,
    pub hud: &'a str,
    pub digest: &'a str,
    pub last_escalated_digest: Option<&'a str>,
    pub score: &'a EscalationScore,
}

/// The decision gate. Dedup compares digests by exact equality.
pub fn decide_escalation(input: &GateInput) -> bool {
    if input.mode == EscalationMode::Off {
        return false;
    }
    if input.now.saturating_sub(input.last_escalation_ts) < input.cooldown_ms {
        return false;
    }
    if input.hud == "Idle" || input.hud == "—" {
        return false;
    }
    if input.mode.is_eager() {
        return true;
    }
    // selective
    if input.last_escalated_digest == Some(input.digest) {
        return false;
    }
    input.score.total >= ESCALATION_THRESHOLD
}
