//! Sinain Agent - The tick engine
//!
//! Debounce/interval scheduling, context assembly, model-chain invocation,
//! output parsing, the situation snapshot, and the per-tick trace.

pub mod analyzer;
pub mod parse;
pub mod prompt;
pub mod situation;

pub use analyzer::{Analyzer, AnalyzerHandle, EscalationOutcome, EscalationSink};
pub use parse::{parse_tick_output, TickOutput};
pub use prompt::build_prompt;
pub use situation::SituationWriter;
