//! Sinain Telemetry - Profiler gauges/timers, per-tick tracer, daily trace journal

pub mod journal;
pub mod profiler;
pub mod tracer;

pub use journal::TraceJournal;
pub use profiler::{Profiler, TimerStat};
pub use tracer::{Span, SpanStatus, Trace, TraceBuilder, TraceMetrics, TraceStats, Tracer};
