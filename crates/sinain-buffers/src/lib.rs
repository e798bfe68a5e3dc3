//! Sinain Buffers - Bounded versioned stores and the context-window assembler

pub mod apps;
pub mod feed;
pub mod sense;
pub mod window;

pub use apps::normalize_app_name;
pub use feed::{FeedBuffer, FEED_CAPACITY};
pub use sense::{SenseBuffer, SenseDraft, SENSE_CAPACITY};
pub use window::assemble_window;
