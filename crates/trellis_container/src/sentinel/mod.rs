//! Built-in extensions with fixed chain positions.
//!
//! - [`UnprocessedInstanceLogger`] is appended right after the pre-existing
//!   instance extensions and reports components created before the chain
//!   was complete.
//! - [`EventListenerDetector`] is always the last entry and registers
//!   singleton listeners with the multicaster as they are created.

mod listener_detector;
mod unprocessed;

pub use listener_detector::{EventListenerDetector, SingletonEligibility};
pub use unprocessed::UnprocessedInstanceLogger;
