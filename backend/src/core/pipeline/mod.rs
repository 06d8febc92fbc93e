//! Generation Pipeline
//!
//! Scene breakdown ingestion, batch image generation, animation and the
//! editor hand-off.

mod breakdown;
mod events;
mod orchestrator;

pub use breakdown::*;
pub use events::*;
pub use orchestrator::*;
