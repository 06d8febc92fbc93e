//! StoryReel Core Engine
//!
//! Records, providers, asset storage and the generation pipeline.

pub mod assets;
pub mod fs;
pub mod generative;
pub mod pipeline;
pub mod project;
pub mod settings;
pub mod store;

// Re-export common types
mod types;
pub use types::*;

mod error;
pub use error::*;
