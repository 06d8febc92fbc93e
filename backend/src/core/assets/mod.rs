//! Asset Management Module
//!
//! Asset records and the materializer that stores provider output under the
//! uploads root.

mod materializer;
mod models;

pub use materializer::*;
pub use models::*;
