//! HTTP handlers for JSON:API reads.

pub mod resource;
pub use resource::*;
