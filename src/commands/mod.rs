//! CLI command implementations.

pub mod analyze;
pub mod repair;

pub use analyze::{handle_analyze, handle_impact, handle_usages};
pub use repair::handle_repair;
