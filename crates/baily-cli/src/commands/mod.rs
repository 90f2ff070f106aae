//! CLI command implementations.

pub mod start;
pub mod version;
