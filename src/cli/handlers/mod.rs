//! CLI command handlers.

pub mod names;
pub mod registry;
pub mod resolve;
