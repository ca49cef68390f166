//! File system operations for the deploy engine.

pub mod walker;
