//! CLI command implementations.

pub mod batch;
