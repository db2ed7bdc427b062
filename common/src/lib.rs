//! Shared building blocks for the `qosgen` crates: the run configuration and
//! the loading of the YAML documents the generator consumes.

pub mod config;
pub mod document;
