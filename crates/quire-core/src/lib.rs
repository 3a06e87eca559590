//! Quire Core: shared errors and configuration.
//!
//! This crate provides the foundational types used across all Quire crates.
//! It has no internal Quire dependencies.
//!
//! # Modules
//!
//! - [`error`]: Error taxonomy and Result alias
//! - [`config`]: File + environment configuration loading

pub mod config;
pub mod error;

// Re-export key types at crate root for convenience
pub use config::{EmbeddingConfig, IndexConfig, QuireConfig, StoreConfig};
pub use error::{Error, Result};
