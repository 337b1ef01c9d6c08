//! Shared types, error model, and configuration for insertster.
//!
//! This crate is the foundation depended on by all other insertster crates.
//! It provides:
//! - [`InsertsterError`], the unified error type
//! - Domain types ([`QueryId`], [`NodeId`], [`Hit`], [`Query`], [`InsertionResult`])
//! - Configuration ([`AppConfig`], [`PlacementConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, PlacementConfig, config_dir, config_file_path, init_config,
    load_config, load_config_from, validate_query_threshold,
};
pub use error::{InsertsterError, Result};
pub use types::{
    Disposition, Edge, Hit, InsertionResult, NodeId, Query, QueryId, UnplacedReason,
};
