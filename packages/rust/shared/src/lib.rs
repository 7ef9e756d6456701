//! Shared types, error model, and configuration for mailsift.
//!
//! This crate is the foundation depended on by all other mailsift crates.
//! It provides:
//! - [`MailsiftError`]: the unified error type
//! - [`RunContext`]: the state threaded through one pipeline run
//! - Domain types ([`RunId`], [`AddressCluster`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod context;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, IdentityConfig, MailboxConfig, RetriesConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from, validate_config,
};
pub use context::RunContext;
pub use error::{MailsiftError, Result};
pub use types::{AddressCluster, RunId};
