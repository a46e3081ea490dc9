//! Dirauth Core Library
//!
//! Error taxonomy, configuration, and directory data types shared by the
//! authentication client and the command-line front end.

pub mod config;
pub mod error;
pub mod types;

pub use config::{DirAuthConfig, LdapConfigSection};
pub use error::{Error, Result};

/// Dirauth version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default connect timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Default attribute matched against the supplied username
pub const DEFAULT_SEARCH_FIELD: &str = "uid";

/// Default object class of user entries
pub const DEFAULT_OBJECT_CLASS: &str = "person";

/// Object classes added to every provisioned entry after the configured one
pub const PROVISION_OBJECT_CLASSES: [&str; 2] = ["organizationalPerson", "person"];
