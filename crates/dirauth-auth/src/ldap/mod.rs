//! LDAP directory authentication module
//!
//! Provides:
//! - User authentication (search, then bind as the found entry)
//! - User provisioning through an administrative bind
//! - Search filter construction and parsing
//! - A network transport over `ldap3` and an in-memory directory

mod client;
pub mod filter;
pub mod memory;
mod network;
pub mod transport;
mod types;

pub use client::{DirectoryAuthClient, Stage};
pub use filter::{Filter, FilterError};
pub use memory::MemoryDirectory;
pub use network::Ldap3Transport;
pub use transport::{
    settle_search, DirectoryConnection, DirectoryTransport, SearchEvent, SearchEvents,
    SearchOutcome, TransportError,
};
pub use types::*;
