//! Directory authentication for Dirauth

pub mod ldap;

pub use ldap::{
    configs_from_section, AdminCredentials, ConnectionConfig, DirectoryAuthClient,
    DirectoryTransport, Filter, Ldap3Transport, MemoryDirectory, SearchConfig,
};
