//! Per-call connection and search configuration
//!
//! Both are immutable values derived from the `[ldap]` configuration
//! section and handed to every client call.

use crate::ldap::filter::Filter;
use dirauth_core::config::LdapConfigSection;
use dirauth_core::types::SearchScope;
use dirauth_core::{Error, Result};
use std::fmt;
use std::time::Duration;

// ============================================================================
// Connection
// ============================================================================

/// Where and how to connect
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Directory URL (ldap://, ldaps:// or ldapi://)
    pub url: String,

    /// Connect timeout
    pub timeout: Duration,

    /// Service account bound before searching or writing
    pub admin: Option<AdminCredentials>,
}

impl ConnectionConfig {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
            admin: None,
        }
    }

    pub fn with_admin(mut self, dn: impl Into<String>, credentials: impl Into<String>) -> Self {
        self.admin = Some(AdminCredentials {
            dn: dn.into(),
            credentials: credentials.into(),
        });
        self
    }
}

impl From<&LdapConfigSection> for ConnectionConfig {
    fn from(section: &LdapConfigSection) -> Self {
        let admin = match (&section.bind.dn, &section.bind.credentials) {
            (Some(dn), credentials) if !dn.is_empty() => Some(AdminCredentials {
                dn: dn.clone(),
                credentials: credentials.clone().unwrap_or_default(),
            }),
            _ => None,
        };

        Self {
            url: section.url.clone(),
            timeout: section.timeout(),
            admin,
        }
    }
}

/// Administrative bind DN and password
#[derive(Clone)]
pub struct AdminCredentials {
    pub dn: String,
    pub credentials: String,
}

impl fmt::Debug for AdminCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminCredentials")
            .field("dn", &self.dn)
            .field("credentials", &"<redacted>")
            .finish()
    }
}

// ============================================================================
// Search
// ============================================================================

/// Where and how to look users up
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Base DN of the user search; also the parent of provisioned entries
    pub base_dn: String,

    pub scope: SearchScope,

    /// Object class every user entry carries
    pub object_class: String,

    /// Attribute compared against the username
    pub match_field: String,

    /// Extra term ANDed into every lookup
    pub raw_filter: Option<Filter>,
}

impl SearchConfig {
    pub fn new(
        base_dn: impl Into<String>,
        object_class: impl Into<String>,
        match_field: impl Into<String>,
    ) -> Self {
        Self {
            base_dn: base_dn.into(),
            scope: SearchScope::default(),
            object_class: object_class.into(),
            match_field: match_field.into(),
            raw_filter: None,
        }
    }

    pub fn with_scope(mut self, scope: SearchScope) -> Self {
        self.scope = scope;
        self
    }

    /// Parse and attach a raw filter fragment
    pub fn with_raw_filter(mut self, raw: &str) -> Result<Self> {
        let filter = Filter::parse(raw)
            .map_err(|e| Error::Configuration(format!("ldap.search.filter: {}", e)))?;
        self.raw_filter = Some(filter);
        Ok(self)
    }

    /// Filter locating `username`
    pub fn user_filter(&self, username: &str) -> Filter {
        Filter::user_lookup(
            &self.object_class,
            &self.match_field,
            username,
            self.raw_filter.as_ref(),
        )
    }
}

impl TryFrom<&LdapConfigSection> for SearchConfig {
    type Error = Error;

    fn try_from(section: &LdapConfigSection) -> Result<Self> {
        let search = &section.search;
        let config = SearchConfig::new(&search.dn, &search.object_class, &search.field)
            .with_scope(search.scope);

        match search.filter.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => config.with_raw_filter(raw),
            _ => Ok(config),
        }
    }
}

/// Validate a configuration section and derive both per-call configs
pub fn configs_from_section(
    section: &LdapConfigSection,
) -> Result<(ConnectionConfig, SearchConfig)> {
    section.validate()?;
    let search = SearchConfig::try_from(section)?;
    Ok((ConnectionConfig::from(section), search))
}
