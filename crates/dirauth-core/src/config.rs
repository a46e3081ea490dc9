//! Configuration for Dirauth
//!
//! Example config:
//! ```toml
//! [ldap]
//! url = "ldap://ldap.example.com:389"
//! timeout = 10000
//!
//! [ldap.bind]
//! dn = "cn=admin,dc=example,dc=com"
//! credentials = "secret"
//!
//! [ldap.search]
//! dn = "ou=users,dc=example,dc=com"
//! field = "uid"
//! objectClass = "inetOrgPerson"
//! scope = "subtree"
//! filter = "(!(employeeType=disabled))"
//!
//! [logging]
//! level = "info"
//! format = "pretty"
//! ```

use crate::types::SearchScope;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirAuthConfig {
    #[serde(default)]
    pub ldap: LdapConfigSection,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl DirAuthConfig {
    pub fn from_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::Error::Configuration(format!("Failed to read config {:?}: {}", path, e))
        })?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> crate::Result<Self> {
        toml::from_str(content)
            .map_err(|e| crate::Error::Configuration(format!("Failed to parse config: {}", e)))
    }

    pub fn from_env() -> crate::Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Overlay `DIRAUTH_*` environment variables onto this configuration
    pub fn apply_env(&mut self) -> crate::Result<()> {
        let ldap = &mut self.ldap;

        if let Ok(url) = std::env::var("DIRAUTH_LDAP_URL") {
            ldap.url = url;
        }
        if let Ok(timeout) = std::env::var("DIRAUTH_LDAP_TIMEOUT") {
            ldap.timeout = timeout.parse().map_err(|_| {
                crate::Error::Configuration(format!("Invalid DIRAUTH_LDAP_TIMEOUT: {}", timeout))
            })?;
        }
        if let Ok(dn) = std::env::var("DIRAUTH_LDAP_BIND_DN") {
            ldap.bind.dn = Some(dn);
        }
        if let Ok(credentials) = std::env::var("DIRAUTH_LDAP_BIND_CREDENTIALS") {
            ldap.bind.credentials = Some(credentials);
        }
        if let Ok(dn) = std::env::var("DIRAUTH_LDAP_SEARCH_DN") {
            ldap.search.dn = dn;
        }
        if let Ok(field) = std::env::var("DIRAUTH_LDAP_SEARCH_FIELD") {
            ldap.search.field = field;
        }
        if let Ok(class) = std::env::var("DIRAUTH_LDAP_SEARCH_OBJECT_CLASS") {
            ldap.search.object_class = class;
        }
        if let Ok(scope) = std::env::var("DIRAUTH_LDAP_SEARCH_SCOPE") {
            ldap.search.scope = scope.parse()?;
        }
        if let Ok(filter) = std::env::var("DIRAUTH_LDAP_SEARCH_FILTER") {
            ldap.search.filter = Some(filter).filter(|f| !f.is_empty());
        }
        if let Ok(level) = std::env::var("DIRAUTH_LOG_LEVEL") {
            self.logging.level = level;
        }

        Ok(())
    }
}

/// Directory service connection and lookup settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LdapConfigSection {
    /// Directory URL (ldap://, ldaps:// or ldapi://)
    #[serde(default = "default_ldap_url")]
    pub url: String,

    /// Connect timeout in milliseconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Administrative (service account) bind
    #[serde(default)]
    pub bind: BindSection,

    /// User lookup
    #[serde(default)]
    pub search: SearchSection,
}

fn default_ldap_url() -> String {
    "ldap://localhost:389".to_string()
}

fn default_timeout() -> u64 {
    crate::DEFAULT_TIMEOUT_MS
}

impl Default for LdapConfigSection {
    fn default() -> Self {
        Self {
            url: default_ldap_url(),
            timeout: default_timeout(),
            bind: BindSection::default(),
            search: SearchSection::default(),
        }
    }
}

impl LdapConfigSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.url.is_empty() {
            return Err(crate::Error::Configuration("ldap.url is required".into()));
        }

        let parsed = url::Url::parse(&self.url).map_err(|e| {
            crate::Error::Configuration(format!("Invalid ldap.url {}: {}", self.url, e))
        })?;
        if !matches!(parsed.scheme(), "ldap" | "ldaps" | "ldapi") {
            return Err(crate::Error::Configuration(format!(
                "ldap.url must use ldap://, ldaps:// or ldapi://, got {}://",
                parsed.scheme()
            )));
        }

        if self.timeout == 0 {
            return Err(crate::Error::Configuration(
                "ldap.timeout must be greater than zero".into(),
            ));
        }

        match (&self.bind.dn, &self.bind.credentials) {
            (Some(_), None) => {
                return Err(crate::Error::Configuration(
                    "ldap.bind.dn is set but ldap.bind.credentials is missing".into(),
                ))
            }
            (None, Some(_)) => {
                return Err(crate::Error::Configuration(
                    "ldap.bind.credentials is set but ldap.bind.dn is missing".into(),
                ))
            }
            _ => {}
        }
        // An empty password turns the admin bind into an unauthenticated one
        if self.bind.dn.as_deref() == Some("") {
            return Err(crate::Error::Configuration("ldap.bind.dn must not be empty".into()));
        }
        if self.bind.credentials.as_deref() == Some("") {
            return Err(crate::Error::Configuration(
                "ldap.bind.credentials must not be empty".into(),
            ));
        }

        if self.search.dn.is_empty() {
            return Err(crate::Error::Configuration("ldap.search.dn is required".into()));
        }
        if self.search.field.is_empty() {
            return Err(crate::Error::Configuration(
                "ldap.search.field is required".into(),
            ));
        }
        if self.search.object_class.is_empty() {
            return Err(crate::Error::Configuration(
                "ldap.search.objectClass is required".into(),
            ));
        }

        Ok(())
    }

    /// Copy of this section safe to print
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.bind.credentials.is_some() {
            copy.bind.credentials = Some("********".into());
        }
        copy
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct BindSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dn: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<String>,
}

impl fmt::Debug for BindSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindSection")
            .field("dn", &self.dn)
            .field("credentials", &self.credentials.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSection {
    /// Base DN of the user search
    #[serde(default)]
    pub dn: String,

    /// Attribute compared against the supplied username
    #[serde(default = "default_field")]
    pub field: String,

    /// Object class of user entries
    #[serde(rename = "objectClass", alias = "object_class", default = "default_object_class")]
    pub object_class: String,

    #[serde(default)]
    pub scope: SearchScope,

    /// Extra filter fragment ANDed into the lookup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

fn default_field() -> String {
    crate::DEFAULT_SEARCH_FIELD.to_string()
}

fn default_object_class() -> String {
    crate::DEFAULT_OBJECT_CLASS.to_string()
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            dn: String::new(),
            field: default_field(),
            object_class: default_object_class(),
            scope: SearchScope::default(),
            filter: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive (trace, debug, info, warn, error)
    pub level: String,
    /// "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
[ldap]
url = "ldap://ldap.example.com:389"
timeout = 2500

[ldap.bind]
dn = "cn=admin,dc=x"
credentials = "secret"

[ldap.search]
dn = "dc=x"
field = "uid"
objectClass = "person"
scope = "one"
"#;

    #[test]
    fn test_parse_config() {
        let config = DirAuthConfig::from_toml(SAMPLE).unwrap();

        assert_eq!(config.ldap.url, "ldap://ldap.example.com:389");
        assert_eq!(config.ldap.timeout(), Duration::from_millis(2500));
        assert_eq!(config.ldap.bind.dn.as_deref(), Some("cn=admin,dc=x"));
        assert_eq!(config.ldap.search.object_class, "person");
        assert_eq!(config.ldap.search.scope, SearchScope::One);
        assert!(config.ldap.search.filter.is_none());
        assert_eq!(config.logging.level, "info");
        assert!(config.ldap.validate().is_ok());
    }

    #[test]
    fn test_defaults() {
        let config = DirAuthConfig::from_toml("[ldap.search]\ndn = \"dc=x\"\n").unwrap();

        assert_eq!(config.ldap.url, "ldap://localhost:389");
        assert_eq!(config.ldap.timeout, crate::DEFAULT_TIMEOUT_MS);
        assert_eq!(config.ldap.search.field, "uid");
        assert_eq!(config.ldap.search.scope, SearchScope::Subtree);
        assert!(config.ldap.bind.dn.is_none());
        assert!(config.ldap.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut section = LdapConfigSection::default();

        // Should fail - no search base
        assert!(section.validate().is_err());

        section.search.dn = "dc=x".into();
        assert!(section.validate().is_ok());

        section.url = "http://ldap.example.com".into();
        assert!(section.validate().is_err());

        section.url = "ldaps://ldap.example.com:636".into();
        section.bind.dn = Some("cn=admin,dc=x".into());
        assert!(matches!(
            section.validate(),
            Err(crate::Error::Configuration(_))
        ));

        section.bind.credentials = Some("secret".into());
        assert!(section.validate().is_ok());
    }

    #[test]
    fn test_empty_bind_values_rejected() {
        let config = DirAuthConfig::from_toml(
            r#"
[ldap.bind]
dn = "cn=admin,dc=x"
credentials = ""

[ldap.search]
dn = "dc=x"
"#,
        )
        .unwrap();
        let err = config.ldap.validate().unwrap_err();
        assert!(matches!(err, crate::Error::Configuration(ref msg) if msg.contains("credentials")));

        let mut section = config.ldap;
        section.bind.dn = Some(String::new());
        section.bind.credentials = Some("secret".into());
        assert!(section.validate().is_err());
    }

    #[test]
    fn test_redacted_hides_credentials() {
        let config = DirAuthConfig::from_toml(SAMPLE).unwrap();
        let redacted = config.ldap.redacted();

        assert_eq!(redacted.bind.credentials.as_deref(), Some("********"));
        assert!(!format!("{:?}", config.ldap.bind).contains("secret"));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = DirAuthConfig::from_file(file.path()).unwrap();
        assert_eq!(config.ldap.search.dn, "dc=x");

        let missing = DirAuthConfig::from_file("/nonexistent/dirauth.toml");
        assert!(matches!(missing, Err(crate::Error::Configuration(_))));
    }
}
