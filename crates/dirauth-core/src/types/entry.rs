//! Directory entry types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Attribute name to one-or-many values
pub type AttributeMap = BTreeMap<String, Vec<String>>;

/// Attributes checked, in order, when looking for a user's email address
pub const EMAIL_ATTRIBUTES: [&str; 3] = ["mail", "email", "userPrincipalName"];

/// A single entry returned by a directory search.
///
/// Only valid for the lifetime of the connection that produced it; nothing
/// holds on to entries across calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Distinguished name
    pub dn: String,

    /// Raw attributes
    #[serde(default)]
    pub attributes: AttributeMap,
}

impl DirectoryEntry {
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: AttributeMap::new(),
        }
    }

    /// Builder-style attribute setter, replacing existing values
    pub fn with_attribute<I, V>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.attributes
            .insert(name.into(), values.into_iter().map(Into::into).collect());
        self
    }

    /// Values of an attribute, matching the name case-insensitively
    pub fn values(&self, name: &str) -> Option<&[String]> {
        self.attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_slice())
    }

    /// First value of an attribute
    pub fn get_attribute(&self, name: &str) -> Option<&str> {
        self.values(name)
            .and_then(|v| v.first())
            .map(|s| s.as_str())
    }
}

/// Successful authentication: the resolved entry's attributes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResult {
    pub dn: String,
    pub attributes: AttributeMap,
}

impl AuthResult {
    pub fn get_attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .and_then(|(_, v)| v.first())
            .map(|s| s.as_str())
    }

    pub fn email(&self) -> Option<&str> {
        primary_email(&self.attributes)
    }
}

impl From<DirectoryEntry> for AuthResult {
    fn from(entry: DirectoryEntry) -> Self {
        Self {
            dn: entry.dn,
            attributes: entry.attributes,
        }
    }
}

/// First non-empty value of `mail`, `email`, then `userPrincipalName`
pub fn primary_email(attributes: &AttributeMap) -> Option<&str> {
    EMAIL_ATTRIBUTES.iter().find_map(|attr| {
        attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(attr))
            .and_then(|(_, v)| v.iter().find(|s| !s.is_empty()))
            .map(|s| s.as_str())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_lookup_ignores_case() {
        let entry = DirectoryEntry::new("uid=bob,dc=x")
            .with_attribute("objectClass", ["person", "top"])
            .with_attribute("uid", ["bob"]);

        assert_eq!(entry.get_attribute("UID"), Some("bob"));
        assert_eq!(entry.values("objectclass").map(|v| v.len()), Some(2));
        assert!(entry.get_attribute("mail").is_none());
    }

    #[test]
    fn test_email_fallback_order() {
        let mut attrs = AttributeMap::new();
        attrs.insert("userPrincipalName".into(), vec!["bob@corp.local".into()]);
        assert_eq!(primary_email(&attrs), Some("bob@corp.local"));

        attrs.insert("email".into(), vec!["bob@alt.com".into()]);
        assert_eq!(primary_email(&attrs), Some("bob@alt.com"));

        attrs.insert("mail".into(), vec!["bob@x.com".into()]);
        assert_eq!(primary_email(&attrs), Some("bob@x.com"));
    }

    #[test]
    fn test_auth_result_from_entry() {
        let entry = DirectoryEntry::new("uid=bob,dc=x").with_attribute("mail", ["bob@x.com"]);
        let result = AuthResult::from(entry);

        assert_eq!(result.dn, "uid=bob,dc=x");
        assert_eq!(result.email(), Some("bob@x.com"));
    }
}
