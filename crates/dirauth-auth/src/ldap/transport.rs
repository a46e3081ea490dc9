//! Directory transport abstraction
//!
//! The client never talks to the wire directly. It opens one connection per
//! operation through a [`DirectoryTransport`] and drives it through bind,
//! search, add and unbind.

use crate::ldap::filter::Filter;
use async_trait::async_trait;
use dirauth_core::types::{DirectoryEntry, SearchScope};
use futures::stream::{BoxStream, StreamExt};
use std::fmt;
use std::time::Duration;

/// LDAP result code: noSuchObject
pub const RC_NO_SUCH_OBJECT: u32 = 32;
/// LDAP result code: invalidCredentials
pub const RC_INVALID_CREDENTIALS: u32 = 49;
/// LDAP result code: entryAlreadyExists
pub const RC_ENTRY_ALREADY_EXISTS: u32 = 68;
/// LDAP result code: other
pub const RC_OTHER: u32 = 80;

/// Failure reported by the transport, with the LDAP result code if the
/// server produced one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    pub code: Option<u32>,
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(code: u32, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }

    pub fn is_already_exists(&self) -> bool {
        self.code == Some(RC_ENTRY_ALREADY_EXISTS)
    }

    pub fn is_no_such_object(&self) -> bool {
        self.code == Some(RC_NO_SUCH_OBJECT)
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (code {})", self.message, code),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<ldap3::LdapError> for TransportError {
    fn from(err: ldap3::LdapError) -> Self {
        match err {
            ldap3::LdapError::LdapResult { result } => {
                let message = if result.text.is_empty() {
                    "LDAP operation failed".to_string()
                } else {
                    result.text
                };
                TransportError::with_code(result.rc, message)
            }
            ldap3::LdapError::Timeout { .. } => TransportError::new("operation timed out"),
            other => TransportError::new(other.to_string()),
        }
    }
}

/// One event of an in-flight search
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchEvent {
    Entry(DirectoryEntry),
    End,
    Error(TransportError),
}

/// Events of one search, in arrival order
pub type SearchEvents = BoxStream<'static, SearchEvent>;

/// How a search settled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    Found(DirectoryEntry),
    NotFound,
    Failed(TransportError),
}

/// Wait for the first event of a search and settle on it.
///
/// Only the first event counts. The stream is dropped before returning, so
/// anything the server sends afterwards is never observed. A stream that
/// closes without an event settles as [`SearchOutcome::NotFound`].
pub async fn settle_search(mut events: SearchEvents) -> SearchOutcome {
    let outcome = match events.next().await {
        Some(SearchEvent::Entry(entry)) => SearchOutcome::Found(entry),
        Some(SearchEvent::End) | None => SearchOutcome::NotFound,
        Some(SearchEvent::Error(err)) => SearchOutcome::Failed(err),
    };
    drop(events);
    outcome
}

/// Opens connections to a directory service
#[async_trait]
pub trait DirectoryTransport: Send + Sync {
    async fn open(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<Box<dyn DirectoryConnection>, TransportError>;
}

/// A single directory connection, used by exactly one operation
#[async_trait]
pub trait DirectoryConnection: Send {
    /// Simple bind; any non-success result is an error
    async fn bind(&mut self, dn: &str, credentials: &str) -> Result<(), TransportError>;

    /// Start a search and hand back its event stream
    async fn search(
        &mut self,
        base_dn: &str,
        filter: &Filter,
        scope: SearchScope,
    ) -> Result<SearchEvents, TransportError>;

    /// Add a new entry
    async fn add(
        &mut self,
        dn: &str,
        attributes: Vec<(String, Vec<String>)>,
    ) -> Result<(), TransportError>;

    /// Close the connection
    async fn unbind(&mut self) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn entry(dn: &str) -> DirectoryEntry {
        DirectoryEntry::new(dn)
    }

    #[tokio::test]
    async fn test_first_entry_wins() {
        let events = stream::iter(vec![
            SearchEvent::Entry(entry("uid=a,dc=x")),
            SearchEvent::Entry(entry("uid=b,dc=x")),
            SearchEvent::End,
        ])
        .boxed();

        assert_eq!(
            settle_search(events).await,
            SearchOutcome::Found(entry("uid=a,dc=x"))
        );
    }

    #[tokio::test]
    async fn test_late_events_are_ignored() {
        let events = stream::iter(vec![
            SearchEvent::End,
            SearchEvent::Entry(entry("uid=a,dc=x")),
            SearchEvent::Error(TransportError::new("late")),
        ])
        .boxed();
        assert_eq!(settle_search(events).await, SearchOutcome::NotFound);

        let events = stream::iter(vec![
            SearchEvent::Error(TransportError::with_code(RC_OTHER, "boom")),
            SearchEvent::Entry(entry("uid=a,dc=x")),
        ])
        .boxed();
        assert_eq!(
            settle_search(events).await,
            SearchOutcome::Failed(TransportError::with_code(RC_OTHER, "boom"))
        );
    }

    #[tokio::test]
    async fn test_empty_stream_is_not_found() {
        let events = stream::empty().boxed();
        assert_eq!(settle_search(events).await, SearchOutcome::NotFound);
    }

    #[test]
    fn test_error_display() {
        let err = TransportError::with_code(RC_ENTRY_ALREADY_EXISTS, "Entry Already Exists");
        assert!(err.is_already_exists());
        assert_eq!(err.to_string(), "Entry Already Exists (code 68)");
        assert_eq!(TransportError::new("refused").to_string(), "refused");
    }
}
