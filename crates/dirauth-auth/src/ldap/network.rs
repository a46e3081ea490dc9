//! LDAP network transport
//!
//! Opens real connections with `ldap3`. Each connection is driven on its own
//! task and is never shared or pooled.

use crate::ldap::filter::Filter;
use crate::ldap::transport::{
    DirectoryConnection, DirectoryTransport, SearchEvent, SearchEvents, TransportError,
};
use async_trait::async_trait;
use dirauth_core::types::{DirectoryEntry, SearchScope};
use futures::stream::{self, StreamExt};
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, RequestId, SearchEntry, SearchStream};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;
use tracing::{debug, warn};

/// Attributes requested for a user entry: all user attributes
const ALL_USER_ATTRIBUTES: &str = "*";

/// Network transport backed by `ldap3`
#[derive(Debug, Clone, Default)]
pub struct Ldap3Transport {
    start_tls: bool,
}

impl Ldap3Transport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upgrade plain `ldap://` connections with STARTTLS
    pub fn with_start_tls(mut self, start_tls: bool) -> Self {
        self.start_tls = start_tls;
        self
    }
}

#[async_trait]
impl DirectoryTransport for Ldap3Transport {
    async fn open(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<Box<dyn DirectoryConnection>, TransportError> {
        let settings = LdapConnSettings::new()
            .set_conn_timeout(timeout)
            .set_starttls(self.start_tls);

        debug!("Connecting to LDAP server: {}", url);

        let (conn, ldap) = LdapConnAsync::with_settings(settings, url)
            .await
            .map_err(TransportError::from)?;

        ldap3::drive!(conn);

        Ok(Box::new(Ldap3Connection {
            ldap,
            pending_search: None,
        }))
    }
}

/// One `ldap3` connection handle
struct Ldap3Connection {
    ldap: Ldap,
    /// Message id of a search whose stream may still be receiving
    pending_search: Option<RequestId>,
}

impl Ldap3Connection {
    /// Abandon a search the caller stopped reading
    async fn abandon_pending(&mut self) {
        if let Some(msgid) = self.pending_search.take() {
            if let Err(e) = self.ldap.abandon(msgid).await {
                debug!("Abandon of search {} failed: {}", msgid, e);
            }
        }
    }
}

#[async_trait]
impl DirectoryConnection for Ldap3Connection {
    async fn bind(&mut self, dn: &str, credentials: &str) -> Result<(), TransportError> {
        self.abandon_pending().await;

        self.ldap
            .simple_bind(dn, credentials)
            .await?
            .success()?;
        Ok(())
    }

    async fn search(
        &mut self,
        base_dn: &str,
        filter: &Filter,
        scope: SearchScope,
    ) -> Result<SearchEvents, TransportError> {
        self.abandon_pending().await;

        let mut search = self
            .ldap
            .streaming_search(
                base_dn,
                ldap3_scope(scope),
                &filter.to_string(),
                vec![ALL_USER_ATTRIBUTES.to_string()],
            )
            .await?;
        self.pending_search = Some(search.ldap_handle().last_id());

        Ok(search_events(search))
    }

    async fn add(
        &mut self,
        dn: &str,
        attributes: Vec<(String, Vec<String>)>,
    ) -> Result<(), TransportError> {
        self.abandon_pending().await;

        let attrs: Vec<(String, HashSet<String>)> = attributes
            .into_iter()
            .map(|(name, values)| (name, values.into_iter().collect()))
            .collect();

        self.ldap.add(dn, attrs).await?.success()?;
        Ok(())
    }

    async fn unbind(&mut self) -> Result<(), TransportError> {
        self.abandon_pending().await;
        self.ldap.unbind().await?;
        Ok(())
    }
}

fn ldap3_scope(scope: SearchScope) -> ldap3::Scope {
    match scope {
        SearchScope::Base => ldap3::Scope::Base,
        SearchScope::One => ldap3::Scope::OneLevel,
        SearchScope::Subtree => ldap3::Scope::Subtree,
    }
}

enum StreamPhase {
    Reading(SearchStream<'static, String, Vec<String>>),
    Done,
}

/// Adapt an `ldap3` search stream to entry/end/error events. Referrals and
/// intermediate messages are skipped.
fn search_events(search: SearchStream<'static, String, Vec<String>>) -> SearchEvents {
    stream::unfold(StreamPhase::Reading(search), |phase| async move {
        let mut search = match phase {
            StreamPhase::Reading(search) => search,
            StreamPhase::Done => return None,
        };

        loop {
            match search.next().await {
                Ok(Some(entry)) if entry.is_ref() || entry.is_intermediate() => continue,
                Ok(Some(entry)) => {
                    let entry = to_directory_entry(SearchEntry::construct(entry));
                    return Some((SearchEvent::Entry(entry), StreamPhase::Reading(search)));
                }
                Ok(None) => {
                    let result = search.finish().await;
                    let event = match result.success() {
                        Ok(_) => SearchEvent::End,
                        Err(e) => SearchEvent::Error(TransportError::from(e)),
                    };
                    return Some((event, StreamPhase::Done));
                }
                Err(e) => {
                    warn!("LDAP search stream error: {}", e);
                    return Some((SearchEvent::Error(TransportError::from(e)), StreamPhase::Done));
                }
            }
        }
    })
    .boxed()
}

fn to_directory_entry(entry: SearchEntry) -> DirectoryEntry {
    let attributes: BTreeMap<String, Vec<String>> = entry.attrs.into_iter().collect();
    DirectoryEntry {
        dn: entry.dn,
        attributes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_mapping() {
        assert!(matches!(ldap3_scope(SearchScope::Base), ldap3::Scope::Base));
        assert!(matches!(ldap3_scope(SearchScope::One), ldap3::Scope::OneLevel));
        assert!(matches!(ldap3_scope(SearchScope::Subtree), ldap3::Scope::Subtree));
    }

    #[tokio::test]
    async fn test_open_unreachable_server_fails() {
        let transport = Ldap3Transport::new();
        // Note: port 1 on localhost is expected to refuse connections
        let result = transport
            .open("ldap://127.0.0.1:1", Duration::from_millis(500))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_open_rejects_unknown_scheme() {
        let transport = Ldap3Transport::new();
        let result = transport
            .open("http://127.0.0.1:389", Duration::from_millis(500))
            .await;
        assert!(result.is_err());
    }
}
