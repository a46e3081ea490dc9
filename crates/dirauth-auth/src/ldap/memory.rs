//! In-process directory
//!
//! A small directory held in memory that speaks the same transport contract
//! as the network client. Used by the test suites and for local development
//! without a directory server. Containers are implicit: any DN may be added
//! or searched below without its parent existing.

use crate::ldap::filter::Filter;
use crate::ldap::transport::{
    DirectoryConnection, DirectoryTransport, SearchEvent, SearchEvents, TransportError,
    RC_ENTRY_ALREADY_EXISTS, RC_INVALID_CREDENTIALS,
};
use async_trait::async_trait;
use dirauth_core::types::{DirectoryEntry, SearchScope};
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Attribute holding bind passwords; never returned from a search
pub const PASSWORD_ATTRIBUTE: &str = "userPassword";

/// Operation observed by the directory, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Open { url: String },
    Bind { dn: String },
    Search { base_dn: String, filter: String },
    Add { dn: String },
    Unbind,
}

#[derive(Default)]
struct State {
    entries: BTreeMap<String, DirectoryEntry>,
    unreachable: Option<String>,
    search_script: Option<Vec<SearchEvent>>,
    add_failure: Option<TransportError>,
    bind_failures: BTreeMap<String, TransportError>,
    opened: usize,
    closed: usize,
    operations: Vec<Operation>,
}

/// Shared handle to an in-memory directory. Clones see the same data.
#[derive(Clone, Default)]
pub struct MemoryDirectory {
    state: Arc<Mutex<State>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an entry
    pub fn insert(&self, entry: DirectoryEntry) {
        self.state.lock().entries.insert(normalize_dn(&entry.dn), entry);
    }

    /// Insert an entry that can be bound to with `password`
    pub fn insert_with_password(&self, entry: DirectoryEntry, password: &str) {
        self.insert(entry.with_attribute(PASSWORD_ATTRIBUTE, [password]));
    }

    /// Look up an entry by DN, password included
    pub fn get(&self, dn: &str) -> Option<DirectoryEntry> {
        self.state.lock().entries.get(&normalize_dn(dn)).cloned()
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make every subsequent open fail with `reason`
    pub fn set_unreachable(&self, reason: impl Into<String>) {
        self.state.lock().unreachable = Some(reason.into());
    }

    /// Replay `events` for every subsequent search instead of evaluating it
    pub fn script_search(&self, events: Vec<SearchEvent>) {
        self.state.lock().search_script = Some(events);
    }

    /// Make every subsequent bind as `dn` fail with `error`
    pub fn fail_binds_for(&self, dn: &str, error: TransportError) {
        self.state
            .lock()
            .bind_failures
            .insert(normalize_dn(dn), error);
    }

    /// Make every subsequent add fail with `error`
    pub fn fail_adds_with(&self, error: TransportError) {
        self.state.lock().add_failure = Some(error);
    }

    /// Connections opened so far
    pub fn opened(&self) -> usize {
        self.state.lock().opened
    }

    /// Unbind calls received so far
    pub fn closed(&self) -> usize {
        self.state.lock().closed
    }

    pub fn operations(&self) -> Vec<Operation> {
        self.state.lock().operations.clone()
    }

    fn record(&self, op: Operation) {
        self.state.lock().operations.push(op);
    }
}

#[async_trait]
impl DirectoryTransport for MemoryDirectory {
    async fn open(
        &self,
        url: &str,
        _timeout: Duration,
    ) -> Result<Box<dyn DirectoryConnection>, TransportError> {
        self.record(Operation::Open {
            url: url.to_string(),
        });

        let mut state = self.state.lock();
        if let Some(reason) = &state.unreachable {
            return Err(TransportError::new(reason.clone()));
        }
        state.opened += 1;
        drop(state);

        Ok(Box::new(MemoryConnection {
            directory: self.clone(),
            closed: false,
        }))
    }
}

struct MemoryConnection {
    directory: MemoryDirectory,
    closed: bool,
}

impl MemoryConnection {
    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::new("connection closed"));
        }
        Ok(())
    }
}

#[async_trait]
impl DirectoryConnection for MemoryConnection {
    async fn bind(&mut self, dn: &str, credentials: &str) -> Result<(), TransportError> {
        self.directory.record(Operation::Bind { dn: dn.to_string() });
        self.ensure_open()?;

        let state = self.directory.state.lock();
        let key = normalize_dn(dn);
        if let Some(err) = state.bind_failures.get(&key) {
            return Err(err.clone());
        }

        let accepted = !credentials.is_empty()
            && state
                .entries
                .get(&key)
                .and_then(|entry| entry.values(PASSWORD_ATTRIBUTE))
                .map(|passwords| passwords.iter().any(|p| p == credentials))
                .unwrap_or(false);

        if accepted {
            Ok(())
        } else {
            Err(TransportError::with_code(
                RC_INVALID_CREDENTIALS,
                "Invalid Credentials",
            ))
        }
    }

    async fn search(
        &mut self,
        base_dn: &str,
        filter: &Filter,
        scope: SearchScope,
    ) -> Result<SearchEvents, TransportError> {
        self.directory.record(Operation::Search {
            base_dn: base_dn.to_string(),
            filter: filter.to_string(),
        });
        self.ensure_open()?;

        let state = self.directory.state.lock();
        if let Some(script) = &state.search_script {
            return Ok(stream::iter(script.clone()).boxed());
        }

        let base = normalize_dn(base_dn);
        let mut events: Vec<SearchEvent> = state
            .entries
            .iter()
            .filter(|(dn, _)| in_scope(dn, &base, scope))
            .filter(|(_, entry)| filter.matches(entry))
            .map(|(_, entry)| SearchEvent::Entry(without_password(entry)))
            .collect();
        events.push(SearchEvent::End);

        debug!("Memory search under {} yielded {} event(s)", base_dn, events.len());
        Ok(stream::iter(events).boxed())
    }

    async fn add(
        &mut self,
        dn: &str,
        attributes: Vec<(String, Vec<String>)>,
    ) -> Result<(), TransportError> {
        self.directory.record(Operation::Add { dn: dn.to_string() });
        self.ensure_open()?;

        if attributes.iter().any(|(_, values)| values.is_empty()) {
            return Err(TransportError::new("empty value set for Add"));
        }

        let mut state = self.directory.state.lock();
        if let Some(err) = &state.add_failure {
            return Err(err.clone());
        }

        let key = normalize_dn(dn);
        if state.entries.contains_key(&key) {
            return Err(TransportError::with_code(
                RC_ENTRY_ALREADY_EXISTS,
                "Entry Already Exists",
            ));
        }

        let mut entry = DirectoryEntry::new(dn);
        for (name, values) in attributes {
            entry.attributes.insert(name, values);
        }
        state.entries.insert(key, entry);
        Ok(())
    }

    async fn unbind(&mut self) -> Result<(), TransportError> {
        self.directory.record(Operation::Unbind);
        self.directory.state.lock().closed += 1;

        if self.closed {
            return Err(TransportError::new("connection already closed"));
        }
        self.closed = true;
        Ok(())
    }
}

/// RDNs of a DN, split on unescaped commas
fn rdns(dn: &str) -> Vec<&str> {
    if dn.is_empty() {
        return Vec::new();
    }

    let mut rdns = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (i, c) in dn.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            ',' => {
                rdns.push(&dn[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    rdns.push(&dn[start..]);
    rdns
}

/// Lowercase and strip spaces around RDN separators
fn normalize_dn(dn: &str) -> String {
    rdns(dn)
        .into_iter()
        .map(|rdn| rdn.trim().to_lowercase())
        .collect::<Vec<_>>()
        .join(",")
}

/// Scope test on normalized DNs
fn in_scope(dn: &str, base: &str, scope: SearchScope) -> bool {
    let dn = rdns(dn);
    let base = rdns(base);
    let below = dn.len() >= base.len() && dn[dn.len() - base.len()..] == base[..];

    match scope {
        SearchScope::Base => dn == base,
        SearchScope::One => below && dn.len() == base.len() + 1,
        SearchScope::Subtree => below,
    }
}

fn without_password(entry: &DirectoryEntry) -> DirectoryEntry {
    let mut entry = entry.clone();
    entry
        .attributes
        .retain(|name, _| !name.eq_ignore_ascii_case(PASSWORD_ATTRIBUTE));
    entry
}
