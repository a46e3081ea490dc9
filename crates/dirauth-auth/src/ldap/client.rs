//! Directory authentication client
//!
//! Every call owns exactly one connection:
//!
//! ```text
//! authenticate: connect -> [admin bind] -> search -> user bind -> unbind
//! provision:    connect -> admin bind -> add -> unbind
//! ```
//!
//! Each step starts only after the previous one settled. Once a connection
//! is open it is unbound exactly once on every exit path, and a failing
//! unbind never replaces the outcome already reached.
//!
//! Dropping a call's future before it completes (for example under
//! `tokio::time::timeout`) skips the unbind: the connection is released
//! without one and only a warning is logged.

use crate::ldap::network::Ldap3Transport;
use crate::ldap::transport::{
    settle_search, DirectoryConnection, DirectoryTransport, SearchOutcome, TransportError,
};
use crate::ldap::types::{ConnectionConfig, SearchConfig};
use dirauth_core::types::{AuthResult, DirectoryEntry, ProvisionRequest};
use dirauth_core::{Error, Result, PROVISION_OBJECT_CLASSES};
use ldap3::dn_escape;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Stage a client call has reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Connecting,
    AdminBinding,
    Searching,
    CredentialBinding,
    Submitting,
    Closed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Idle => "idle",
            Stage::Connecting => "connecting",
            Stage::AdminBinding => "admin-binding",
            Stage::Searching => "searching",
            Stage::CredentialBinding => "credential-binding",
            Stage::Submitting => "submitting",
            Stage::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// An open connection plus the stage of the call using it
struct Session {
    conn: Box<dyn DirectoryConnection>,
    stage: Stage,
    operation: &'static str,
    closed: bool,
}

impl Session {
    fn enter(&mut self, stage: Stage) {
        debug!("{}: {} -> {}", self.operation, self.stage, stage);
        self.stage = stage;
    }

    /// Unbind and release the connection. Unbind failures are only logged.
    ///
    /// Not reached if the owning future is dropped mid-call.
    async fn close(mut self) {
        self.enter(Stage::Closed);
        if let Err(e) = self.conn.unbind().await {
            debug!("{}: unbind failed: {}", self.operation, e);
        }
        self.closed = true;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.closed {
            warn!(
                "{}: connection released in stage {} without unbind",
                self.operation, self.stage
            );
        }
    }
}

/// Authenticates users against a directory service and provisions new
/// user entries
#[derive(Clone)]
pub struct DirectoryAuthClient {
    transport: Arc<dyn DirectoryTransport>,
}

impl DirectoryAuthClient {
    pub fn new(transport: impl DirectoryTransport + 'static) -> Self {
        Self {
            transport: Arc::new(transport),
        }
    }

    pub fn with_transport(transport: Arc<dyn DirectoryTransport>) -> Self {
        Self { transport }
    }

    /// Client over the `ldap3` network transport
    pub fn ldap() -> Self {
        Self::new(Ldap3Transport::new())
    }

    /// DN of a provisioned user: `cn=<username>,<base_dn>`
    pub fn provision_dn(username: &str, base_dn: &str) -> String {
        format!("cn={},{}", dn_escape(username), base_dn)
    }

    /// Verify `username`/`password` and return the user's entry.
    ///
    /// An unknown user and a wrong password fail identically with
    /// [`Error::InvalidCredentials`].
    pub async fn authenticate(
        &self,
        connection: &ConnectionConfig,
        search: &SearchConfig,
        username: &str,
        password: &str,
    ) -> Result<AuthResult> {
        debug!(
            "Login attempt for {} (url: {}, search dn: {}, field: {}, objectClass: {})",
            username, connection.url, search.base_dn, search.match_field, search.object_class
        );

        // An empty password would be an unauthenticated bind, which servers accept
        if username.is_empty() || password.is_empty() {
            return Err(Error::invalid_credentials(username));
        }

        let mut session = self.connect(connection, "authenticate").await?;
        let outcome = self
            .login(&mut session, connection, search, username, password)
            .await;
        session.close().await;

        match &outcome {
            Ok(result) => info!("User {} authenticated as {}", username, result.dn),
            Err(e) => warn!("Authentication failed for {}: {}", username, e),
        }
        outcome
    }

    /// Create a directory entry for a new user.
    ///
    /// Requires administrative credentials. The directory decides whether
    /// the DN collides; no lookup is made first.
    pub async fn provision(
        &self,
        connection: &ConnectionConfig,
        search: &SearchConfig,
        request: &ProvisionRequest,
    ) -> Result<()> {
        debug!(
            "Creating user {} (url: {}, search dn: {})",
            request.username, connection.url, search.base_dn
        );

        if connection.admin.is_none() {
            return Err(Error::Configuration(
                "provisioning requires ldap.bind.dn and ldap.bind.credentials".into(),
            ));
        }
        if request.username.is_empty() {
            return Err(Error::Provision("username is required".into()));
        }
        if request.password.is_empty() {
            return Err(Error::Provision("password is required".into()));
        }

        let mut session = self.connect(connection, "provision").await?;
        let outcome = self.submit(&mut session, connection, search, request).await;
        session.close().await;

        match &outcome {
            Ok(()) => info!("User {} created in directory", request.username),
            Err(e) => warn!("Provisioning {} failed: {}", request.username, e),
        }
        outcome
    }

    // =========================================================================
    // Steps
    // =========================================================================

    async fn connect(
        &self,
        connection: &ConnectionConfig,
        operation: &'static str,
    ) -> Result<Session> {
        debug!("{}: {} -> {}", operation, Stage::Idle, Stage::Connecting);

        let conn = self
            .transport
            .open(&connection.url, connection.timeout)
            .await
            .map_err(|e| {
                warn!("{}: connection to {} failed: {}", operation, connection.url, e);
                Error::Connection(e.to_string())
            })?;

        Ok(Session {
            conn,
            stage: Stage::Connecting,
            operation,
            closed: false,
        })
    }

    async fn login(
        &self,
        session: &mut Session,
        connection: &ConnectionConfig,
        search: &SearchConfig,
        username: &str,
        password: &str,
    ) -> Result<AuthResult> {
        if let Some(admin) = &connection.admin {
            session.enter(Stage::AdminBinding);
            debug!("Binding with admin DN: {}", admin.dn);
            session
                .conn
                .bind(&admin.dn, &admin.credentials)
                .await
                .map_err(|e| Error::Bind(e.to_string()))?;
        }

        session.enter(Stage::Searching);
        let entry = self.find_user(session, search, username).await?;

        session.enter(Stage::CredentialBinding);
        debug!("Attempting user bind with DN: {}", entry.dn);
        session.conn.bind(&entry.dn, password).await.map_err(|e| {
            debug!("User bind failed for {}: {}", entry.dn, e);
            Error::invalid_credentials(username)
        })?;

        Ok(AuthResult::from(entry))
    }

    async fn find_user(
        &self,
        session: &mut Session,
        search: &SearchConfig,
        username: &str,
    ) -> Result<DirectoryEntry> {
        let filter = search.user_filter(username);
        debug!(
            "Searching {} ({}) with filter: {}",
            search.base_dn, search.scope, filter
        );

        let events = session
            .conn
            .search(&search.base_dn, &filter, search.scope)
            .await
            .map_err(search_error)?;

        match settle_search(events).await {
            SearchOutcome::Found(entry) => {
                debug!("User found: {}", entry.dn);
                Ok(entry)
            }
            SearchOutcome::NotFound => {
                debug!("User {} not found under {}", username, search.base_dn);
                Err(Error::invalid_credentials(username))
            }
            SearchOutcome::Failed(e) => Err(search_error(e)),
        }
    }

    async fn submit(
        &self,
        session: &mut Session,
        connection: &ConnectionConfig,
        search: &SearchConfig,
        request: &ProvisionRequest,
    ) -> Result<()> {
        let admin = connection.admin.as_ref().ok_or_else(|| {
            Error::Configuration("provisioning requires administrative credentials".into())
        })?;

        session.enter(Stage::AdminBinding);
        session
            .conn
            .bind(&admin.dn, &admin.credentials)
            .await
            .map_err(|e| {
                Error::Configuration(format!(
                    "Failed to bind with directory admin credentials: {}",
                    e
                ))
            })?;

        let dn = Self::provision_dn(&request.username, &search.base_dn);
        let attributes = provision_attributes(search, request);

        session.enter(Stage::Submitting);
        debug!("Adding user with DN: {}", dn);
        session.conn.add(&dn, attributes).await.map_err(|e| {
            if e.is_already_exists() {
                Error::duplicate_user(&request.username)
            } else {
                Error::Provision(e.to_string())
            }
        })
    }
}

/// Attribute set of a new user entry
fn provision_attributes(
    search: &SearchConfig,
    request: &ProvisionRequest,
) -> Vec<(String, Vec<String>)> {
    let mut object_classes = vec![search.object_class.clone()];
    for class in PROVISION_OBJECT_CLASSES {
        if !object_classes.iter().any(|c| c.eq_ignore_ascii_case(class)) {
            object_classes.push(class.to_string());
        }
    }

    let mut attributes = vec![
        ("cn".to_string(), vec![request.username.clone()]),
        ("sn".to_string(), vec![request.surname().to_string()]),
    ];
    if !request.email.is_empty() {
        attributes.push(("mail".to_string(), vec![request.email.clone()]));
    }
    attributes.push(("objectClass".to_string(), object_classes));
    attributes.push(("userPassword".to_string(), vec![request.password.clone()]));
    attributes
}

fn search_error(e: TransportError) -> Error {
    if e.is_no_such_object() {
        Error::Connection(format!("Directory search failed, search base does not exist: {}", e))
    } else {
        Error::Connection(format!("Directory search failed: {}", e))
    }
}
