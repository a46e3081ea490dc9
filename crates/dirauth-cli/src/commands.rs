//! Subcommand implementations
//!
//! Each command prints one JSON document to stdout and reports whether the
//! operation succeeded.

use dirauth_auth::{configs_from_section, DirectoryAuthClient, Ldap3Transport};
use dirauth_core::types::{AuthResult, ProvisionRequest};
use dirauth_core::{DirAuthConfig, Error};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

#[derive(Debug, Serialize)]
struct ErrorOutput<'a> {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<&'a str>,
}

impl<'a> From<&'a Error> for ErrorOutput<'a> {
    fn from(err: &'a Error) -> Self {
        Self {
            error: err.code(),
            message: err.to_string(),
            user: err.user(),
        }
    }
}

fn client(start_tls: bool) -> DirectoryAuthClient {
    DirectoryAuthClient::new(Ldap3Transport::new().with_start_tls(start_tls))
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn report_error(err: &Error) -> anyhow::Result<bool> {
    print_json(&ErrorOutput::from(err))?;
    Ok(false)
}

fn login_output(result: &AuthResult) -> serde_json::Value {
    json!({
        "authenticated": true,
        "dn": result.dn,
        "email": result.email(),
        "attributes": result.attributes,
    })
}

pub async fn login(
    config: &DirAuthConfig,
    start_tls: bool,
    username: &str,
    password: &str,
) -> anyhow::Result<bool> {
    let (connection, search) = match configs_from_section(&config.ldap) {
        Ok(configs) => configs,
        Err(e) => return report_error(&e),
    };

    match client(start_tls)
        .authenticate(&connection, &search, username, password)
        .await
    {
        Ok(result) => {
            print_json(&login_output(&result))?;
            Ok(true)
        }
        Err(e) => report_error(&e),
    }
}

pub async fn provision(
    config: &DirAuthConfig,
    start_tls: bool,
    username: &str,
    display_name: Option<String>,
    email: &str,
    password: &str,
) -> anyhow::Result<bool> {
    let (connection, search) = match configs_from_section(&config.ldap) {
        Ok(configs) => configs,
        Err(e) => return report_error(&e),
    };

    let request = ProvisionRequest::new(username, display_name, email, password);
    debug!("Provision request: {:?}", request);

    match client(start_tls)
        .provision(&connection, &search, &request)
        .await
    {
        Ok(()) => {
            print_json(&json!({
                "created": true,
                "dn": DirectoryAuthClient::provision_dn(username, &search.base_dn),
            }))?;
            Ok(true)
        }
        Err(e) => report_error(&e),
    }
}

pub fn check_config(config: &DirAuthConfig) -> anyhow::Result<bool> {
    if let Err(e) = configs_from_section(&config.ldap) {
        return report_error(&e);
    }

    let mut shown = config.clone();
    shown.ldap = config.ldap.redacted();
    info!("Configuration is valid");
    print_json(&json!({ "valid": true, "config": shown }))?;
    Ok(true)
}
