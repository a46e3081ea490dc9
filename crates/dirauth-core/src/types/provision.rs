//! User provisioning types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Request to create a new user entry
#[derive(Clone, Serialize, Deserialize)]
pub struct ProvisionRequest {
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub email: String,
    pub password: String,
}

impl ProvisionRequest {
    pub fn new(
        username: impl Into<String>,
        display_name: Option<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            display_name,
            email: email.into(),
            password: password.into(),
        }
    }

    /// Surname to store; an empty display name falls back to the username
    pub fn surname(&self) -> &str {
        match self.display_name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => &self.username,
        }
    }
}

impl fmt::Debug for ProvisionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvisionRequest")
            .field("username", &self.username)
            .field("display_name", &self.display_name)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}
