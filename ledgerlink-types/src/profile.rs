//! Server profiles.

use crate::ids::ProfileId;
use crate::version::ApiVersion;
use serde::{Deserialize, Serialize};

/// HTTP basic-auth credentials.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A configured ledger server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: ProfileId,
    pub name: String,
    /// Base URL of the server, e.g. `https://ledger.example.org/`.
    pub url: String,
    #[serde(default)]
    pub credentials: Option<Credentials>,
    #[serde(default)]
    pub api_version: ApiVersion,
    /// Commodity used when a template line does not name one.
    #[serde(default)]
    pub default_currency: String,
}

impl Profile {
    pub fn new(id: ProfileId, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            url: url.into(),
            credentials: None,
            api_version: ApiVersion::Auto,
            default_currency: String::new(),
        }
    }

    #[must_use]
    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(Credentials {
            user: user.into(),
            password: password.into(),
        });
        self
    }

    #[must_use]
    pub fn with_api_version(mut self, api_version: ApiVersion) -> Self {
        self.api_version = api_version;
        self
    }

    #[must_use]
    pub fn with_default_currency(mut self, currency: impl Into<String>) -> Self {
        self.default_currency = currency.into();
        self
    }

    /// Joins `path` onto the profile URL, tolerating a missing trailing slash.
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        let base = self.url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{base}/{path}")
    }
}
