//! Server versions and the JSON API version ladder.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// JSON wire schema to speak with a server.
///
/// `Auto` asks the client to detect the server version first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum ApiVersion {
    #[default]
    #[serde(rename = "auto")]
    Auto,
    #[serde(rename = "1.14")]
    V1_14,
    #[serde(rename = "1.15")]
    V1_15,
    #[serde(rename = "1.19")]
    V1_19,
    #[serde(rename = "1.23")]
    V1_23,
    #[serde(rename = "1.32")]
    V1_32,
    #[serde(rename = "1.40")]
    V1_40,
    #[serde(rename = "1.50")]
    V1_50,
}

impl ApiVersion {
    /// Every concrete schema, oldest first.
    pub const LADDER: [ApiVersion; 7] = [
        ApiVersion::V1_14,
        ApiVersion::V1_15,
        ApiVersion::V1_19,
        ApiVersion::V1_23,
        ApiVersion::V1_32,
        ApiVersion::V1_40,
        ApiVersion::V1_50,
    ];

    /// `(major, minor)` of the first server release speaking this schema.
    #[must_use]
    pub const fn min_server(&self) -> Option<(u32, u32)> {
        match self {
            ApiVersion::Auto => None,
            ApiVersion::V1_14 => Some((1, 14)),
            ApiVersion::V1_15 => Some((1, 15)),
            ApiVersion::V1_19 => Some((1, 19)),
            ApiVersion::V1_23 => Some((1, 23)),
            ApiVersion::V1_32 => Some((1, 32)),
            ApiVersion::V1_40 => Some((1, 40)),
            ApiVersion::V1_50 => Some((1, 50)),
        }
    }

    /// Concrete schemas, newest first. Used when nothing better is known.
    pub fn newest_first() -> impl Iterator<Item = ApiVersion> {
        Self::LADDER.into_iter().rev()
    }

    /// True for schemas where `ptransaction_` is a string and the decimal
    /// mark field is called `asdecimalmark`.
    #[must_use]
    pub fn uses_string_transaction_ids(&self) -> bool {
        *self >= ApiVersion::V1_32
    }

    /// True when account balances live under `adata.pdperiods`.
    #[must_use]
    pub fn uses_period_balances(&self) -> bool {
        *self >= ApiVersion::V1_50
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.min_server() {
            Some((major, minor)) => write!(f, "{major}.{minor}"),
            None => f.write_str("auto"),
        }
    }
}

impl FromStr for ApiVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("auto") {
            return Ok(ApiVersion::Auto);
        }
        ApiVersion::LADDER
            .into_iter()
            .find(|v| v.to_string() == s)
            .ok_or_else(|| Error::InvalidVersion(s.to_string()))
    }
}

/// A `major.minor[.patch]` server release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServerVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: Option<u32>,
}

impl ServerVersion {
    #[must_use]
    pub const fn new(major: u32, minor: u32) -> Self {
        Self {
            major,
            minor,
            patch: None,
        }
    }

    /// True when this release is `major.minor` or newer.
    #[must_use]
    pub fn at_least(&self, major: u32, minor: u32) -> bool {
        (self.major, self.minor) >= (major, minor)
    }

    /// Highest schema on the ladder this release speaks, if any.
    #[must_use]
    pub fn suitable_api(&self) -> Option<ApiVersion> {
        ApiVersion::newest_first().find(|api| {
            api.min_server()
                .is_some_and(|(major, minor)| self.at_least(major, minor))
        })
    }

    /// Parses a `/version` response body: `"1.32"`, `1.32.1`, optionally quoted,
    /// surrounding whitespace ignored.
    pub fn parse_response(body: &str) -> Result<Self> {
        let line = body.lines().next().unwrap_or_default().trim();
        let bare = line
            .strip_prefix('"')
            .and_then(|l| l.strip_suffix('"'))
            .unwrap_or(line);

        let mut parts = bare.split('.');
        let invalid = || Error::InvalidVersion(line.to_string());
        let major = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;
        let minor = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;
        let patch = match parts.next() {
            Some(p) => Some(p.parse().map_err(|_| invalid())?),
            None => None,
        };
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self {
            major,
            minor,
            patch,
        })
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.patch {
            Some(patch) => write!(f, "{}.{}.{}", self.major, self.minor, patch),
            None => write!(f, "{}.{}", self.major, self.minor),
        }
    }
}

/// Outcome of probing `GET /version`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectedVersion {
    /// The server reported its release.
    Known(ServerVersion),
    /// The version endpoint does not exist: the server predates 1.19.
    Pre119,
}

impl DetectedVersion {
    /// JSON schemas worth trying against this server, best first.
    ///
    /// Empty when the server is too old for any JSON schema.
    #[must_use]
    pub fn candidate_apis(&self) -> Vec<ApiVersion> {
        match self {
            DetectedVersion::Known(v) => v.suitable_api().into_iter().collect(),
            DetectedVersion::Pre119 => vec![ApiVersion::V1_15, ApiVersion::V1_14],
        }
    }
}

impl fmt::Display for DetectedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectedVersion::Known(v) => v.fmt(f),
            DetectedVersion::Pre119 => f.write_str("pre-1.19"),
        }
    }
}
