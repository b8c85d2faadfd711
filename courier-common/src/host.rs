//! Host newtype for the request host context
//!
//! The web layer hands us whatever it saw in the request (`https://Example.com:8443/`,
//! `example.com`, or nothing at all). [`Host`] normalises that into a bare,
//! lower-cased host name that can be used as the domain part of a sender
//! address.

use std::{
    fmt::{self, Display},
    ops::Deref,
    sync::Arc,
};

use serde::{Deserialize, Serialize};

/// Host used when the request context carries no usable host.
pub const DEFAULT_HOST: &str = "domain.com";

/// Local part used for best-effort sender addresses.
pub const NOREPLY_LOCAL_PART: &str = "noreply";

/// A bare host name (no scheme, port, path or trailing dot)
///
/// # Examples
///
/// ```
/// use courier_common::Host;
///
/// let host = Host::from_context(Some("https://Example.com:8443/reset"));
/// assert_eq!(host.as_str(), "example.com");
///
/// let host = Host::from_context(None);
/// assert_eq!(host.as_str(), "domain.com");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct Host(Arc<str>);

impl Host {
    /// Normalise a raw host context value, falling back to [`DEFAULT_HOST`].
    #[must_use]
    pub fn from_context(raw: Option<&str>) -> Self {
        raw.and_then(normalise)
            .map_or_else(|| Self(Arc::from(DEFAULT_HOST)), |host| Self(Arc::from(host)))
    }

    /// Get the host as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `noreply@<host>`
    #[must_use]
    pub fn noreply_address(&self) -> String {
        format!("{NOREPLY_LOCAL_PART}@{}", self.0)
    }
}

fn normalise(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let without_scheme = raw.split_once("://").map_or(raw, |(_, rest)| rest);
    let authority = without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    // Drop any userinfo before stripping the port
    let authority = authority.rsplit_once('@').map_or(authority, |(_, h)| h);

    let host = if let Some(bracketed) = authority.strip_prefix('[') {
        // IPv6 literal: keep the brackets, drop the port
        bracketed
            .split_once(']')
            .map(|(inner, _)| format!("[{inner}]"))?
    } else {
        authority
            .split_once(':')
            .map_or(authority, |(h, _)| h)
            .to_string()
    };

    let host = host.trim_end_matches('.').to_ascii_lowercase();

    if host.is_empty() || host.chars().any(char::is_whitespace) {
        None
    } else {
        Some(host)
    }
}

impl Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Host {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Deref for Host {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Default for Host {
    fn default() -> Self {
        Self(Arc::from(DEFAULT_HOST))
    }
}
