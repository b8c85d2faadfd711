//! Value types shared by the coordinator, registry and transports

use std::{
    collections::HashSet,
    fmt::{self, Display},
    sync::Arc,
};

use serde::{Deserialize, Serialize};

use crate::error::TransportError;

/// Identifier of a configured outbound server
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerId(Arc<str>);

impl ServerId {
    #[must_use]
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ServerId {
    fn from(s: &str) -> Self {
        Self(Arc::from(s))
    }
}

impl From<String> for ServerId {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

/// `Message-ID` assigned to a message, without the angle brackets
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Generate a fresh `<ulid>@<host>` identifier
    #[must_use]
    pub fn generate(host: &str) -> Self {
        Self(format!("{}@{host}", ulid::Ulid::new()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Header form, wrapped in angle brackets
    #[must_use]
    pub fn header_value(&self) -> String {
        format!("<{}>", self.0)
    }
}

impl Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.trim_start_matches('<').trim_end_matches('>').to_string())
    }
}

/// How a message leaves the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    /// Remote SMTP relay
    #[default]
    Smtp,
    /// Local mail agent invoked as a process
    Sendmail,
}

impl Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Smtp => f.write_str("smtp"),
            Self::Sendmail => f.write_str("sendmail"),
        }
    }
}

/// What an outbound server can do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServerCapabilities {
    /// Whether inline images may be embedded in messages sent through it
    pub can_embed_images: bool,
    /// The mechanism used by the server
    pub transport: TransportKind,
}

/// Result of a single delivery attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Accepted for delivery
    Sent(MessageId),
    /// Not accepted; the reason only feeds logging and health tracking
    Failed(TransportError),
}

impl AttemptOutcome {
    #[must_use]
    pub const fn is_sent(&self) -> bool {
        matches!(self, Self::Sent(_))
    }
}

/// Servers already tried during one `send` call
///
/// Owned by a single call and never shared. [`ExclusionSet::last`] is the
/// server whose failure triggered the current pick.
#[derive(Debug, Clone, Default)]
pub struct ExclusionSet {
    tried: HashSet<ServerId>,
    last: Option<ServerId>,
}

impl ExclusionSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a server as tried
    pub fn insert(&mut self, id: ServerId) {
        self.tried.insert(id.clone());
        self.last = Some(id);
    }

    #[must_use]
    pub fn contains(&self, id: &ServerId) -> bool {
        self.tried.contains(id)
    }

    /// The most recently tried server
    #[must_use]
    pub const fn last(&self) -> Option<&ServerId> {
        self.last.as_ref()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tried.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tried.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServerId> {
        self.tried.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exclusion_set_tracks_last() {
        let mut excluded = ExclusionSet::new();
        assert!(excluded.is_empty());
        assert_eq!(excluded.last(), None);

        excluded.insert(ServerId::from("a"));
        excluded.insert(ServerId::from("b"));

        assert_eq!(excluded.len(), 2);
        assert!(excluded.contains(&ServerId::from("a")));
        assert_eq!(excluded.last(), Some(&ServerId::from("b")));
    }

    #[test]
    fn test_message_id_forms() {
        let id = MessageId::generate("example.com");
        assert!(id.as_str().ends_with("@example.com"));
        assert_eq!(id.header_value(), format!("<{id}>"));

        let parsed = MessageId::from("<abc@example.com>");
        assert_eq!(parsed.as_str(), "abc@example.com");
    }

    #[test]
    fn test_transport_kind_serde_names() {
        assert_eq!(TransportKind::Smtp.to_string(), "smtp");
        assert_eq!(TransportKind::Sendmail.to_string(), "sendmail");
    }
}
