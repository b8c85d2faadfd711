//! Notification payloads handed to the coordinator

use lettre::message::Mailbox;
use serde::{Deserialize, Serialize};

use crate::{error::NotificationError, types::TransportKind};

/// A transactional message to deliver
///
/// Built by the caller and passed by value into
/// [`DeliveryAttemptCoordinator::send`](crate::DeliveryAttemptCoordinator::send).
/// The coordinator only ever touches `from` (rewritten for each attempt) and
/// `transport` (set for the fallback attempt).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRequest {
    /// Recipient, either `user@host` or `Name <user@host>`
    pub to: String,
    pub subject: String,
    /// Plain-text body, always sent
    pub body: String,
    /// Optional HTML alternative
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_body: Option<String>,
    /// Address replies should go to, if not the sending identity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    /// Sending identity for the current attempt
    #[serde(skip)]
    pub from: Option<Mailbox>,
    /// Transport override for the current attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<TransportKind>,
}

impl NotificationRequest {
    #[must_use]
    pub fn new(to: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
            html_body: None,
            sender: None,
            from: None,
            transport: None,
        }
    }

    /// Attach an HTML alternative body
    #[must_use]
    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.html_body = Some(html.into());
        self
    }

    /// Route replies to `sender`
    #[must_use]
    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    /// Parsed recipient mailbox
    ///
    /// # Errors
    ///
    /// If the recipient is blank or not a valid mailbox.
    pub fn recipient(&self) -> Result<Mailbox, NotificationError> {
        let to = self.to.trim();
        if to.is_empty() {
            return Err(NotificationError::MissingRecipient);
        }

        parse_mailbox(to)
    }

    /// Parsed reply-to mailbox, if a sender override is present
    ///
    /// # Errors
    ///
    /// If the sender override is not a valid mailbox.
    pub fn reply_to(&self) -> Result<Option<Mailbox>, NotificationError> {
        self.sender
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(parse_mailbox)
            .transpose()
    }

    /// Check the request can be sent at all
    ///
    /// # Errors
    ///
    /// On a missing or malformed recipient, a malformed sender override, or
    /// when both subject and body are empty.
    pub fn validate(&self) -> Result<(), NotificationError> {
        self.recipient()?;
        self.reply_to()?;

        if self.subject.trim().is_empty()
            && self.body.trim().is_empty()
            && self.html_body.as_deref().is_none_or(|h| h.trim().is_empty())
        {
            return Err(NotificationError::EmptyMessage);
        }

        Ok(())
    }
}

fn parse_mailbox(raw: &str) -> Result<Mailbox, NotificationError> {
    raw.parse::<Mailbox>()
        .map_err(|e| NotificationError::InvalidAddress {
            address: raw.to_string(),
            reason: e.to_string(),
        })
}

/// Password reset notification
///
/// Renders the confirmation message a user receives after asking to reset
/// their password.
#[derive(Debug, Clone)]
pub struct PasswordReset {
    pub recipient: String,
    pub reset_url: String,
    pub site_name: String,
}

impl PasswordReset {
    #[must_use]
    pub fn new(
        recipient: impl Into<String>,
        reset_url: impl Into<String>,
        site_name: impl Into<String>,
    ) -> Self {
        Self {
            recipient: recipient.into(),
            reset_url: reset_url.into(),
            site_name: site_name.into(),
        }
    }

    #[must_use]
    pub fn subject(&self) -> String {
        format!("{}: password reset request", self.site_name)
    }

    #[must_use]
    pub fn body(&self) -> String {
        format!(
            "Hello,\r\n\
             \r\n\
             Someone requested a password reset for your {site} account.\r\n\
             To choose a new password, open the link below:\r\n\
             \r\n\
             {url}\r\n\
             \r\n\
             If you did not request this, you can ignore this message and your\r\n\
             password will stay the same.\r\n",
            site = self.site_name,
            url = self.reset_url,
        )
    }

    /// Build the request for the coordinator
    #[must_use]
    pub fn into_request(self) -> NotificationRequest {
        let subject = self.subject();
        let body = self.body();
        NotificationRequest::new(self.recipient, subject, body)
    }
}
