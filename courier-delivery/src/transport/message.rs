//! Wire message construction shared by every transport

use lettre::{
    Message,
    message::{MultiPart, header::ContentType},
};

use crate::{error::TransportError, notification::NotificationRequest, types::MessageId};

/// Build the RFC 5322 message for `request`
///
/// The request must already carry a sending identity in `from`.
///
/// # Errors
///
/// If `from` is unset, an address fails to parse, or `lettre` rejects the
/// message.
pub fn build(request: &NotificationRequest, message_id: &MessageId) -> Result<Message, TransportError> {
    let from = request
        .from
        .clone()
        .ok_or_else(|| TransportError::Message("no sending identity set".to_string()))?;
    let to = request
        .recipient()
        .map_err(|e| TransportError::Message(e.to_string()))?;
    let reply_to = request
        .reply_to()
        .map_err(|e| TransportError::Message(e.to_string()))?;

    let mut builder = Message::builder()
        .message_id(Some(message_id.header_value()))
        .from(from)
        .to(to)
        .subject(request.subject.as_str());

    if let Some(reply_to) = reply_to {
        builder = builder.reply_to(reply_to);
    }

    let message = match &request.html_body {
        Some(html) => builder.multipart(MultiPart::alternative_plain_html(
            request.body.clone(),
            html.clone(),
        )),
        None => builder
            .header(ContentType::TEXT_PLAIN)
            .body(request.body.clone()),
    };

    message.map_err(|e| TransportError::Message(e.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use lettre::message::Mailbox;

    use super::*;

    fn request() -> NotificationRequest {
        let mut request =
            NotificationRequest::new("jane@example.com", "Reset your password", "Click the link");
        request.from = Some("Example <mailer@example.com>".parse::<Mailbox>().unwrap());
        request
    }

    fn formatted(message: &Message) -> String {
        String::from_utf8(message.formatted()).unwrap()
    }

    #[test]
    fn test_plain_message_headers() {
        let id = MessageId::from("abc@example.com");
        let message = build(&request(), &id).unwrap();
        let text = formatted(&message);

        assert!(text.contains("Message-ID: <abc@example.com>"));
        assert!(text.contains("From: Example <mailer@example.com>"));
        assert!(text.contains("To: jane@example.com"));
        assert!(text.contains("Subject: Reset your password"));
        assert!(text.contains("text/plain"));
        assert!(!text.contains("Reply-To"));
    }

    #[test]
    fn test_reply_to_from_sender_override() {
        let request = request().with_sender("support@example.com");
        let message = build(&request, &MessageId::generate("example.com")).unwrap();

        assert!(formatted(&message).contains("Reply-To: support@example.com"));
    }

    #[test]
    fn test_html_alternative() {
        let request = request().with_html("<p>Click the link</p>");
        let message = build(&request, &MessageId::generate("example.com")).unwrap();
        let text = formatted(&message);

        assert!(text.contains("multipart/alternative"));
        assert!(text.contains("text/html"));
    }

    #[test]
    fn test_missing_from_is_rejected() {
        let mut request = request();
        request.from = None;

        assert!(matches!(
            build(&request, &MessageId::generate("example.com")),
            Err(TransportError::Message(_))
        ));
    }
}
