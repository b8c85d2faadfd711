//! Loading configuration files from disk
#![allow(clippy::unwrap_used)]

use std::io::Write;

use courier::{Config, ConfigError, Courier};
use courier_delivery::{MAX_ROTATING_ATTEMPTS, NotificationRequest, SelectionPolicy};

fn write_config(text: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_load_from_file() {
    let file = write_config(
        r#"
        [site]
        name = "Example"
        host = "example.com"

        [[servers]]
        id = "primary"
        host = "localhost"
        port = 2525
        security = "none"
        from_address = "mailer@example.com"
        "#,
    );

    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.site.name, "Example");
    assert_eq!(config.selection.policy, SelectionPolicy::RoundRobin);
    assert_eq!(config.servers[0].id, "primary");
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");

    assert!(matches!(
        Config::load(&path),
        Err(ConfigError::Io { path: p, .. }) if p == path
    ));
}

#[test]
fn test_malformed_file() {
    let file = write_config("[[servers]\nid = ");

    assert!(matches!(Config::load(file.path()), Err(ConfigError::Parse(_))));
}

#[test]
fn test_empty_sendmail_command_rejected() {
    let file = write_config("[sendmail]\ncommand = \"  \"\n");

    assert!(matches!(
        Config::load(file.path()),
        Err(ConfigError::Invalid(_))
    ));
}

#[tokio::test]
async fn test_unreachable_servers_fall_back_to_local_agent() {
    // Every configured server refuses connections and the local agent does
    // not exist, so the whole chain fails without erroring.
    let file = write_config(
        r#"
        [[servers]]
        id = "a"
        host = "localhost"
        port = 9
        security = "none"
        from_address = "a@example.com"
        timeout_secs = 2

        [[servers]]
        id = "b"
        host = "localhost"
        port = 9
        security = "none"
        from_address = "b@example.com"
        timeout_secs = 2

        [sendmail]
        command = "/nonexistent/courier-sendmail"
        timeout_secs = 2
        "#,
    );

    let config = Config::load(file.path()).unwrap();
    let courier = Courier::from_config(&config, Some("example.com".to_string())).unwrap();
    assert!(courier.registry.len() < MAX_ROTATING_ATTEMPTS);

    let sent = courier
        .coordinator
        .send(NotificationRequest::new("jane@example.com", "Hi", "Body"))
        .await;

    assert_eq!(sent, Ok(false));
    assert_eq!(
        courier
            .registry
            .usage()
            .usage_in_window(&courier_delivery::ServerId::from("a")),
        0
    );
}
