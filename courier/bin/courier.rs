//! Command-line front end for sending transactional notifications
//!
//! - `reset`: send the password reset notification
//! - `send`: send an arbitrary notification
//! - `check`: validate the configuration and list the outbound servers

#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use courier::{Config, Courier, DEFAULT_CONFIG_PATH};
use courier_common::{Host, audit, logging};
use courier_delivery::{MAX_ROTATING_ATTEMPTS, NotificationRequest, PasswordReset};

/// Send transactional notifications with server failover
#[derive(Parser, Debug)]
#[command(name = "courier")]
#[command(about = "Send transactional notifications with server failover", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "COURIER_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Send the password reset notification
    Reset {
        /// Recipient address
        #[arg(long)]
        to: String,

        /// Link the recipient follows to choose a new password
        #[arg(long)]
        url: String,

        /// Host the reset was requested from (defaults to the configured site host)
        #[arg(long)]
        host: Option<String>,
    },
    /// Send an arbitrary notification
    Send {
        /// Recipient address
        #[arg(long)]
        to: String,

        #[arg(long)]
        subject: String,

        /// Plain-text body
        #[arg(long)]
        body: String,

        /// Optional HTML alternative body
        #[arg(long)]
        html: Option<String>,

        /// Address replies should go to
        #[arg(long)]
        reply_to: Option<String>,

        /// Host the notification was triggered from
        #[arg(long)]
        host: Option<String>,
    },
    /// Validate the configuration and list the outbound servers
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)
        .map_err(|e| anyhow::anyhow!("{}: {e}", cli.config.display()))?;
    audit::init(config.audit.clone());

    match cli.command {
        Commands::Reset { to, url, host } => {
            let request = PasswordReset::new(to, url, config.site.name.clone()).into_request();
            cmd_send(&config, request, host).await
        }
        Commands::Send {
            to,
            subject,
            body,
            html,
            reply_to,
            host,
        } => {
            let mut request = NotificationRequest::new(to, subject, body);
            if let Some(html) = html {
                request = request.with_html(html);
            }
            if let Some(reply_to) = reply_to {
                request = request.with_sender(reply_to);
            }
            cmd_send(&config, request, host).await
        }
        Commands::Check => cmd_check(&config, &cli.config),
    }
}

async fn cmd_send(
    config: &Config,
    request: NotificationRequest,
    host: Option<String>,
) -> anyhow::Result<()> {
    let courier = Courier::from_config(config, host)?;
    let recipient = request.to.clone();

    if courier.coordinator.send(request).await? {
        println!("Notification sent to {recipient}");
        Ok(())
    } else {
        anyhow::bail!("Notification to {recipient} could not be delivered")
    }
}

fn cmd_check(config: &Config, path: &std::path::Path) -> anyhow::Result<()> {
    let courier = Courier::from_config(config, None)?;

    println!("Configuration: {}", path.display());
    println!("Site: {}", config.site.name);
    println!(
        "Fallback sender: {}",
        Host::from_context(config.site.host.as_deref()).noreply_address()
    );
    println!("Selection: {}", courier.registry.policy());
    println!("Rotating attempts: {MAX_ROTATING_ATTEMPTS}");
    println!("Fallback command: {}", courier.sendmail.command());
    println!();

    if courier.registry.is_empty() {
        println!("No outbound servers configured, every notification uses the fallback");
        return Ok(());
    }

    println!(
        "{:<16} {:<32} {:<8} {:<10}",
        "ID", "FROM", "WEIGHT", "QUOTA/H"
    );
    println!("{}", "-".repeat(68));

    for entry in courier.registry.servers() {
        let quota = entry
            .hourly_quota
            .map_or_else(|| "-".to_string(), |quota| quota.to_string());
        println!(
            "{:<16} {:<32} {:<8} {:<10}",
            entry.server.id().to_string(),
            entry.server.from_address().to_string(),
            entry.weight,
            quota
        );
    }

    println!("\nTotal: {} server(s)", courier.registry.len());
    Ok(())
}
