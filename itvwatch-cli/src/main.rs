//! One-shot checker: queries every configured ITV center and sends a Telegram
//! message when any of them has free appointments.
//!
//! Meant to be triggered from cron or a systemd timer. Settings come from the
//! environment, optionally seeded from a `.env` file in the working directory.

use std::io;
use std::sync::Arc;

use anyhow::{Context, Result};
use reqwest::Client;
use tracing::info;
use tracing_subscriber::EnvFilter;

use itvwatch_core::{
    config::Config,
    report::centers_label,
    service::{CheckService, RunOutcome},
};
use itvwatch_notify_telegram::TelegramNotifier;
use itvwatch_provider_tuv::TuvAvailabilityPort;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Existing variables take precedence over the file.
    dotenvy::dotenv().ok();
    init_logging();

    let config = Config::from_env().context("invalid configuration")?;
    info!(
        plate = %config.plate,
        centers = %centers_label(&config.centers),
        "checking ITV availability"
    );

    let availability = Arc::new(TuvAvailabilityPort::new(
        config.booking_url.clone(),
        config.user_agent.clone(),
    ));
    let notifier = Arc::new(TelegramNotifier::new(
        Client::builder()
            .user_agent(concat!("itvwatch/", env!("CARGO_PKG_VERSION")))
            .build()?,
        config.telegram_api_url.clone(),
        config.messaging.clone(),
    ));
    let service = CheckService::new(availability, notifier);

    let outcome = service
        .run(&config)
        .await
        .context("failed to deliver availability report")?;

    print_status(&outcome);

    Ok(())
}

fn init_logging() {
    // Logs go to stderr; stdout carries only the status line.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_err| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

#[expect(clippy::print_stdout, reason = "the status line is the command's output")]
fn print_status(outcome: &RunOutcome) {
    println!("{outcome}");
}
