//! One-shot run binary: load configuration, process every account, exit
//! non-zero when anything failed. Scheduling (cron, timers) lives outside.

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use seatguard_application::{
    AccountOrchestrator, Authenticator, ConfirmationWorkflow, LogSink, ReservationHarvester,
    RunState,
};
use seatguard_core::event::NotificationSink;
use seatguard_core::profile::PortalProfile;
use seatguard_infrastructure::paths::SeatguardPaths;
use seatguard_infrastructure::{ConfigService, FileSessionStore};
use seatguard_interaction::{HttpOtpChannel, WebDriverFactory};

#[derive(Parser)]
#[command(name = "seatguard")]
#[command(about = "Confirms rail reservations before the portal deadline", long_about = None)]
struct Cli {
    /// Configuration file (default: ~/.config/seatguard/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Secret file (default: ~/.config/seatguard/secret.json)
    #[arg(long)]
    secret: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => SeatguardPaths::config_file().map_err(|e| anyhow!("{e}"))?,
    };
    let secret_path = match cli.secret {
        Some(path) => path,
        None => SeatguardPaths::secret_file().map_err(|e| anyhow!("{e}"))?,
    };

    // Configuration problems are fatal before anything runs.
    let config = ConfigService::with_paths(config_path, secret_path)
        .load()
        .context("Invalid configuration")?;

    let profile = PortalProfile::default();
    let store = Arc::new(FileSessionStore::default_location()?);
    let sink: Arc<dyn NotificationSink> = Arc::new(LogSink);
    let otp = Arc::new(HttpOtpChannel::new(
        config.relay.url.clone(),
        config.relay.secret.clone(),
    ));
    let factory = Arc::new(WebDriverFactory::new(
        config.browser.webdriver_url.clone(),
        config.browser.headless,
    ));

    let authenticator = Authenticator::new(
        store.clone(),
        otp,
        sink.clone(),
        profile.clone(),
        config.relay.timeout(),
        config.relay.poll_interval(),
        config.browser.screenshots_dir.clone(),
    );
    let harvester = ReservationHarvester::new(profile.clone());
    let workflow = ConfirmationWorkflow::new(
        sink.clone(),
        profile,
        config.browser.screenshots_dir.clone(),
    );

    let orchestrator = AccountOrchestrator::new(
        factory,
        store,
        sink,
        authenticator,
        harvester,
        workflow,
    );

    let mut state = RunState::new();
    let results = orchestrator.run(&mut state, &config.accounts).await?;

    let troubled = results
        .iter()
        .filter(|r| r.error.is_some() || r.failed > 0)
        .count();
    if troubled > 0 {
        tracing::warn!("{troubled} account(s) had failures this run");
        std::process::exit(1);
    }
    Ok(())
}
