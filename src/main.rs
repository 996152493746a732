use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};

use lead_responder::bootstrap::{Collaborators, build_processor};
use lead_responder::channels::{TelegramBot, spawn_email_poller};
use lead_responder::config::AppConfig;
use lead_responder::pipeline::Stats;
use lead_responder::telemetry::{self, LOG_DIR};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    // A missing .env file is fine; variables may come from the environment.
    let dotenv = dotenvy::dotenv();

    let config = AppConfig::from_env().context("Invalid configuration")?;
    let _log_guard = telemetry::init_telemetry(Path::new(LOG_DIR), config.debug)
        .context("Failed to initialise logging")?;

    match dotenv {
        Ok(path) => info!(path = %path.display(), "Loaded environment file"),
        Err(e) if e.not_found() => {}
        Err(e) => warn!(error = %e, "Failed to read .env file"),
    }

    info!(version = env!("CARGO_PKG_VERSION"), "Lead responder starting");
    for warning in config.warnings() {
        warn!("{warning}");
    }
    config.ensure_ingestion()?;

    let collaborators = Collaborators::from_config(&config)?;
    collaborators.probe().await;

    let stats = Arc::new(Stats::new());
    let processor = Arc::new(build_processor(&config, &collaborators, Arc::clone(&stats))?);

    // ── Telegram ─────────────────────────────────────────────────────────
    let telegram = match &config.telegram {
        Some(tg) => {
            let bot = TelegramBot::new(tg.clone(), Arc::clone(&processor), config.email.is_some())?;
            if let Err(e) = bot.check_connection().await {
                warn!(error = %e, "Telegram token check failed");
            }
            Some(Arc::new(bot).spawn())
        }
        None => None,
    };

    // ── Mailbox ──────────────────────────────────────────────────────────
    let poller = config.email.as_ref().map(|email| {
        spawn_email_poller(email.clone(), config.check_interval, Arc::clone(&processor))
    });

    info!("Lead responder running, press Ctrl-C to stop");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl-C");
    }

    info!("Shutting down");
    for (handle, flag) in [telegram, poller].into_iter().flatten() {
        flag.store(true, std::sync::atomic::Ordering::Relaxed);
        handle.abort();
    }

    let s = stats.snapshot();
    info!(
        processed = s.processed_applications,
        whatsapp_sent = s.sent_whatsapp,
        telegram_handoffs = s.telegram_handoffs,
        crm_tasks = s.created_crm_tasks,
        errors = s.errors,
        uptime = %stats.uptime_label(),
        "Final statistics"
    );

    Ok(())
}
