//! Mailbox poller: fetches unseen messages on an interval and runs each one
//! through the lead pipeline.
//!
//! Fetching happens in `spawn_blocking`; messages are already flagged
//! `\Seen` by the fetch, so a failed dispatch is never retried.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::channels::email::{EmailConfig, FetchedEmail, ImapError, fetch_unseen_imap};
use crate::pipeline::{LeadProcessor, ProcessResult};

/// A statistics line is logged every this many poll cycles.
const STATS_EVERY_CYCLES: u64 = 10;

/// Spawn a background task that polls IMAP every `interval`.
///
/// Returns a `JoinHandle` and a shutdown flag. Set the flag to stop polling.
pub fn spawn_email_poller(
    config: EmailConfig,
    interval: Duration,
    processor: Arc<LeadProcessor>,
) -> (JoinHandle<()>, Arc<AtomicBool>) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);

    let handle = tokio::spawn(async move {
        info!(
            host = %config.imap_host,
            mailbox = %config.username,
            interval_secs = interval.as_secs(),
            "Email poller started"
        );

        let mut tick = tokio::time::interval(interval);
        let mut cycle: u64 = 0;

        loop {
            tick.tick().await;

            if shutdown.load(Ordering::Relaxed) {
                info!("Email poller shutting down");
                return;
            }

            cycle += 1;
            poll_once(&config, &processor).await;

            if cycle % STATS_EVERY_CYCLES == 0 {
                let s = processor.stats().snapshot();
                info!(
                    cycle,
                    processed = s.processed_applications,
                    whatsapp_sent = s.sent_whatsapp,
                    telegram_handoffs = s.telegram_handoffs,
                    crm_tasks = s.created_crm_tasks,
                    errors = s.errors,
                    "Statistics"
                );
            }
        }
    });

    (handle, shutdown_flag)
}

/// Run a single poll cycle. Fetch failures are logged and counted as errors.
pub async fn poll_once(config: &EmailConfig, processor: &LeadProcessor) -> Vec<ProcessResult> {
    let cfg = config.clone();
    let fetched = tokio::task::spawn_blocking(move || fetch_unseen_imap(&cfg))
        .await
        .unwrap_or_else(|e| Err(ImapError::from(format!("poll task panicked: {e}"))));

    match fetched {
        Ok(messages) => process_messages(processor, messages).await,
        Err(e) => {
            error!(error = %e, "Email poll failed");
            processor.stats().record_error();
            Vec::new()
        }
    }
}

/// Hand fetched messages to the pipeline, in order.
pub async fn process_messages(
    processor: &LeadProcessor,
    messages: Vec<FetchedEmail>,
) -> Vec<ProcessResult> {
    if messages.is_empty() {
        return Vec::new();
    }
    debug!(count = messages.len(), "Fetched unseen emails");

    let mut results = Vec::with_capacity(messages.len());
    for email in messages {
        debug!(
            message_id = %email.message_id,
            sender = %email.sender,
            "Processing email"
        );
        results.push(processor.handle_text("email", &email.text()).await);
    }
    results
}
