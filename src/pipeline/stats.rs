//! Usage counters shared by both ingestion paths.
//!
//! Injected as `Arc<Stats>`; every update is a single atomic increment.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

/// Live counters.
#[derive(Debug)]
pub struct Stats {
    processed_applications: AtomicU64,
    sent_whatsapp: AtomicU64,
    telegram_handoffs: AtomicU64,
    created_crm_tasks: AtomicU64,
    errors: AtomicU64,
    started_at: Instant,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub processed_applications: u64,
    pub sent_whatsapp: u64,
    pub telegram_handoffs: u64,
    pub created_crm_tasks: u64,
    pub errors: u64,
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Stats {
    pub fn new() -> Self {
        Self {
            processed_applications: AtomicU64::new(0),
            sent_whatsapp: AtomicU64::new(0),
            telegram_handoffs: AtomicU64::new(0),
            created_crm_tasks: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    pub fn record_processed(&self) {
        self.processed_applications.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_whatsapp_sent(&self) {
        self.sent_whatsapp.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_telegram_handoff(&self) {
        self.telegram_handoffs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_crm_task(&self) {
        self.created_crm_tasks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            processed_applications: self.processed_applications.load(Ordering::Relaxed),
            sent_whatsapp: self.sent_whatsapp.load(Ordering::Relaxed),
            telegram_handoffs: self.telegram_handoffs.load(Ordering::Relaxed),
            created_crm_tasks: self.created_crm_tasks.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Uptime as `"{days}д {hours}ч {minutes}м"`.
    pub fn uptime_label(&self) -> String {
        format_uptime(self.uptime())
    }
}

pub fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3600;
    let minutes = (secs % 3600) / 60;
    format!("{days}д {hours}ч {minutes}м")
}
