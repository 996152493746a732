//! Telegram bot: long-polls the Bot API for updates.
//!
//! Commands are answered directly; every other text goes through the lead
//! pipeline and gets a short status reply when it was an application.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::channels::commands::{
    BotCommand, HealthReport, TEST_MESSAGE, result_reply, stats_text, welcome_text,
};
use crate::error::ChannelError;
use crate::pipeline::LeadProcessor;

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Long-poll wait passed to getUpdates.
const POLL_TIMEOUT_SECS: u64 = 30;

/// Pause after a failed poll.
const RETRY_DELAY: Duration = Duration::from_secs(5);

// ── Configuration ───────────────────────────────────────────────────

/// Bot credentials and access list.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
    /// Usernames or numeric ids; `*` allows everyone.
    pub allowed_users: Vec<String>,
    pub api_base: String,
}

impl TelegramConfig {
    /// Returns `None` unless `TELEGRAM_BOT_TOKEN` is set.
    pub fn from_lookup(get: &dyn Fn(&str) -> Option<String>) -> Option<Self> {
        let bot_token = get("TELEGRAM_BOT_TOKEN")?;
        let allowed_users: Vec<String> = get("TELEGRAM_ALLOWED_USERS")
            .unwrap_or_else(|| "*".to_string())
            .split(',')
            .map(|s| s.trim().trim_start_matches('@').to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Some(Self {
            bot_token: SecretString::from(bot_token),
            allowed_users,
            api_base: DEFAULT_API_BASE.to_string(),
        })
    }
}

// ── Updates ─────────────────────────────────────────────────────────

/// The parts of a text message update the bot uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingText {
    pub update_id: i64,
    pub chat_id: i64,
    pub message_id: i64,
    pub username: Option<String>,
    pub user_id: Option<i64>,
    pub text: String,
}

impl IncomingText {
    /// Identities checked against the allowlist: username and numeric id.
    fn identities(&self) -> Vec<String> {
        let mut ids = Vec::with_capacity(2);
        if let Some(name) = &self.username {
            ids.push(name.clone());
        }
        if let Some(id) = self.user_id {
            ids.push(id.to_string());
        }
        ids
    }
}

/// Parse one update. Non-message and non-text updates yield `None`.
pub fn parse_update(update: &serde_json::Value) -> Option<IncomingText> {
    let update_id = update.get("update_id")?.as_i64()?;
    let message = update.get("message")?;
    let text = message.get("text")?.as_str()?;
    let chat_id = message.get("chat")?.get("id")?.as_i64()?;
    let from = message.get("from");

    Some(IncomingText {
        update_id,
        chat_id,
        message_id: message
            .get("message_id")
            .and_then(serde_json::Value::as_i64)
            .unwrap_or_default(),
        username: from
            .and_then(|f| f.get("username"))
            .and_then(serde_json::Value::as_str)
            .map(String::from),
        user_id: from
            .and_then(|f| f.get("id"))
            .and_then(serde_json::Value::as_i64),
        text: text.to_string(),
    })
}

// ── Bot ─────────────────────────────────────────────────────────────

/// Telegram bot bound to the shared lead processor.
pub struct TelegramBot {
    config: TelegramConfig,
    client: reqwest::Client,
    processor: Arc<LeadProcessor>,
    email_configured: bool,
}

impl TelegramBot {
    pub fn new(
        config: TelegramConfig,
        processor: Arc<LeadProcessor>,
        email_configured: bool,
    ) -> Result<Self, ChannelError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(POLL_TIMEOUT_SECS + 10))
            .build()
            .map_err(|e| ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            config,
            client,
            processor,
            email_configured,
        })
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{method}",
            self.config.api_base.trim_end_matches('/'),
            self.config.bot_token.expose_secret()
        )
    }

    /// Check if any of the provided identities is allowed.
    pub fn is_any_user_allowed<'a, I>(&self, identities: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        check_user_allowed(&self.config.allowed_users, identities)
    }

    /// Verify the token with `getMe`.
    pub async fn check_connection(&self) -> Result<(), ChannelError> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::Http(e.to_string()))?;

        if resp.status().is_success() {
            Ok(())
        } else {
            warn!(status = %resp.status(), "Telegram getMe failed");
            Err(ChannelError::HealthCheckFailed {
                name: "telegram".into(),
            })
        }
    }

    /// Live state of every integration.
    pub async fn health_report(&self) -> HealthReport {
        let channels = self.processor.dispatcher().channels();
        let whatsapp = match &channels.messenger {
            Some(m) => Some(m.is_authorized().await),
            None => None,
        };
        let crm = match &channels.crm {
            Some(c) if c.form_id != 0 => Some(c.sink.is_connected().await),
            _ => None,
        };
        HealthReport {
            whatsapp,
            crm,
            email_configured: self.email_configured,
        }
    }

    /// Which integrations are configured, without probing them.
    fn configured_integrations(&self) -> HealthReport {
        let channels = self.processor.dispatcher().channels();
        HealthReport {
            whatsapp: channels.messenger.as_ref().map(|_| true),
            crm: channels
                .crm
                .as_ref()
                .filter(|c| c.form_id != 0)
                .map(|_| true),
            email_configured: self.email_configured,
        }
    }

    /// Reply for one incoming text, or `None` when the bot stays silent.
    pub async fn handle_text(&self, text: &str) -> Option<String> {
        match BotCommand::parse(text) {
            Some(BotCommand::Help) => Some(welcome_text(&self.configured_integrations())),
            Some(BotCommand::Stats) => {
                let stats = self.processor.stats();
                Some(stats_text(&stats.snapshot(), &stats.uptime_label()))
            }
            Some(BotCommand::Health) => Some(self.health_report().await.render()),
            Some(BotCommand::TestWhatsapp(phone)) => Some(self.test_whatsapp(phone).await),
            None => {
                let result = self.processor.handle_text("telegram", text).await;
                result_reply(&result).map(String::from)
            }
        }
    }

    async fn test_whatsapp(&self, phone: Option<String>) -> String {
        let Some(phone) = phone else {
            return "❌ Укажите номер телефона: /test_whatsapp +79001234567".to_string();
        };
        let Some(messenger) = self.processor.dispatcher().channels().messenger.as_ref() else {
            return "❌ Green API не настроен".to_string();
        };

        match messenger.send_message(&phone, TEST_MESSAGE).await {
            Ok(()) => format!("✅ Тестовое сообщение отправлено на {phone}"),
            Err(e) => {
                warn!(error = %e, "Test WhatsApp message failed");
                format!("❌ Не удалось отправить сообщение на {phone}")
            }
        }
    }

    /// Send a plain-text reply, split to Telegram's length limit.
    async fn send_reply(
        &self,
        chat_id: i64,
        reply_to: Option<i64>,
        text: &str,
    ) -> Result<(), ChannelError> {
        for (i, chunk) in split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH)
            .iter()
            .enumerate()
        {
            let mut body = serde_json::json!({
                "chat_id": chat_id,
                "text": chunk,
            });
            if i == 0
                && let Some(id) = reply_to
            {
                body["reply_to_message_id"] = serde_json::json!(id);
            }

            let resp = self
                .client
                .post(self.api_url("sendMessage"))
                .json(&body)
                .send()
                .await
                .map_err(|e| ChannelError::SendFailed {
                    name: "telegram".into(),
                    reason: e.to_string(),
                })?;

            if !resp.status().is_success() {
                let status = resp.status();
                let err = resp.text().await.unwrap_or_default();
                return Err(ChannelError::SendFailed {
                    name: "telegram".into(),
                    reason: format!("sendMessage returned {status}: {err}"),
                });
            }
        }
        Ok(())
    }

    /// One getUpdates call.
    async fn fetch_updates(&self, offset: i64) -> Result<Vec<serde_json::Value>, ChannelError> {
        let body = serde_json::json!({
            "offset": offset,
            "timeout": POLL_TIMEOUT_SECS,
            "allowed_updates": ["message"]
        });

        let resp = self
            .client
            .post(self.api_url("getUpdates"))
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::Http(e.to_string()))?;

        let data: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ChannelError::InvalidMessage(e.to_string()))?;

        if data.get("ok").and_then(serde_json::Value::as_bool) != Some(true) {
            return Err(ChannelError::InvalidMessage(format!(
                "getUpdates not ok: {}",
                data.get("description")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("no description")
            )));
        }

        Ok(data
            .get("result")
            .and_then(serde_json::Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    async fn handle_incoming(&self, incoming: &IncomingText) {
        let identities = incoming.identities();
        if !self.is_any_user_allowed(identities.iter().map(String::as_str)) {
            warn!(
                username = incoming.username.as_deref().unwrap_or("unknown"),
                user_id = incoming.user_id.unwrap_or_default(),
                "Telegram: ignoring message from unauthorized user"
            );
            return;
        }

        debug!(
            chat_id = incoming.chat_id,
            username = incoming.username.as_deref().unwrap_or("unknown"),
            "Telegram message received"
        );

        if let Some(reply) = self.handle_text(&incoming.text).await
            && let Err(e) = self
                .send_reply(incoming.chat_id, Some(incoming.message_id), &reply)
                .await
        {
            warn!(error = %e, "Telegram reply failed");
        }
    }

    /// Long-poll until the shutdown flag is set.
    pub async fn run(&self, shutdown: Arc<AtomicBool>) {
        let mut offset: i64 = 0;
        info!("Telegram bot listening for messages");

        while !shutdown.load(Ordering::Relaxed) {
            let updates = match self.fetch_updates(offset).await {
                Ok(updates) => updates,
                Err(e) => {
                    warn!(error = %e, "Telegram poll error");
                    tokio::time::sleep(RETRY_DELAY).await;
                    continue;
                }
            };

            for update in &updates {
                if let Some(uid) = update.get("update_id").and_then(serde_json::Value::as_i64) {
                    offset = uid + 1;
                }
                if let Some(incoming) = parse_update(update) {
                    self.handle_incoming(&incoming).await;
                }
            }
        }

        info!("Telegram bot shutting down");
    }

    /// Spawn `run` on the runtime.
    pub fn spawn(self: Arc<Self>) -> (JoinHandle<()>, Arc<AtomicBool>) {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let handle = tokio::spawn(async move { self.run(shutdown).await });
        (handle, flag)
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Check if any identity in the iterator matches the allowed users list.
fn check_user_allowed<'a>(
    allowed_users: &[String],
    identities: impl IntoIterator<Item = &'a str>,
) -> bool {
    let ids: Vec<&str> = identities.into_iter().collect();
    allowed_users
        .iter()
        .any(|u| u == "*" || ids.contains(&u.as_str()))
}

/// Split a message into chunks that fit Telegram's limit (in bytes, never
/// inside a UTF-8 character). Tries newlines, then spaces, then hard-cuts.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let mut limit = max_len;
        while !remaining.is_char_boundary(limit) {
            limit -= 1;
        }

        let chunk = &remaining[..limit];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(limit);

        // Don't split at position 0 (infinite loop guard)
        let split_at = if split_at == 0 { limit } else { split_at };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

// ── Tests ───────────────────────────────────────────────────────────
