//! Ingestion channels: the Telegram bot and the mailbox poller.

pub mod commands;
pub mod email;
pub mod email_poller;
pub mod telegram;

pub use email::{EmailConfig, FetchedEmail};
pub use email_poller::spawn_email_poller;
pub use telegram::{TelegramBot, TelegramConfig};
