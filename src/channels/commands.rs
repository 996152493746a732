//! Bot commands and the texts the bot replies with.

use crate::pipeline::{ProcessResult, StatsSnapshot};

pub const TEST_MESSAGE: &str = "Тестовое сообщение от бота автоответчика компании «Срубим»";

pub const REPLY_PROCESSED: &str = "✅ Заявка обработана и отправлен ответ клиенту";
pub const REPLY_PARTIAL: &str = "⚠️ Заявка обработана частично";
pub const REPLY_REJECTED: &str = "❌ Не удалось обработать заявку";

/// A recognised bot command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    /// `/start` or `/help`.
    Help,
    Stats,
    Health,
    /// `/test_whatsapp <phone>`; `None` when the phone is missing.
    TestWhatsapp(Option<String>),
}

impl BotCommand {
    /// Parse a message as a command. Accepts the `/cmd@botname` form.
    /// Unknown commands and plain text return `None`.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let rest = text.strip_prefix('/')?;
        let (head, args) = match rest.split_once(char::is_whitespace) {
            Some((head, args)) => (head, args.trim()),
            None => (rest, ""),
        };
        let name = head.split('@').next().unwrap_or(head);

        match name.to_ascii_lowercase().as_str() {
            "start" | "help" => Some(Self::Help),
            "stats" => Some(Self::Stats),
            "health" => Some(Self::Health),
            "test_whatsapp" => Some(Self::TestWhatsapp(
                (!args.is_empty()).then(|| args.to_string()),
            )),
            _ => None,
        }
    }
}

/// State of each integration, as shown by `/health` and the welcome text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthReport {
    /// `None` when WhatsApp is not configured, otherwise whether it is authorized.
    pub whatsapp: Option<bool>,
    /// `None` when the CRM is not configured, otherwise whether it holds a token.
    pub crm: Option<bool>,
    pub email_configured: bool,
}

impl HealthReport {
    pub fn render(&self) -> String {
        let whatsapp = match self.whatsapp {
            Some(true) => "✅ Green API WhatsApp - авторизован",
            Some(false) => "⚠️ Green API WhatsApp - не авторизован",
            None => "❌ Green API WhatsApp - не настроен",
        };
        let crm = match self.crm {
            Some(true) => "✅ Pyrus CRM - подключен",
            Some(false) => "⚠️ Pyrus CRM - не подключен",
            None => "❌ Pyrus CRM - не настроен",
        };
        let email = if self.email_configured {
            "✅ Email IMAP - настроен"
        } else {
            "❌ Email IMAP - не настроен"
        };
        format!("🟢 Бот работает нормально\n\n{whatsapp}\n{crm}\n{email}")
    }
}

fn mark(enabled: bool) -> &'static str {
    if enabled { "✅" } else { "❌" }
}

/// `/start` and `/help` text.
pub fn welcome_text(report: &HealthReport) -> String {
    format!(
        "🤖 Бот автоответчик строительной компании «Срубим»\n\n\
         Я автоматически обрабатываю заявки и отправляю ответы клиентам.\n\n\
         🔧 Интеграции:\n\
         ✅ Telegram Bot API\n\
         {} Green API (WhatsApp)\n\
         {} Pyrus CRM\n\
         {} Email (IMAP)\n\n\
         Команды:\n\
         /stats - Статистика работы\n\
         /health - Проверка состояния всех сервисов\n\
         /test_whatsapp <номер> - Тест отправки WhatsApp\n\
         /help - Эта помощь",
        mark(report.whatsapp.is_some()),
        mark(report.crm.is_some()),
        mark(report.email_configured),
    )
}

/// `/stats` text.
pub fn stats_text(snapshot: &StatsSnapshot, uptime: &str) -> String {
    format!(
        "📊 Статистика работы бота:\n\n\
         ✅ Обработано заявок: {}\n\
         📱 Отправлено WhatsApp: {}\n\
         💬 Передано менеджерам (Telegram): {}\n\
         📋 Создано задач в CRM: {}\n\
         ❌ Ошибок: {}\n\n\
         ⏰ Время работы: {uptime}",
        snapshot.processed_applications,
        snapshot.sent_whatsapp,
        snapshot.telegram_handoffs,
        snapshot.created_crm_tasks,
        snapshot.errors,
    )
}

/// Reply for a pipeline result. Non-applications get no reply.
pub fn result_reply(result: &ProcessResult) -> Option<&'static str> {
    match result {
        ProcessResult::NotApplication => None,
        ProcessResult::Rejected => Some(REPLY_REJECTED),
        ProcessResult::Dispatched { report, .. } if report.outcome.is_success() => {
            Some(REPLY_PROCESSED)
        }
        ProcessResult::Dispatched { .. } => Some(REPLY_PARTIAL),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lead::LeadRecord;
    use crate::pipeline::DispatchReport;

    #[test]
    fn parses_known_commands() {
        assert_eq!(BotCommand::parse("/start"), Some(BotCommand::Help));
        assert_eq!(BotCommand::parse("/help"), Some(BotCommand::Help));
        assert_eq!(BotCommand::parse("/stats"), Some(BotCommand::Stats));
        assert_eq!(BotCommand::parse(" /health "), Some(BotCommand::Health));
    }

    #[test]
    fn parses_command_addressed_to_bot() {
        assert_eq!(BotCommand::parse("/stats@srubim_bot"), Some(BotCommand::Stats));
    }

    #[test]
    fn test_whatsapp_takes_phone_argument() {
        assert_eq!(
            BotCommand::parse("/test_whatsapp +7 900 123-45-67"),
            Some(BotCommand::TestWhatsapp(Some("+7 900 123-45-67".into())))
        );
        assert_eq!(
            BotCommand::parse("/test_whatsapp"),
            Some(BotCommand::TestWhatsapp(None))
        );
    }

    #[test]
    fn plain_text_and_unknown_commands_are_not_commands() {
        assert_eq!(BotCommand::parse("Новая заявка № 1"), None);
        assert_eq!(BotCommand::parse("/unknown"), None);
        assert_eq!(BotCommand::parse(""), None);
    }

    #[test]
    fn health_lines_per_state() {
        let text = HealthReport {
            whatsapp: Some(false),
            crm: None,
            email_configured: true,
        }
        .render();
        assert!(text.contains("⚠️ Green API WhatsApp - не авторизован"));
        assert!(text.contains("❌ Pyrus CRM - не настроен"));
        assert!(text.contains("✅ Email IMAP - настроен"));
    }

    #[test]
    fn welcome_marks_configured_integrations() {
        let text = welcome_text(&HealthReport {
            whatsapp: Some(true),
            crm: None,
            email_configured: false,
        });
        assert!(text.contains("✅ Green API (WhatsApp)"));
        assert!(text.contains("❌ Pyrus CRM"));
        assert!(text.contains("/test_whatsapp <номер>"));
    }

    #[test]
    fn stats_lists_counters() {
        let snapshot = StatsSnapshot {
            processed_applications: 3,
            sent_whatsapp: 2,
            telegram_handoffs: 1,
            created_crm_tasks: 3,
            errors: 0,
        };
        let text = stats_text(&snapshot, "0д 1ч 5м");
        assert!(text.contains("Обработано заявок: 3"));
        assert!(text.contains("Отправлено WhatsApp: 2"));
        assert!(text.contains("Время работы: 0д 1ч 5м"));
    }

    #[test]
    fn replies_follow_outcome() {
        assert_eq!(result_reply(&ProcessResult::NotApplication), None);
        assert_eq!(result_reply(&ProcessResult::Rejected), Some(REPLY_REJECTED));

        let dispatched = |report: DispatchReport| ProcessResult::Dispatched {
            record: Box::new(LeadRecord::new("+79001234567")),
            report,
        };
        assert_eq!(
            result_reply(&dispatched(DispatchReport::skipped())),
            Some(REPLY_PROCESSED)
        );
        assert_eq!(
            result_reply(&dispatched(DispatchReport::failed(None))),
            Some(REPLY_PARTIAL)
        );
    }
}
