//! Configuration types.
//!
//! Everything comes from environment variables (optionally loaded from a
//! `.env` file by the binary). Each integration is enabled by its own group
//! of variables; a missing group disables it and shows up in `warnings()`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::channels::email::EmailConfig;
use crate::channels::telegram::TelegramConfig;
use crate::crm::pyrus::{self, PyrusConfig};
use crate::error::ConfigError;
use crate::lead::Vocabulary;
use crate::messenger::green_api::{self, GreenApiConfig};
use crate::pipeline::{MessageTemplates, TelegramHandoff};

const DEFAULT_CHECK_INTERVAL_SECS: u64 = 60;

/// Keyword vocabulary and reply templates, overridable from a JSON file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeadProfile {
    pub vocabulary: Vocabulary,
    pub templates: MessageTemplates,
}

impl LeadProfile {
    /// Load a profile from JSON. Missing sections keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map_err(|e| ConfigError::ParseError(format!("{}: {e}", path.display())))
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub telegram: Option<TelegramConfig>,
    pub email: Option<EmailConfig>,
    pub green_api: Option<GreenApiConfig>,
    pub pyrus: Option<PyrusConfig>,
    /// Mailbox poll interval.
    pub check_interval: Duration,
    pub debug: bool,
    pub profile_path: Option<PathBuf>,
    pub telegram_handoff: TelegramHandoff,
}

impl AppConfig {
    /// Build config from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let check_interval_secs = match get("CHECK_INTERVAL") {
            Some(v) => parse_number::<u64>("CHECK_INTERVAL", &v)?,
            None => DEFAULT_CHECK_INTERVAL_SECS,
        };
        if check_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "CHECK_INTERVAL".into(),
                message: "must be greater than zero".into(),
            });
        }

        let telegram_handoff = match get("TELEGRAM_HANDOFF").as_deref() {
            None => TelegramHandoff::default(),
            Some(v) if v.eq_ignore_ascii_case("unsupported") => TelegramHandoff::Unsupported,
            Some(v) if v.eq_ignore_ascii_case("count_as_sent") => TelegramHandoff::CountAsSent,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "TELEGRAM_HANDOFF".into(),
                    message: format!("expected 'unsupported' or 'count_as_sent', got '{other}'"),
                });
            }
        };

        Ok(Self {
            telegram: TelegramConfig::from_lookup(&get),
            email: EmailConfig::from_lookup(&get)?,
            green_api: green_api_config(&get),
            pyrus: pyrus_config(&get)?,
            check_interval: Duration::from_secs(check_interval_secs),
            debug: get("DEBUG").is_some_and(|v| parse_flag(&v)),
            profile_path: get("LEAD_PROFILE_PATH").map(PathBuf::from),
            telegram_handoff,
        })
    }

    /// At least one ingestion path must be enabled for the bot to do anything.
    pub fn ensure_ingestion(&self) -> Result<(), ConfigError> {
        if self.telegram.is_none() && self.email.is_none() {
            return Err(ConfigError::MissingEnvVar(
                "TELEGRAM_BOT_TOKEN or EMAIL_USERNAME/EMAIL_PASSWORD".to_string(),
            ));
        }
        Ok(())
    }

    /// Lead profile from `LEAD_PROFILE_PATH`, or the built-in one.
    pub fn lead_profile(&self) -> Result<LeadProfile, ConfigError> {
        match &self.profile_path {
            Some(path) => LeadProfile::load(path),
            None => Ok(LeadProfile::default()),
        }
    }

    /// Human-readable notes about disabled integrations.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.telegram.is_none() {
            warnings.push("TELEGRAM_BOT_TOKEN not set, Telegram bot disabled".to_string());
        }
        if self.email.is_none() {
            warnings.push(
                "EMAIL_USERNAME/EMAIL_PASSWORD not set, mailbox polling disabled".to_string(),
            );
        }
        if self.green_api.is_none() {
            warnings.push(
                "GREEN_API_INSTANCE_ID/GREEN_API_TOKEN not set, WhatsApp replies disabled"
                    .to_string(),
            );
        }
        match &self.pyrus {
            None => warnings.push(
                "PYRUS_LOGIN/PYRUS_SECURITY_KEY not set, CRM tasks disabled".to_string(),
            ),
            Some(p) if p.form_id == 0 => {
                warnings.push("PYRUS_FORM_ID not set, CRM tasks disabled".to_string())
            }
            Some(_) => {}
        }
        warnings
    }
}

fn green_api_config(get: &dyn Fn(&str) -> Option<String>) -> Option<GreenApiConfig> {
    let instance_id = get("GREEN_API_INSTANCE_ID")?;
    let api_token = get("GREEN_API_TOKEN")?;
    Some(GreenApiConfig {
        instance_id,
        api_token: SecretString::from(api_token),
        base_url: get("GREEN_API_BASE_URL")
            .unwrap_or_else(|| green_api::DEFAULT_BASE_URL.to_string()),
    })
}

fn pyrus_config(
    get: &dyn Fn(&str) -> Option<String>,
) -> Result<Option<PyrusConfig>, ConfigError> {
    let (Some(login), Some(security_key)) = (get("PYRUS_LOGIN"), get("PYRUS_SECURITY_KEY")) else {
        return Ok(None);
    };
    let form_id = match get("PYRUS_FORM_ID") {
        Some(v) => parse_number::<u64>("PYRUS_FORM_ID", &v)?,
        None => 0,
    };
    Ok(Some(PyrusConfig {
        login,
        security_key: SecretString::from(security_key),
        form_id,
        base_url: get("PYRUS_BASE_URL").unwrap_or_else(|| pyrus::DEFAULT_BASE_URL.to_string()),
    }))
}

pub(crate) fn parse_number<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("'{value}': {e}"),
    })
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
