//! WhatsApp delivery through Green API.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::MessengerError;
use crate::pipeline::types::MessageSink;

pub const DEFAULT_BASE_URL: &str = "https://api.green-api.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Green API instance credentials.
#[derive(Debug, Clone)]
pub struct GreenApiConfig {
    pub instance_id: String,
    pub api_token: SecretString,
    pub base_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StateResponse {
    state_instance: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendResponse {
    id_message: Option<String>,
}

/// Green API HTTP client.
pub struct GreenApiClient {
    config: GreenApiConfig,
    client: reqwest::Client,
}

impl GreenApiClient {
    pub fn new(config: GreenApiConfig) -> Result<Self, MessengerError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| {
                MessengerError::RequestFailed(format!("Failed to build HTTP client: {e}"))
            })?;
        Ok(Self { config, client })
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/waInstance{}/{method}/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.instance_id,
            self.config.api_token.expose_secret()
        )
    }

    /// Instance state as reported by Green API (e.g. `authorized`).
    pub async fn state(&self) -> Result<String, MessengerError> {
        let resp = self
            .client
            .get(self.method_url("getStateInstance"))
            .send()
            .await
            .map_err(|e| MessengerError::RequestFailed(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(MessengerError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            });
        }

        let data: StateResponse = resp
            .json()
            .await
            .map_err(|e| MessengerError::RequestFailed(e.to_string()))?;
        Ok(data.state_instance.unwrap_or_default())
    }
}

#[async_trait]
impl MessageSink for GreenApiClient {
    async fn send_message(&self, phone: &str, text: &str) -> Result<(), MessengerError> {
        let number = format_phone_number(phone)?;
        let body = serde_json::json!({
            "chatId": format!("{number}@c.us"),
            "message": text,
        });

        let resp = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&body)
            .send()
            .await
            .map_err(|e| MessengerError::RequestFailed(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(MessengerError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            });
        }

        let data: SendResponse = resp
            .json()
            .await
            .map_err(|e| MessengerError::RequestFailed(e.to_string()))?;

        match data.id_message {
            Some(id) if !id.is_empty() => {
                info!(chat = %number, message_id = %id, "WhatsApp message sent");
                Ok(())
            }
            _ => Err(MessengerError::Rejected(
                "response has no idMessage".to_string(),
            )),
        }
    }

    async fn is_authorized(&self) -> bool {
        match self.state().await {
            Ok(state) => {
                debug!(state = %state, "Green API instance state");
                state == "authorized"
            }
            Err(e) => {
                warn!(error = %e, "Green API state check failed");
                false
            }
        }
    }
}

/// Normalize a Russian phone number to the digits-only `7XXXXXXXXXX` form
/// Green API chat ids use.
pub fn format_phone_number(phone: &str) -> Result<String, MessengerError> {
    let cleaned: String = phone
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect();

    let digits = if let Some(rest) = cleaned.strip_prefix('8') {
        format!("7{rest}")
    } else if let Some(rest) = cleaned.strip_prefix('+') {
        rest.to_string()
    } else if cleaned.starts_with('7') {
        cleaned
    } else {
        format!("7{cleaned}")
    };

    let digits: String = digits.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() <= 1 {
        return Err(MessengerError::InvalidPhone(phone.to_string()));
    }
    Ok(digits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_common_phone_shapes() {
        assert_eq!(format_phone_number("+7 900 123-45-67").unwrap(), "79001234567");
        assert_eq!(format_phone_number("8 (900) 123-45-67").unwrap(), "79001234567");
        assert_eq!(format_phone_number("79001234567").unwrap(), "79001234567");
        assert_eq!(format_phone_number("9001234567").unwrap(), "79001234567");
    }

    #[test]
    fn rejects_phone_without_digits() {
        assert!(matches!(
            format_phone_number("n/a"),
            Err(MessengerError::InvalidPhone(_))
        ));
    }

    #[test]
    fn method_url_embeds_instance_and_token() {
        let client = GreenApiClient::new(GreenApiConfig {
            instance_id: "1101".into(),
            api_token: SecretString::from("tok"),
            base_url: "https://api.green-api.com/".into(),
        })
        .unwrap();
        assert_eq!(
            client.method_url("sendMessage"),
            "https://api.green-api.com/waInstance1101/sendMessage/tok"
        );
    }

    #[tokio::test]
    async fn unreachable_instance_is_not_authorized() {
        let client = GreenApiClient::new(GreenApiConfig {
            instance_id: "1".into(),
            api_token: SecretString::from("t"),
            base_url: "http://127.0.0.1:9".into(),
        })
        .unwrap();
        assert!(!client.is_authorized().await);
    }
}
