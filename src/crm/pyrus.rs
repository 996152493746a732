//! Pyrus CRM client.
//!
//! Authenticates with login + security key and creates form tasks. The
//! access token is shared between the Telegram and mailbox paths, so it
//! lives behind an `RwLock`; a refresh takes the write lock and skips the
//! round-trip when another caller already replaced the stale token.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::error::CrmError;
use crate::pipeline::types::{CrmField, CrmSink};

pub const DEFAULT_BASE_URL: &str = "https://api.pyrus.com/v4";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Pyrus connection settings.
#[derive(Debug, Clone)]
pub struct PyrusConfig {
    pub login: String,
    pub security_key: SecretString,
    /// Form new tasks are created on. `0` disables the CRM step.
    pub form_id: u64,
    pub base_url: String,
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateTaskResponse {
    task: Option<TaskRef>,
}

#[derive(Debug, Deserialize)]
struct TaskRef {
    id: serde_json::Value,
}

/// Pyrus REST client.
pub struct PyrusClient {
    config: PyrusConfig,
    client: reqwest::Client,
    token: RwLock<Option<SecretString>>,
}

impl PyrusClient {
    pub fn new(config: PyrusConfig) -> Result<Self, CrmError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| CrmError::RequestFailed(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            config,
            client,
            token: RwLock::new(None),
        })
    }

    pub fn form_id(&self) -> u64 {
        self.config.form_id
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/{path}", self.config.base_url.trim_end_matches('/'))
    }

    /// Fetch a fresh access token and store it.
    pub async fn authenticate(&self) -> Result<(), CrmError> {
        let token = self.request_token().await?;
        *self.token.write().await = Some(token);
        info!("Authenticated with Pyrus CRM");
        Ok(())
    }

    async fn request_token(&self) -> Result<SecretString, CrmError> {
        let body = serde_json::json!({
            "login": self.config.login,
            "security_key": self.config.security_key.expose_secret(),
        });

        let resp = self
            .client
            .post(self.api_url("auth"))
            .json(&body)
            .send()
            .await
            .map_err(|e| CrmError::RequestFailed(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            error!(status = status.as_u16(), "Pyrus authentication failed");
            return Err(CrmError::AuthFailed {
                status: status.as_u16(),
            });
        }

        let data: AuthResponse = resp
            .json()
            .await
            .map_err(|e| CrmError::InvalidResponse(e.to_string()))?;

        data.access_token
            .filter(|t| !t.is_empty())
            .map(SecretString::from)
            .ok_or_else(|| CrmError::InvalidResponse("auth response has no access_token".into()))
    }

    /// Current token, authenticating first when there is none.
    async fn current_token(&self) -> Result<String, CrmError> {
        if let Some(token) = self.token.read().await.as_ref() {
            return Ok(token.expose_secret().to_string());
        }
        self.refresh_token(None).await
    }

    /// Replace `stale` with a new token. If the stored token already differs
    /// from `stale`, another caller refreshed it and that token is returned.
    async fn refresh_token(&self, stale: Option<&str>) -> Result<String, CrmError> {
        let mut guard = self.token.write().await;
        if let Some(current) = guard.as_ref() {
            let current = current.expose_secret();
            if stale != Some(current) {
                return Ok(current.to_string());
            }
        }

        debug!("Refreshing Pyrus access token");
        let token = self.request_token().await?;
        let exposed = token.expose_secret().to_string();
        *guard = Some(token);
        Ok(exposed)
    }

    async fn post_task(
        &self,
        token: &str,
        payload: &serde_json::Value,
    ) -> Result<reqwest::Response, CrmError> {
        self.client
            .post(self.api_url("tasks"))
            .bearer_auth(token)
            .json(payload)
            .send()
            .await
            .map_err(|e| CrmError::RequestFailed(e.to_string()))
    }
}

/// Task payload for a form with the lead fields.
pub fn task_payload(form_id: u64, fields: &[CrmField]) -> serde_json::Value {
    serde_json::json!({
        "form_id": form_id,
        "text": format!(
            "Новая заявка с сайта от {}",
            Local::now().format("%d.%m.%Y %H:%M")
        ),
        "fields": fields,
    })
}

#[async_trait]
impl CrmSink for PyrusClient {
    async fn create_task(&self, form_id: u64, fields: &[CrmField]) -> Result<String, CrmError> {
        let payload = task_payload(form_id, fields);

        let token = self.current_token().await?;
        let mut resp = self.post_task(&token, &payload).await?;

        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            warn!("Pyrus token rejected, re-authenticating once");
            let token = self.refresh_token(Some(&token)).await?;
            resp = self.post_task(&token, &payload).await?;
        }

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CrmError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            });
        }

        let data: CreateTaskResponse = resp
            .json()
            .await
            .map_err(|e| CrmError::InvalidResponse(e.to_string()))?;

        match data.task.map(|t| t.id) {
            Some(serde_json::Value::Number(n)) => Ok(n.to_string()),
            Some(serde_json::Value::String(s)) if !s.is_empty() => Ok(s),
            _ => Err(CrmError::InvalidResponse("response has no task.id".into())),
        }
    }

    async fn is_connected(&self) -> bool {
        self.token.read().await.is_some()
    }
}
