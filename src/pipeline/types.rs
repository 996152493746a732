//! Shared types for the lead pipeline.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{CrmError, MessengerError};

// ── Collaborator traits ─────────────────────────────────────────────

/// One named field of a CRM task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrmField {
    pub name: String,
    pub value: String,
}

impl CrmField {
    pub fn new(name: &str, value: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            value: value.into(),
        }
    }
}

/// CRM that turns a lead into a task. Pure I/O, no business logic.
#[async_trait]
pub trait CrmSink: Send + Sync {
    /// Create a task on the given form. Returns the CRM task id.
    async fn create_task(&self, form_id: u64, fields: &[CrmField]) -> Result<String, CrmError>;

    /// Whether the sink currently holds a usable session.
    async fn is_connected(&self) -> bool;
}

/// Gateway that delivers a templated reply to a lead's phone.
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Send `text` to a loosely formatted phone number.
    ///
    /// The sink owns any channel-specific phone normalisation.
    async fn send_message(&self, phone: &str, text: &str) -> Result<(), MessengerError>;

    /// Whether the gateway instance is authorised to send. Used by health checks.
    async fn is_authorized(&self) -> bool;
}

// ── Dispatch outcome ────────────────────────────────────────────────

/// Result of dispatching one lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Phone-call leads are handled by people; nothing was attempted.
    Skipped,
    /// At least half of the scored actions succeeded.
    Success,
    /// Fewer than half of the scored actions succeeded.
    Partial,
}

impl Outcome {
    /// `Skipped` counts as success: the lead is in the right hands.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Skipped | Self::Success)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Skipped => "skipped",
            Self::Success => "success",
            Self::Partial => "partial",
        }
    }
}

/// What happened to the reply message for one lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageDelivery {
    /// Delivered through the messaging sink.
    Sent,
    /// The sink reported a failure.
    Failed,
    /// No sink configured for the lead's contact method.
    Unavailable,
    /// Telegram leads: no delivery path, handed off to a manager.
    HandedOff,
    /// Contact method does not call for an automatic reply.
    NotRequired,
}

/// Full report for one dispatched lead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReport {
    pub outcome: Outcome,
    /// Successful scored actions, out of [`SCORED_ACTIONS`].
    pub score: u32,
    pub crm_task_id: Option<String>,
    pub delivery: MessageDelivery,
}

/// Fixed denominator: CRM task, message send, overall processing.
pub const SCORED_ACTIONS: u32 = 3;

impl DispatchReport {
    pub fn skipped() -> Self {
        Self {
            outcome: Outcome::Skipped,
            score: 0,
            crm_task_id: None,
            delivery: MessageDelivery::NotRequired,
        }
    }

    /// Report for a dispatch that failed unexpectedly. Carries the CRM task
    /// id when the task was created before the failure.
    pub fn failed(crm_task_id: Option<String>) -> Self {
        Self {
            outcome: Outcome::Partial,
            score: 0,
            crm_task_id,
            delivery: MessageDelivery::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skipped_counts_as_success() {
        assert!(Outcome::Skipped.is_success());
        assert!(Outcome::Success.is_success());
        assert!(!Outcome::Partial.is_success());
    }

    #[test]
    fn outcome_labels() {
        assert_eq!(Outcome::Skipped.label(), "skipped");
        assert_eq!(Outcome::Success.label(), "success");
        assert_eq!(Outcome::Partial.label(), "partial");
    }

    #[test]
    fn crm_field_serializes_as_name_value() {
        let field = CrmField::new("Телефон", "+7 900");
        let json = serde_json::to_value(&field).unwrap();
        assert_eq!(json, serde_json::json!({"name": "Телефон", "value": "+7 900"}));
    }
}
