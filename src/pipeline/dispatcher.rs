//! Dispatch policy: decides which downstream actions a lead gets and
//! scores how many of them worked.
//!
//! Flow for one lead:
//! 1. Phone-call leads → skipped, no collaborator is touched
//! 2. CRM task (when a CRM is configured)
//! 3. Template selection
//! 4. Reply through the messaging sink (WhatsApp) or Telegram hand-off
//! 5. Score out of [`SCORED_ACTIONS`]; under half is `Partial`
//!
//! Nothing escapes `dispatch`: collaborator errors are missed actions, and a
//! panic inside a step is caught at the boundary and reported as `Partial`.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::lead::model::{ContactMethod, LeadRecord};
use crate::pipeline::stats::Stats;
use crate::pipeline::templates::MessageTemplates;
use crate::pipeline::types::{
    CrmField, CrmSink, DispatchReport, MessageDelivery, MessageSink, Outcome, SCORED_ACTIONS,
};

/// Minimum share of scored actions for a `Success` outcome.
const SUCCESS_RATIO: f64 = 0.5;

/// A CRM sink bound to the form new tasks go to.
#[derive(Clone)]
pub struct CrmTarget {
    pub sink: Arc<dyn CrmSink>,
    pub form_id: u64,
}

/// Downstream collaborators available to the dispatcher.
#[derive(Clone, Default)]
pub struct Channels {
    pub crm: Option<CrmTarget>,
    pub messenger: Option<Arc<dyn MessageSink>>,
}

impl Channels {
    /// CRM step is attempted only with a sink and a real form id.
    fn crm_target(&self) -> Option<&CrmTarget> {
        self.crm.as_ref().filter(|t| t.form_id != 0)
    }
}

/// What to do with leads that asked for a Telegram reply.
///
/// There is no Telegram user-account delivery path. `Unsupported` hands the
/// lead to a manager without claiming a delivery. `CountAsSent` keeps the
/// legacy scoring where the hand-off earns the message credit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TelegramHandoff {
    #[default]
    Unsupported,
    CountAsSent,
}

/// The dispatch policy with its collaborators and counters.
pub struct Dispatcher {
    channels: Channels,
    templates: MessageTemplates,
    telegram: TelegramHandoff,
    stats: Arc<Stats>,
}

impl Dispatcher {
    pub fn new(channels: Channels, templates: MessageTemplates, stats: Arc<Stats>) -> Self {
        Self {
            channels,
            templates,
            telegram: TelegramHandoff::default(),
            stats,
        }
    }

    pub fn with_telegram_handoff(mut self, policy: TelegramHandoff) -> Self {
        self.telegram = policy;
        self
    }

    pub fn channels(&self) -> &Channels {
        &self.channels
    }

    pub fn stats(&self) -> &Arc<Stats> {
        &self.stats
    }

    /// Dispatch one lead. Writes `crm_task_id` into the record on CRM success.
    pub async fn dispatch(&self, record: &mut LeadRecord) -> DispatchReport {
        if record.contact_method == ContactMethod::PhoneCall {
            info!(
                application_number = record.application_number.as_deref().unwrap_or("-"),
                "Phone-call lead, leaving it to managers"
            );
            return DispatchReport::skipped();
        }

        let steps = AssertUnwindSafe(self.run_steps(record)).catch_unwind().await;
        match steps {
            Ok(report) => report,
            Err(panic) => {
                error!(
                    reason = %panic_message(panic.as_ref()),
                    "Dispatch step panicked"
                );
                self.stats.record_error();
                DispatchReport::failed(record.crm_task_id().map(String::from))
            }
        }
    }

    async fn run_steps(&self, record: &mut LeadRecord) -> DispatchReport {
        let mut score = 0;

        if self.create_crm_task(record).await {
            score += 1;
        }

        let template = self.templates.select(record);
        let delivery = self.deliver(record, template).await;
        let message_sent = match delivery {
            MessageDelivery::Sent => true,
            MessageDelivery::HandedOff => self.telegram == TelegramHandoff::CountAsSent,
            _ => false,
        };
        if message_sent {
            score += 1;
        }

        if message_sent || record.crm_task_id().is_some() {
            self.stats.record_processed();
            score += 1;
        }

        let ratio = f64::from(score) / f64::from(SCORED_ACTIONS);
        let outcome = if ratio >= SUCCESS_RATIO {
            info!(
                application_number = record.application_number.as_deref().unwrap_or("-"),
                score,
                total = SCORED_ACTIONS,
                "Lead dispatched"
            );
            Outcome::Success
        } else {
            warn!(
                application_number = record.application_number.as_deref().unwrap_or("-"),
                score,
                total = SCORED_ACTIONS,
                delivery = ?delivery,
                "Lead dispatched partially"
            );
            self.stats.record_error();
            Outcome::Partial
        };

        DispatchReport {
            outcome,
            score,
            crm_task_id: record.crm_task_id().map(String::from),
            delivery,
        }
    }

    /// CRM step. Returns whether a task was created.
    async fn create_crm_task(&self, record: &mut LeadRecord) -> bool {
        let Some(target) = self.channels.crm_target() else {
            return false;
        };

        let fields = crm_fields(record);
        match target.sink.create_task(target.form_id, &fields).await {
            Ok(task_id) => {
                info!(task_id = %task_id, "CRM task created");
                record.attach_crm_task(task_id);
                self.stats.record_crm_task();
                true
            }
            Err(e) => {
                warn!(error = %e, "CRM task creation failed");
                false
            }
        }
    }

    async fn deliver(&self, record: &LeadRecord, template: &str) -> MessageDelivery {
        match record.contact_method {
            ContactMethod::Whatsapp => {
                let Some(messenger) = self.channels.messenger.as_ref() else {
                    return MessageDelivery::Unavailable;
                };
                if record.phone.is_empty() {
                    return MessageDelivery::Unavailable;
                }
                match messenger.send_message(&record.phone, template).await {
                    Ok(()) => {
                        self.stats.record_whatsapp_sent();
                        MessageDelivery::Sent
                    }
                    Err(e) => {
                        warn!(error = %e, "WhatsApp reply failed");
                        MessageDelivery::Failed
                    }
                }
            }
            ContactMethod::Telegram => {
                self.stats.record_telegram_handoff();
                match self.telegram {
                    TelegramHandoff::Unsupported => {
                        info!(
                            phone = %record.phone,
                            "Telegram reply requested; no delivery path, handed off to managers"
                        );
                    }
                    TelegramHandoff::CountAsSent => {
                        warn!(
                            phone = %record.phone,
                            "Telegram reply not delivered but counted as sent"
                        );
                    }
                }
                MessageDelivery::HandedOff
            }
            ContactMethod::PhoneCall => MessageDelivery::NotRequired,
        }
    }
}

/// CRM task fields for a lead. Absent values are sent as empty strings.
pub fn crm_fields(record: &LeadRecord) -> Vec<CrmField> {
    let opt = |v: &Option<String>| v.clone().unwrap_or_default();
    vec![
        CrmField::new("Телефон", record.phone.clone()),
        CrmField::new("Тип объекта", record.object_description.clone()),
        CrmField::new("Способ связи", record.contact_method.as_str()),
        CrmField::new("Площадь", opt(&record.area)),
        CrmField::new("Бюджет", opt(&record.budget)),
        CrmField::new("Участок", opt(&record.has_land)),
        CrmField::new("Номер заявки", opt(&record.application_number)),
        CrmField::new("Дата создания", record.created_at.to_rfc3339()),
    ]
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
