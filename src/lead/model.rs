//! Structured lead record produced by the extractor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What the lead wants built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    #[default]
    House,
    Bath,
}

impl ObjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::House => "house",
            Self::Bath => "bath",
        }
    }
}

/// How the lead asked to be contacted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactMethod {
    #[default]
    Whatsapp,
    Telegram,
    PhoneCall,
}

impl ContactMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Whatsapp => "whatsapp",
            Self::Telegram => "telegram",
            Self::PhoneCall => "phone_call",
        }
    }
}

/// Which site form produced the message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormType {
    #[default]
    Application,
    GeneralRequest,
}

/// A lead extracted from an application message.
///
/// Only the extractor constructs these, and only when a phone was found.
/// `crm_task_id` is written once by the dispatcher after a CRM task exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadRecord {
    pub application_number: Option<String>,
    pub phone: String,
    pub object_type: ObjectType,
    /// Human-readable label for `object_type` in the operating language.
    pub object_description: String,
    pub area: Option<String>,
    pub budget: Option<String>,
    pub has_land: Option<String>,
    pub contact_method: ContactMethod,
    pub form_type: FormType,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    crm_task_id: Option<String>,
}

impl LeadRecord {
    /// Minimal record with defaults for every optional field.
    pub fn new(phone: impl Into<String>) -> Self {
        Self {
            application_number: None,
            phone: phone.into(),
            object_type: ObjectType::House,
            object_description: String::new(),
            area: None,
            budget: None,
            has_land: None,
            contact_method: ContactMethod::Whatsapp,
            form_type: FormType::Application,
            created_at: Utc::now(),
            crm_task_id: None,
        }
    }

    pub fn crm_task_id(&self) -> Option<&str> {
        self.crm_task_id.as_deref()
    }

    /// Attach the CRM task id. Returns `false` if one was already set.
    pub(crate) fn attach_crm_task(&mut self, task_id: String) -> bool {
        if self.crm_task_id.is_some() {
            return false;
        }
        self.crm_task_id = Some(task_id);
        true
    }
}
