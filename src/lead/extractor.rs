//! Field extractor: turns an application text into a [`LeadRecord`].
//!
//! Every field is optional except the phone. Missing fields are normal;
//! a missing phone means there is no one to answer, so no record is built.

use chrono::Utc;
use tracing::{debug, info};

use crate::lead::markers::{self, capture_trimmed};
use crate::lead::model::{FormType, LeadRecord};
use crate::lead::vocabulary::Vocabulary;

/// Pattern- and keyword-based lead extractor.
#[derive(Debug, Clone, Default)]
pub struct LeadExtractor {
    vocabulary: Vocabulary,
}

impl LeadExtractor {
    pub fn new(vocabulary: Vocabulary) -> Self {
        Self { vocabulary }
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    /// Extract a lead record. Returns `None` when no phone is present.
    pub fn extract(&self, text: &str) -> Option<LeadRecord> {
        let Some(phone) = extract_phone(text) else {
            debug!("No phone found in application text, rejecting");
            return None;
        };

        let lowered = text.to_lowercase();
        let object_type = self.vocabulary.object_type(&lowered);

        let mut record = LeadRecord::new(phone);
        record.application_number = capture_trimmed(&markers::APPLICATION_NUMBER, text);
        record.object_type = object_type;
        record.object_description = self.vocabulary.label_for(object_type).to_string();
        record.area = capture_trimmed(&markers::AREA, text);
        record.budget = capture_trimmed(&markers::BUDGET, text);
        record.has_land = capture_trimmed(&markers::LAND, text);
        record.contact_method = self.vocabulary.contact_method(&lowered);
        record.form_type = extract_form_type(text);
        record.created_at = Utc::now();

        info!(
            application_number = record.application_number.as_deref().unwrap_or("-"),
            object_type = record.object_type.as_str(),
            contact_method = record.contact_method.as_str(),
            "Extracted lead"
        );
        Some(record)
    }
}

/// First labeled phone pattern that yields a non-blank capture.
fn extract_phone(text: &str) -> Option<String> {
    markers::PHONE_PATTERNS
        .iter()
        .find_map(|pattern| capture_trimmed(pattern, text))
}

fn extract_form_type(text: &str) -> FormType {
    match capture_trimmed(&markers::FORM_NAME, text) {
        Some(label) if label.to_lowercase() == "заявка" => FormType::GeneralRequest,
        _ => FormType::Application,
    }
}
