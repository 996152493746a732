//! Reply templates sent to leads.

use serde::{Deserialize, Serialize};

use crate::lead::model::{FormType, LeadRecord, ObjectType};

/// Reply texts keyed by object type, plus one for general requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageTemplates {
    pub house: String,
    pub bath: String,
    pub general_request: String,
}

impl Default for MessageTemplates {
    fn default() -> Self {
        Self {
            house: "Здравствуйте! С Вами на связи строительная компания «Срубим».\n\
                    Рады будем обсудить Ваши более детальные пожелания по будущему дому \
                    здесь или готовы назначить встречу в офисе."
                .into(),
            bath: "Здравствуйте! С Вами на связи строительная компания «Срубим».\n\
                   Рады будем обсудить Ваши более детальные пожелания по будущей бане \
                   здесь или готовы назначить встречу в офисе."
                .into(),
            general_request: "Здравствуйте! С Вами на связи строительная компания «Срубим».\n\
                              Мы получили Ваше обращение и в ближайшее время вернемся к Вам с ответом."
                .into(),
        }
    }
}

impl MessageTemplates {
    /// Template for a record. General requests win over object type.
    pub fn select(&self, record: &LeadRecord) -> &str {
        if record.form_type == FormType::GeneralRequest {
            return &self.general_request;
        }
        match record.object_type {
            ObjectType::House => &self.house,
            ObjectType::Bath => &self.bath,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn general_request_overrides_object_type() {
        let templates = MessageTemplates::default();
        let mut record = LeadRecord::new("1");
        record.object_type = ObjectType::Bath;
        record.form_type = FormType::GeneralRequest;
        assert_eq!(templates.select(&record), templates.general_request);
    }

    #[test]
    fn selects_by_object_type() {
        let templates = MessageTemplates::default();
        let mut record = LeadRecord::new("1");
        assert_eq!(templates.select(&record), templates.house);
        record.object_type = ObjectType::Bath;
        assert_eq!(templates.select(&record), templates.bath);
        assert!(templates.bath.contains("бане"));
    }

    #[test]
    fn partial_override_keeps_defaults() {
        let templates: MessageTemplates =
            serde_json::from_str(r#"{"house": "Hello!"}"#).unwrap();
        assert_eq!(templates.house, "Hello!");
        assert_eq!(templates.bath, MessageTemplates::default().bath);
    }
}
