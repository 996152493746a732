//! Keyword vocabulary used to classify object type and contact method.
//!
//! Ships with the Russian set the site forms are written in. A deployment
//! can replace it from a JSON profile without touching the extractor.

use serde::{Deserialize, Serialize};

use crate::lead::model::{ContactMethod, ObjectType};

/// A substring marker mapped to the contact method it implies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactMarker {
    pub marker: String,
    pub method: ContactMethod,
}

impl ContactMarker {
    pub fn new(marker: &str, method: ContactMethod) -> Self {
        Self {
            marker: marker.to_string(),
            method,
        }
    }
}

/// Keyword lists driving the keyword-based parts of extraction.
///
/// All matching is substring containment against the lower-cased text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Vocabulary {
    /// Checked before `bath_keywords`; a text matching both is a house.
    pub house_keywords: Vec<String>,
    pub bath_keywords: Vec<String>,
    /// First marker present in the text wins.
    pub contact_markers: Vec<ContactMarker>,
    pub house_label: String,
    pub bath_label: String,
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self {
            house_keywords: words(&["дом", "коттедж", "домик", "house"]),
            bath_keywords: words(&["бан", "сауна", "парилка", "bath", "sauna"]),
            contact_markers: vec![
                ContactMarker::new("whatsapp", ContactMethod::Whatsapp),
                ContactMarker::new("telegram", ContactMethod::Telegram),
                ContactMarker::new("озвучить по телефону", ContactMethod::PhoneCall),
                ContactMarker::new("позвонить", ContactMethod::PhoneCall),
            ],
            house_label: "дом".into(),
            bath_label: "баня".into(),
        }
    }
}

impl Vocabulary {
    /// Object type for a lower-cased text. Defaults to `House`.
    pub fn object_type(&self, lowered: &str) -> ObjectType {
        if contains_any(lowered, &self.house_keywords) {
            ObjectType::House
        } else if contains_any(lowered, &self.bath_keywords) {
            ObjectType::Bath
        } else {
            ObjectType::House
        }
    }

    /// Contact method for a lower-cased text. Defaults to `Whatsapp`.
    pub fn contact_method(&self, lowered: &str) -> ContactMethod {
        self.contact_markers
            .iter()
            .find(|m| !m.marker.is_empty() && lowered.contains(&m.marker.to_lowercase()))
            .map(|m| m.method)
            .unwrap_or_default()
    }

    pub fn label_for(&self, object_type: ObjectType) -> &str {
        match object_type {
            ObjectType::House => &self.house_label,
            ObjectType::Bath => &self.bath_label,
        }
    }
}

fn words(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn contains_any(lowered: &str, keywords: &[String]) -> bool {
    keywords
        .iter()
        .any(|k| !k.is_empty() && lowered.contains(&k.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn house_wins_when_both_sets_match() {
        let vocab = Vocabulary::default();
        assert_eq!(vocab.object_type("хочу дом и баню"), ObjectType::House);
    }

    #[test]
    fn bath_detected_alone() {
        let vocab = Vocabulary::default();
        assert_eq!(vocab.object_type("интересует сауна"), ObjectType::Bath);
    }

    #[test]
    fn object_type_defaults_to_house() {
        let vocab = Vocabulary::default();
        assert_eq!(vocab.object_type("просто вопрос"), ObjectType::House);
    }

    #[test]
    fn contact_marker_order_matters() {
        let vocab = Vocabulary::default();
        assert_eq!(
            vocab.contact_method("пишите в telegram или whatsapp"),
            ContactMethod::Whatsapp
        );
        assert_eq!(
            vocab.contact_method("лучше позвонить"),
            ContactMethod::PhoneCall
        );
        assert_eq!(vocab.contact_method("без пожеланий"), ContactMethod::Whatsapp);
    }

    #[test]
    fn partial_profile_keeps_remaining_defaults() {
        let vocab: Vocabulary =
            serde_json::from_str(r#"{"bath_keywords": ["sauna"], "bath_label": "sauna"}"#)
                .unwrap();
        assert_eq!(vocab.bath_keywords, vec!["sauna".to_string()]);
        assert_eq!(vocab.house_label, "дом");
        assert_eq!(vocab.contact_markers.len(), 4);
    }

    #[test]
    fn empty_keywords_never_match() {
        let vocab = Vocabulary {
            house_keywords: vec![String::new()],
            bath_keywords: vec!["sauna".into()],
            ..Vocabulary::default()
        };
        assert_eq!(vocab.object_type("sauna please"), ObjectType::Bath);
    }
}
