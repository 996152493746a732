//! Application classifier: decides whether a text is a site-form lead.
//!
//! Counts independent structural probes. A single coincidental marker (a
//! phone number in an unrelated chat message) is not enough; at least
//! [`MIN_PROBE_MATCHES`] distinct probes must match.

use regex::Regex;
use tracing::debug;

use crate::lead::markers;

/// Distinct probes required to treat a text as an application.
pub const MIN_PROBE_MATCHES: usize = 2;

/// One named structural probe.
#[derive(Debug, Clone)]
pub struct Probe {
    pub name: &'static str,
    pub regex: Regex,
}

/// Probe-counting classifier.
#[derive(Debug, Clone)]
pub struct ApplicationClassifier {
    probes: Vec<Probe>,
    threshold: usize,
}

impl Default for ApplicationClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ApplicationClassifier {
    /// Classifier with the five site-form probes.
    pub fn new() -> Self {
        let probes = vec![
            Probe {
                name: "application_number",
                regex: markers::APPLICATION_NUMBER.clone(),
            },
            Probe {
                name: "form_name",
                regex: markers::FORM_NAME.clone(),
            },
            Probe {
                name: "form_data",
                regex: markers::FORM_DATA.clone(),
            },
            Probe {
                name: "phone_line",
                regex: markers::PHONE_LINE.clone(),
            },
            Probe {
                name: "estimate_target",
                regex: markers::ESTIMATE_TARGET.clone(),
            },
        ];

        Self {
            probes,
            threshold: MIN_PROBE_MATCHES,
        }
    }

    /// Names of the probes that match `text`, in probe order.
    pub fn matched_probes(&self, text: &str) -> Vec<&'static str> {
        self.probes
            .iter()
            .filter(|p| p.regex.is_match(text))
            .map(|p| p.name)
            .collect()
    }

    /// Whether `text` is a lead application. Empty text is never one.
    pub fn is_application(&self, text: &str) -> bool {
        if text.trim().is_empty() {
            return false;
        }

        let matched = self.matched_probes(text);
        let is_application = matched.len() >= self.threshold;
        debug!(
            matched = matched.len(),
            probes = ?matched,
            is_application,
            "Classified message"
        );
        is_application
    }
}
