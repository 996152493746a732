//! Lead processor: the single entry point both ingestion paths call.
//!
//! Flow:
//! 1. Classifier (probe count) → may stop here
//! 2. Extractor → rejected when no phone
//! 3. Dispatcher → CRM task, reply, scoring

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::lead::{ApplicationClassifier, LeadExtractor, LeadRecord};
use crate::pipeline::dispatcher::Dispatcher;
use crate::pipeline::stats::Stats;
use crate::pipeline::types::DispatchReport;

/// Terminal state of one inbound text.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ProcessResult {
    /// Fewer than two structural markers; nothing was done.
    NotApplication,
    /// Looked like an application but had no phone to answer.
    Rejected,
    /// Extracted and dispatched.
    Dispatched {
        record: Box<LeadRecord>,
        report: DispatchReport,
    },
}

impl ProcessResult {
    pub fn label(&self) -> &'static str {
        match self {
            Self::NotApplication => "not_application",
            Self::Rejected => "rejected",
            Self::Dispatched { .. } => "dispatched",
        }
    }
}

/// Classifier → extractor → dispatcher, shared by every channel.
pub struct LeadProcessor {
    classifier: ApplicationClassifier,
    extractor: LeadExtractor,
    dispatcher: Dispatcher,
}

impl LeadProcessor {
    pub fn new(
        classifier: ApplicationClassifier,
        extractor: LeadExtractor,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            classifier,
            extractor,
            dispatcher,
        }
    }

    pub fn is_application(&self, text: &str) -> bool {
        self.classifier.is_application(text)
    }

    pub fn extract(&self, text: &str) -> Option<LeadRecord> {
        self.extractor.extract(text)
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn stats(&self) -> &Arc<Stats> {
        self.dispatcher.stats()
    }

    /// Run one inbound text through the whole pipeline.
    pub async fn handle_text(&self, source: &str, text: &str) -> ProcessResult {
        if !self.classifier.is_application(text) {
            debug!(source, "Not an application, ignoring");
            return ProcessResult::NotApplication;
        }

        info!(source, "Application received");

        let Some(mut record) = self.extractor.extract(text) else {
            info!(source, "Application rejected: no phone");
            return ProcessResult::Rejected;
        };

        let report = self.dispatcher.dispatch(&mut record).await;
        info!(
            source,
            outcome = report.outcome.label(),
            score = report.score,
            "Application processed"
        );

        ProcessResult::Dispatched {
            record: Box::new(record),
            report,
        }
    }

    /// Process a batch of texts one by one (e.g. one mailbox poll).
    pub async fn handle_batch(&self, source: &str, texts: Vec<String>) -> Vec<ProcessResult> {
        let count = texts.len();
        let mut results = Vec::with_capacity(count);
        for text in texts {
            results.push(self.handle_text(source, &text).await);
        }

        let dispatched = results
            .iter()
            .filter(|r| matches!(r, ProcessResult::Dispatched { .. }))
            .count();
        debug!(source, total = count, dispatched, "Batch processing complete");
        results
    }
}
