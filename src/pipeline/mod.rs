//! Lead processing pipeline.
//!
//! Every inbound text from any channel flows through:
//! 1. `ApplicationClassifier::is_application()`: structural probes
//! 2. `LeadExtractor::extract()`: pattern-based field extraction
//! 3. `Dispatcher::dispatch()`: CRM task, reply, scoring
//!
//! Channels only translate the resulting `ProcessResult` into replies.

pub mod dispatcher;
pub mod processor;
pub mod stats;
pub mod templates;
pub mod types;

pub use dispatcher::{Channels, CrmTarget, Dispatcher, TelegramHandoff};
pub use processor::{LeadProcessor, ProcessResult};
pub use stats::{Stats, StatsSnapshot};
pub use templates::MessageTemplates;
pub use types::{CrmField, CrmSink, DispatchReport, MessageDelivery, MessageSink, Outcome};
