//! Lead recognition: classify a raw text, then extract a structured record.
//!
//! Both steps are pure functions of the text (apart from the extraction
//! timestamp) and never fail: a negative answer is `false` or `None`.

pub mod classifier;
pub mod extractor;
pub(crate) mod markers;
pub mod model;
pub mod vocabulary;

pub use classifier::ApplicationClassifier;
pub use extractor::LeadExtractor;
pub use model::{ContactMethod, FormType, LeadRecord, ObjectType};
pub use vocabulary::{ContactMarker, Vocabulary};
