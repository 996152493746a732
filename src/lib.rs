//! Lead responder: recognises website applications arriving by Telegram or
//! email, files them in the CRM and answers the lead on WhatsApp.

pub mod bootstrap;
pub mod channels;
pub mod config;
pub mod crm;
pub mod error;
pub mod lead;
pub mod messenger;
pub mod pipeline;
pub mod telemetry;
