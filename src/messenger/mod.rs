//! Outbound messaging integrations.

pub mod green_api;

pub use green_api::{GreenApiClient, GreenApiConfig, format_phone_number};
