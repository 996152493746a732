//! CRM integrations.

pub mod pyrus;

pub use pyrus::{PyrusClient, PyrusConfig};
