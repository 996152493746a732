//! Wiring: turns an `AppConfig` into a ready `LeadProcessor` and the
//! collaborator clients behind it.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::AppConfig;
use crate::crm::PyrusClient;
use crate::error::Result;
use crate::lead::{ApplicationClassifier, LeadExtractor};
use crate::messenger::GreenApiClient;
use crate::pipeline::{
    Channels, CrmSink, CrmTarget, Dispatcher, LeadProcessor, MessageSink, Stats,
};

/// Collaborator clients, kept concrete for the startup probes.
#[derive(Default)]
pub struct Collaborators {
    pub pyrus: Option<Arc<PyrusClient>>,
    pub green_api: Option<Arc<GreenApiClient>>,
}

impl Collaborators {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let pyrus = match &config.pyrus {
            Some(c) => Some(Arc::new(PyrusClient::new(c.clone())?)),
            None => None,
        };
        let green_api = match &config.green_api {
            Some(c) => Some(Arc::new(GreenApiClient::new(c.clone())?)),
            None => None,
        };
        Ok(Self { pyrus, green_api })
    }

    /// Dispatcher channels. A CRM with form id `0` is left out.
    pub fn channels(&self) -> Channels {
        Channels {
            crm: self
                .pyrus
                .as_ref()
                .filter(|p| p.form_id() != 0)
                .map(|p| CrmTarget {
                    form_id: p.form_id(),
                    sink: Arc::clone(p) as Arc<dyn CrmSink>,
                }),
            messenger: self
                .green_api
                .as_ref()
                .map(|g| Arc::clone(g) as Arc<dyn MessageSink>),
        }
    }

    /// Authenticate the CRM and check WhatsApp authorization. Failures are
    /// logged; the bot still starts.
    pub async fn probe(&self) {
        if let Some(pyrus) = &self.pyrus {
            match pyrus.authenticate().await {
                Ok(()) => info!("Pyrus CRM ready"),
                Err(e) => warn!(error = %e, "Pyrus CRM authentication failed at startup"),
            }
        }
        if let Some(green_api) = &self.green_api {
            match green_api.state().await {
                Ok(state) if state == "authorized" => info!("WhatsApp instance authorized"),
                Ok(state) => warn!(state = %state, "WhatsApp instance not authorized"),
                Err(e) => warn!(error = %e, "WhatsApp state check failed at startup"),
            }
        }
    }
}

/// Build the shared processor from config and its lead profile.
pub fn build_processor(
    config: &AppConfig,
    collaborators: &Collaborators,
    stats: Arc<Stats>,
) -> Result<LeadProcessor> {
    let profile = config.lead_profile()?;
    let dispatcher = Dispatcher::new(collaborators.channels(), profile.templates, stats)
        .with_telegram_handoff(config.telegram_handoff);

    Ok(LeadProcessor::new(
        ApplicationClassifier::new(),
        LeadExtractor::new(profile.vocabulary),
        dispatcher,
    ))
}
