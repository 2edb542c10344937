//! Viewer consent resolution
//!
//! Reads the IAB TCF v2 signal from the page's consent management platform
//! before any ad request. A missing, failing, malformed or silent transport
//! all resolve to [`ConsentState::default`]; none of them is surfaced as an error.

use crate::config::ConsentSettings;
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// TCF vendor id of the ad-tech vendor
pub const GOOGLE_VENDOR_ID: u32 = 755;

/// TCF vendor id of the platform vendor
pub const DAILYMOTION_VENDOR_ID: u32 = 573;

/// Immutable consent snapshot handed to the ad engine
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentState {
    /// Raw TC string
    pub tcf_consent: String,
    /// Consent for the ad-tech vendor
    #[serde(rename = "tcf2HasConsentForGoogle")]
    pub has_consent_for_google: bool,
    /// Consent for the platform vendor
    #[serde(rename = "tcf2HasConsentForDailymotion")]
    pub has_consent_for_dailymotion: bool,
    /// Whether GDPR applies to this viewer
    pub is_gdpr_applicable: bool,
}

impl ConsentState {
    /// Build a snapshot from a CMP response.
    ///
    /// Returns `None` when the response cannot be used.
    pub fn from_tc_data(data: &TcData, success: bool) -> Option<Self> {
        if !success {
            return None;
        }
        let consents = data.vendor.as_ref()?.consents.as_ref()?;
        let granted = |id: u32| consents.get(&id).copied().unwrap_or(false);

        Some(Self {
            tcf_consent: data.tc_string.clone().unwrap_or_default(),
            has_consent_for_google: granted(GOOGLE_VENDOR_ID),
            has_consent_for_dailymotion: granted(DAILYMOTION_VENDOR_ID),
            is_gdpr_applicable: data.gdpr_applies.unwrap_or(false),
        })
    }
}

/// TCF `getTCData` payload, as returned by a CMP
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TcData {
    pub tc_string: Option<String>,
    pub purpose: Option<ConsentMap>,
    pub vendor: Option<ConsentMap>,
    pub gdpr_applies: Option<bool>,
}

/// Consents indexed by purpose or vendor id
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsentMap {
    pub consents: Option<HashMap<u32, bool>>,
}

/// Response of a single `getTCData` round trip
#[derive(Debug, Clone, Default)]
pub struct TcResponse {
    pub data: TcData,
    pub success: bool,
}

/// Privacy-signal transport (the page's `__tcfapi`)
#[async_trait]
pub trait ConsentProvider: Send + Sync {
    /// Perform one `getTCData` call
    async fn get_tc_data(&self, version: u8) -> Result<TcResponse>;
}

/// Resolves [`ConsentState`] for an ad session
#[derive(Clone)]
pub struct ConsentResolver {
    provider: Option<Arc<dyn ConsentProvider>>,
    settings: ConsentSettings,
}

impl ConsentResolver {
    pub fn new(provider: Option<Arc<dyn ConsentProvider>>, settings: ConsentSettings) -> Self {
        Self { provider, settings }
    }

    /// Resolver for pages without a consent platform
    pub fn unavailable() -> Self {
        Self::new(None, ConsentSettings::default())
    }

    pub fn has_transport(&self) -> bool {
        self.provider.is_some()
    }

    /// Resolve the viewer's consent. Never fails.
    pub async fn resolve(&self) -> ConsentState {
        let Some(provider) = &self.provider else {
            debug!("No consent transport, using default consent");
            return ConsentState::default();
        };

        let call = provider.get_tc_data(self.settings.tcf_version);
        let response = match tokio::time::timeout(self.settings.timeout, call).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                let err = match e {
                    Error::ConsentUnavailable(_) => e,
                    other => Error::ConsentUnavailable(other.to_string()),
                };
                warn!(error = %err, code = err.error_code(), "Using default consent");
                return ConsentState::default();
            }
            Err(_) => {
                let err = Error::ConsentTimeout {
                    timeout_ms: self.settings.timeout.as_millis() as u64,
                };
                warn!(error = %err, code = err.error_code(), "Using default consent");
                return ConsentState::default();
            }
        };

        match ConsentState::from_tc_data(&response.data, response.success) {
            Some(consent) => {
                info!(
                    gdpr = consent.is_gdpr_applicable,
                    google = consent.has_consent_for_google,
                    dailymotion = consent.has_consent_for_dailymotion,
                    "Consent resolved"
                );
                consent
            }
            None => {
                debug!(success = response.success, "Unusable TCF response, using default consent");
                ConsentState::default()
            }
        }
    }
}
