//! Gate-opening telephony integration.
//!
//! Two-step gateway protocol, unrelated to the escalation flow: first
//! register the gate's phone number to obtain a call-session id, then place
//! the call with that id. Call progress is not in the call response — it is
//! polled out of band with [`GateCaller::call_status`]. The GSM relay on the
//! gate answers the call and triggers the motor; the call itself carries no
//! audio worth waiting for.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::json;

use crate::config::GateConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Step-1 response: a registered call session.
#[derive(Debug, Clone, Deserialize)]
pub struct CallSession {
    pub id: String,
}

/// Out-of-band call progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Queued,
    Ringing,
    Answered,
    Failed,
}

impl CallStatus {
    /// Terminal states need no further polling.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Answered | Self::Failed)
    }
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: CallStatus,
}

/// Client for the telephony gateway.
#[derive(Clone)]
pub struct GateCaller {
    http: reqwest::Client,
    config: GateConfig,
}

impl GateCaller {
    pub fn new(config: GateConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Register the gate number, then place the call. Returns the session
    /// whose status can be polled.
    pub async fn open_gate(&self) -> Result<CallSession> {
        let register_url = format!("{}/v1/numbers/register", self.config.base_url);
        let session: CallSession = self
            .http
            .post(&register_url)
            .timeout(REQUEST_TIMEOUT)
            .bearer_auth(&self.config.api_key)
            .json(&json!({ "number": self.config.gate_number }))
            .send()
            .await
            .context("Gate register request failed")?
            .error_for_status()
            .context("Gate register rejected")?
            .json()
            .await
            .context("Gate register returned malformed JSON")?;

        let call_url = format!("{}/v1/calls", self.config.base_url);
        self.http
            .post(&call_url)
            .timeout(REQUEST_TIMEOUT)
            .bearer_auth(&self.config.api_key)
            .json(&json!({ "session_id": session.id }))
            .send()
            .await
            .context("Gate call request failed")?
            .error_for_status()
            .context("Gate call rejected")?;

        Ok(session)
    }

    /// Poll call progress for a placed session.
    pub async fn call_status(&self, session_id: &str) -> Result<CallStatus> {
        let url = format!("{}/v1/calls/{session_id}", self.config.base_url);
        let response: StatusResponse = self
            .http
            .get(&url)
            .timeout(REQUEST_TIMEOUT)
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .context("Gate status request failed")?
            .error_for_status()
            .context("Gate status rejected")?
            .json()
            .await
            .context("Gate status returned malformed JSON")?;
        Ok(response.status)
    }
}
