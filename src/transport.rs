// XADC - sensor telemetry egress
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Batch delivery to the collector
//!
//! [`Transport`] is the seam between the egress sender and the network.
//! [`HttpTransport`] posts batches with `reqwest`; [`MemoryTransport`]
//! records them in memory and replays scripted outcomes.

use crate::error::{ConfigError, DeliveryError, Result};
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Default per-request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Delivers one newline-joined batch
pub trait Transport: Send + Sync + 'static {
    /// Send `body`; `Ok` only when the collector accepted it
    fn deliver(&self, body: String) -> impl Future<Output = std::result::Result<(), DeliveryError>> + Send;
}

/// Basic-auth credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: Option<String>,
}

impl Credentials {
    /// Build credentials; `None` when no username is configured
    pub fn from_parts(username: Option<&str>, password: Option<&str>) -> Option<Self> {
        let username = username.filter(|u| !u.is_empty())?;
        Some(Self {
            username: username.to_string(),
            password: password.map(str::to_string),
        })
    }
}

/// Whether a response status commits the batch.
///
/// 400 is listed explicitly: it marks a malformed payload and the batch is
/// kept like any other failure.
pub fn accepts(status: StatusCode) -> bool {
    status.is_success() && status != StatusCode::BAD_REQUEST
}

/// HTTP POST delivery.
///
/// Certificate verification is disabled: collectors on the instrument network
/// use self-signed certificates, and the operator opts in per destination by
/// configuring an `https://` URL.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    credentials: Option<Credentials>,
}

impl HttpTransport {
    /// Create a transport posting to `url`
    pub fn new(url: impl Into<String>, credentials: Option<Credentials>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                field: "http client".to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            url: url.into(),
            credentials,
        })
    }

    /// Destination URL
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Transport for HttpTransport {
    async fn deliver(&self, body: String) -> std::result::Result<(), DeliveryError> {
        let mut request = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body);
        if let Some(creds) = &self.credentials {
            request = request.basic_auth(&creds.username, creds.password.as_ref());
        }

        let response = request
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let status = response.status();
        if accepts(status) {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(DeliveryError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    delivered: Vec<String>,
    attempts: Vec<String>,
    script: VecDeque<std::result::Result<(), DeliveryError>>,
}

/// In-memory transport for tests and dry runs.
///
/// Outcomes queued with [`MemoryTransport::push_outcome`] are consumed one per
/// attempt; once the script is empty every attempt succeeds. Clones share
/// state.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryTransport {
    /// Create a transport that accepts everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the outcome of a future attempt
    pub fn push_outcome(&self, outcome: std::result::Result<(), DeliveryError>) {
        self.lock().script.push_back(outcome);
    }

    /// Bodies accepted so far, in delivery order
    pub fn delivered(&self) -> Vec<String> {
        self.lock().delivered.clone()
    }

    /// Every body attempted, including failed ones
    pub fn attempts(&self) -> Vec<String> {
        self.lock().attempts.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Transport for MemoryTransport {
    async fn deliver(&self, body: String) -> std::result::Result<(), DeliveryError> {
        let mut state = self.lock();
        state.attempts.push(body.clone());
        let outcome = state.script.pop_front().unwrap_or(Ok(()));
        if outcome.is_ok() {
            state.delivered.push(body);
        }
        outcome
    }
}
