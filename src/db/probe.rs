//! Endpoint selection over an ordered list of candidate base URLs.
//!
//! Candidates are checked one at a time in list order, so the primary wins
//! whenever it is reachable and the worst case is `timeout * candidates`.
//! The winner is persisted through an [`EndpointStore`]; when every
//! candidate fails, the remembered URL (if any) is used as a last resort.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::db::executor::HttpExecutor;
use crate::db::transport::{ResponseBody, Transport};
use crate::error::DataError;

/// Durable memory of the last endpoint that passed a probe.
pub trait EndpointStore: Send + Sync {
    fn load(&self) -> Option<String>;
    fn save(&self, url: &str);
}

/// In-process [`EndpointStore`].
#[derive(Debug, Default)]
pub struct MemoryEndpointStore {
    url: Mutex<Option<String>>,
}

impl MemoryEndpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: Mutex::new(Some(url.into())),
        }
    }
}

impl EndpointStore for MemoryEndpointStore {
    fn load(&self) -> Option<String> {
        self.url
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn save(&self, url: &str) {
        *self.url.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(url.to_string());
    }
}

/// A single liveness check against one base URL.
#[async_trait]
pub trait LivenessCheck: Send + Sync {
    async fn check(&self, base_url: &str, timeout: Duration) -> Result<(), DataError>;
}

/// Liveness over HTTP using the transport's health request.
///
/// Healthy means a 2xx answer whose JSON `status` field, when present, is
/// `"healthy"` or `"ok"`.
#[derive(Debug, Clone)]
pub struct HttpLivenessCheck {
    executor: Arc<HttpExecutor>,
    transport: Arc<dyn Transport>,
}

impl HttpLivenessCheck {
    pub fn new(executor: Arc<HttpExecutor>, transport: Arc<dyn Transport>) -> Self {
        Self {
            executor,
            transport,
        }
    }
}

#[async_trait]
impl LivenessCheck for HttpLivenessCheck {
    async fn check(&self, base_url: &str, timeout: Duration) -> Result<(), DataError> {
        let request = self.transport.liveness_request();
        let response = self.executor.execute_once(base_url, &request, timeout).await?;
        if let ResponseBody::Json(body) = &response.body
            && let Some(Value::String(status)) = body.get("status")
            && !is_healthy_status(status)
        {
            return Err(DataError::Backend {
                message: format!("endpoint reports status '{status}'"),
            });
        }
        Ok(())
    }
}

fn is_healthy_status(status: &str) -> bool {
    status.eq_ignore_ascii_case("healthy") || status.eq_ignore_ascii_case("ok")
}

/// How the prober arrived at its answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeSource {
    /// Candidate at this index passed the liveness check.
    Live { index: usize },
    /// Nothing answered; the persisted choice was used.
    Remembered,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub url: String,
    pub source: ProbeSource,
}

pub struct EndpointProber {
    candidates: Vec<String>,
    timeout: Duration,
    liveness: Arc<dyn LivenessCheck>,
    store: Arc<dyn EndpointStore>,
}

impl EndpointProber {
    pub fn new(
        candidates: Vec<String>,
        timeout: Duration,
        liveness: Arc<dyn LivenessCheck>,
        store: Arc<dyn EndpointStore>,
    ) -> Self {
        Self {
            candidates,
            timeout,
            liveness,
            store,
        }
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Upper bound on how long [`probe`](Self::probe) can take.
    pub fn worst_case(&self) -> Duration {
        self.timeout.saturating_mul(self.candidates.len() as u32)
    }

    /// Return the first healthy candidate in list order.
    pub async fn probe(&self) -> Result<ProbeOutcome, DataError> {
        for (index, url) in self.candidates.iter().enumerate() {
            match self.liveness.check(url, self.timeout).await {
                Ok(()) => {
                    tracing::info!(url = %url, index, "Endpoint is healthy");
                    self.store.save(url);
                    return Ok(ProbeOutcome {
                        url: url.clone(),
                        source: ProbeSource::Live { index },
                    });
                }
                Err(e) => {
                    let next = self.candidates.get(index + 1);
                    tracing::warn!(
                        url = %url,
                        error = %e,
                        next = next.map(String::as_str).unwrap_or("none"),
                        "Endpoint failed liveness check, trying next"
                    );
                }
            }
        }

        if let Some(url) = self.store.load() {
            tracing::warn!(
                url = %url,
                tried = self.candidates.len(),
                "All candidates failed, falling back to remembered endpoint"
            );
            return Ok(ProbeOutcome {
                url,
                source: ProbeSource::Remembered,
            });
        }

        tracing::error!(tried = self.candidates.len(), "No endpoint available");
        Err(DataError::NoEndpoint {
            tried: self.candidates.len(),
        })
    }
}

impl std::fmt::Debug for EndpointProber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointProber")
            .field("candidates", &self.candidates)
            .field("timeout", &self.timeout)
            .finish()
    }
}
