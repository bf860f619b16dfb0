//! The data client: one explicitly constructed handle bound to an endpoint.
//!
//! State machine:
//!
//! ```text
//! Uninitialized -> Probing -> Ready(url) -> [Rebinding(url) -> Ready(url')]*
//! ```
//!
//! The current base URL is the only shared mutable value. Builders copy it
//! at construction, so a rebind only affects builders created afterwards.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bootstrap::EndpointCache;
use crate::config::ClientConfig;
use crate::db::envelope::Envelope;
use crate::db::executor::HttpExecutor;
use crate::db::probe::{EndpointProber, EndpointStore, HttpLivenessCheck, LivenessCheck, ProbeOutcome};
use crate::db::query::QueryBuilder;
use crate::db::transform::TransformRegistry;
use crate::db::transport::{RequestContext, ResponseBody, Transport, transport_for};
use crate::error::DataError;

/// Tables the connection check verifies.
pub const CORE_TABLES: [&str; 3] = ["strategies", "users", "analysis_results"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientState {
    Uninitialized,
    Probing,
    Ready(String),
    /// A reprobe is running; queries keep using the previous URL.
    Rebinding(String),
}

impl ClientState {
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Ready(url) | Self::Rebinding(url) => Some(url),
            Self::Uninitialized | Self::Probing => None,
        }
    }
}

impl std::fmt::Display for ClientState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Probing => write!(f, "probing"),
            Self::Ready(url) => write!(f, "ready ({url})"),
            Self::Rebinding(url) => write!(f, "rebinding (serving {url})"),
        }
    }
}

/// Backend health as reported by the liveness endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    #[serde(default = "HealthStatus::default_status")]
    pub status: String,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl HealthStatus {
    fn default_status() -> String {
        "healthy".to_string()
    }

    pub fn unhealthy(error: impl Into<String>) -> Self {
        Self {
            status: "unhealthy".to_string(),
            database: None,
            timestamp: None,
            error: Some(error.into()),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.error.is_none()
            && (self.status.eq_ignore_ascii_case("healthy") || self.status.eq_ignore_ascii_case("ok"))
    }
}

/// Per-user counters from the stats endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStats {
    #[serde(default)]
    pub strategies: u64,
    #[serde(default)]
    pub analyses: u64,
}

/// Reachability of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableCheck {
    pub table: String,
    pub reachable: bool,
    pub error: Option<String>,
}

struct ClientInner {
    state: RwLock<ClientState>,
    transport: Arc<dyn Transport>,
    executor: Arc<HttpExecutor>,
    transforms: Arc<TransformRegistry>,
    prober: EndpointProber,
    context: RequestContext,
}

/// Cheaply cloneable handle; clones share the bound endpoint.
#[derive(Clone)]
pub struct DataClient {
    inner: Arc<ClientInner>,
}

impl DataClient {
    /// Wire a client from configuration. Nothing is probed yet.
    pub fn new(config: &ClientConfig) -> Self {
        let transport = transport_for(config);
        let executor = Arc::new(HttpExecutor::new(config.retry));
        let liveness = Arc::new(HttpLivenessCheck::new(executor.clone(), transport.clone()));
        let store = Arc::new(EndpointCache::new(&config.endpoint_cache_path));
        let prober = EndpointProber::new(config.endpoints.clone(), config.probe_timeout, liveness, store);
        let context = RequestContext {
            telegram_id: config.telegram_id.clone(),
        };
        Self::from_parts(
            transport,
            executor,
            prober,
            Arc::new(TransformRegistry::with_defaults()),
            context,
        )
    }

    /// Assemble a client from explicit parts (custom stores, fake liveness).
    pub fn from_parts(
        transport: Arc<dyn Transport>,
        executor: Arc<HttpExecutor>,
        prober: EndpointProber,
        transforms: Arc<TransformRegistry>,
        context: RequestContext,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                state: RwLock::new(ClientState::Uninitialized),
                transport,
                executor,
                transforms,
                prober,
                context,
            }),
        }
    }

    /// Build a prober for `config` over a caller-supplied store.
    pub fn prober_for(
        config: &ClientConfig,
        executor: Arc<HttpExecutor>,
        transport: Arc<dyn Transport>,
        store: Arc<dyn EndpointStore>,
    ) -> EndpointProber {
        let liveness: Arc<dyn LivenessCheck> = Arc::new(HttpLivenessCheck::new(executor, transport));
        EndpointProber::new(config.endpoints.clone(), config.probe_timeout, liveness, store)
    }

    /// Construct and probe in one step.
    pub async fn connect(config: &ClientConfig) -> Result<Self, DataError> {
        let client = Self::new(config);
        client.reprobe().await?;
        Ok(client)
    }

    /// Skip probing and bind to a known URL.
    pub fn with_endpoint(self, url: impl Into<String>) -> Self {
        self.rebind(url);
        self
    }

    pub fn state(&self) -> ClientState {
        self.inner
            .state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn set_state(&self, state: ClientState) {
        *self
            .inner
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = state;
    }

    pub fn base_url(&self) -> Option<String> {
        self.state().url().map(str::to_string)
    }

    pub fn transport_name(&self) -> &'static str {
        self.inner.transport.name()
    }

    pub fn prober(&self) -> &EndpointProber {
        &self.inner.prober
    }

    pub fn session_telegram_id(&self) -> Option<&str> {
        self.inner.context.telegram_id.as_deref()
    }

    /// Point the client at `url` without probing.
    pub fn rebind(&self, url: impl Into<String>) {
        let url = url.into().trim_end_matches('/').to_string();
        tracing::info!(url = %url, "Rebinding data client");
        self.set_state(ClientState::Ready(url));
    }

    /// Run the prober and bind to its answer.
    ///
    /// From `Ready` this passes through `Rebinding`, serving the old URL
    /// until the probe settles; a failed reprobe keeps the old binding.
    pub async fn reprobe(&self) -> Result<ProbeOutcome, DataError> {
        let previous = {
            let mut state = self
                .inner
                .state
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let previous = state.url().map(str::to_string);
            *state = match &previous {
                Some(url) => ClientState::Rebinding(url.clone()),
                None => ClientState::Probing,
            };
            previous
        };

        match self.inner.prober.probe().await {
            Ok(outcome) => {
                if previous.as_deref() != Some(outcome.url.as_str()) {
                    tracing::info!(
                        from = previous.as_deref().unwrap_or("none"),
                        to = %outcome.url,
                        "Data client bound to endpoint"
                    );
                }
                self.set_state(ClientState::Ready(outcome.url.clone()));
                Ok(outcome)
            }
            Err(e) => {
                self.set_state(match previous {
                    Some(url) => ClientState::Ready(url),
                    None => ClientState::Uninitialized,
                });
                Err(e)
            }
        }
    }

    /// Start a query chain on `table`.
    pub fn from(&self, table: &str) -> QueryBuilder {
        QueryBuilder::new(
            table,
            self.base_url(),
            self.inner.transport.clone(),
            self.inner.executor.clone(),
            self.inner.transforms.clone(),
            self.inner.context.clone(),
        )
    }

    /// Query the liveness endpoint once. Never fails; problems become
    /// `unhealthy`.
    pub async fn health_check(&self) -> HealthStatus {
        let Some(base) = self.base_url() else {
            return HealthStatus::unhealthy(DataError::NotConnected.to_string());
        };
        let request = self.inner.transport.liveness_request();
        let timeout = self.inner.executor.policy().timeout;
        match self.inner.executor.execute_once(&base, &request, timeout).await {
            Ok(response) => match response.body {
                ResponseBody::Json(body @ Value::Object(_)) => serde_json::from_value(body)
                    .unwrap_or_else(|e| HealthStatus::unhealthy(format!("unreadable health body: {e}"))),
                _ => HealthStatus {
                    status: "healthy".to_string(),
                    database: None,
                    timestamp: None,
                    error: None,
                },
            },
            Err(e) => {
                tracing::warn!(url = %base, error = %e, "Health check failed");
                HealthStatus::unhealthy(e.to_string())
            }
        }
    }

    /// Strategy and analysis counts for one user. A blank id has nothing
    /// to count and yields zeros without a request.
    pub async fn user_stats(&self, telegram_id: &str) -> Envelope<UserStats> {
        if telegram_id.trim().is_empty() {
            return Envelope::ok(UserStats::default());
        }
        let Some(base) = self.base_url() else {
            return Envelope::err(DataError::NotConnected.to_string());
        };
        let request = self.inner.transport.stats_request(telegram_id);
        let result = match self.inner.executor.execute(&base, &request).await {
            Ok(response) => self.inner.transport.decode(response.body),
            Err(e) => Err(e),
        };
        match result {
            Ok(data) => Envelope::from_result(Ok(data)).decode(),
            Err(e) => {
                tracing::warn!(telegram_id, error = %e, "Failed to load user stats");
                Envelope::err(e.to_string())
            }
        }
    }

    /// Probe each core table with a one-row read.
    pub async fn check_tables(&self) -> Vec<TableCheck> {
        let mut checks = Vec::with_capacity(CORE_TABLES.len());
        for table in CORE_TABLES {
            let envelope = self.from(table).select("id").limit(1).await;
            checks.push(TableCheck {
                table: table.to_string(),
                reachable: envelope.is_ok(),
                error: envelope.error,
            });
        }
        checks
    }
}

impl std::fmt::Debug for DataClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataClient")
            .field("state", &self.state())
            .field("transport", &self.inner.transport.name())
            .field("prober", &self.inner.prober)
            .finish()
    }
}
