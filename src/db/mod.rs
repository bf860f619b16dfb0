//! Data access: endpoint selection, retrying HTTP, and the query builder.

pub mod client;
pub mod envelope;
pub mod executor;
pub mod postgrest;
pub mod probe;
pub mod query;
pub mod rest;
pub mod transform;
pub mod transport;

pub use client::{CORE_TABLES, ClientState, DataClient, HealthStatus, TableCheck, UserStats};
pub use envelope::Envelope;
pub use executor::{HttpExecutor, HttpResponse, RetryPolicy};
pub use postgrest::PostgrestTransport;
pub use probe::{
    EndpointProber, EndpointStore, HttpLivenessCheck, LivenessCheck, MemoryEndpointStore, ProbeOutcome,
    ProbeSource,
};
pub use query::{OrderBy, QueryAction, QueryBuilder, QueryRequest, SortDirection};
pub use rest::RestTransport;
pub use transform::{PayloadTransform, TransformRegistry};
pub use transport::{HttpRequest, RequestContext, ResponseBody, Transport, transport_for};
