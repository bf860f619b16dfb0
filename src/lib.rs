//! Trading journal client.
//!
//! The data-access core lives in [`db`]: an endpoint prober picks a
//! reachable backend from an ordered candidate list, a retrying executor
//! performs HTTP calls, and [`db::DataClient::from`] starts a chainable query
//! whose terminal `.await` always resolves to a `{data, error}` envelope.
//! [`journal`] builds strategies, analyses and users on top of it.

pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod journal;

pub use config::ClientConfig;
pub use db::{DataClient, Envelope};
pub use error::{ConfigError, DataError, ValidationError};
