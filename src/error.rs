use thiserror::Error;

use crate::types::EntityKind;

/// Final outcome of delivering one batch to one subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Failed(FailureReason),
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered)
    }
}

/// Reasons why an HTTP delivery attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureReason {
    #[error("request timed out")]
    Timeout,

    #[error("network error")]
    Network,

    #[error("remote endpoint returned {0}")]
    RemoteError(u16),

    #[error("client error {0} (non-retryable)")]
    ClientError(u16),

    #[error("batch could not be serialized")]
    Serialization,

    #[error("maximum retries exceeded")]
    MaxRetriesExceeded,

    #[error("delivery task aborted")]
    Aborted,
}

impl FailureReason {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FailureReason::Timeout | FailureReason::Network | FailureReason::RemoteError(_)
        )
    }
}

/// A single change could not be converted to its wire payload.
#[derive(Debug, Error)]
pub enum MappingError {
    #[error("{kind} change has a non-finite coordinate")]
    InvalidCoordinate { kind: EntityKind },

    #[error("{kind} payload serialization failed: {source}")]
    Serialize {
        kind: EntityKind,
        #[source]
        source: serde_json::Error,
    },
}

/// Geofence could not be evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeofenceError {
    #[error("polygon {index} has fewer than 3 vertices")]
    Degenerate { index: usize },

    #[error("polygon {index} contains a non-finite vertex")]
    NonFinite { index: usize },

    #[error("point is not finite")]
    InvalidPoint,
}

/// Failure reading from an ingestion source.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("malformed change message: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("source connection failed: {0}")]
    Connection(String),
}

/// Rejected subscriber list.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("duplicate subscriber name: {0}")]
    DuplicateName(String),

    #[error("subscriber {0} has an empty url")]
    EmptyUrl(String),
}

/// Configuration could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(transparent)]
    Invalid(#[from] RegistryError),
}
