use thiserror::Error;

/// Tenant sizing: units, distribution, erasure code and memory calculations
pub mod sizing;

/// Erasure set parity enumeration for a server/drive topology
pub mod parity;

/// Tenant creation wizard state
pub mod wizard;

/// Collaborator contracts and their REST and Kubernetes implementations
pub mod api;

/// Web server state and handlers
pub mod server;

/// Environment configuration
pub mod config;

/// Log and trace integrations
pub mod telemetry;

/// Metrics
mod metrics;
pub use metrics::Metrics;

#[derive(Error, Debug)]
pub enum Error {
    #[error("SerializationError: {0}")]
    SerializationError(#[source] serde_json::Error),

    #[error("Kube Error: {0}")]
    KubeError(#[source] kube::Error),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Api error ({status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Invalid topology: {0}")]
    InvalidTopology(String),

    #[error("Invalid parity: {0}")]
    InvalidParity(String),

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("Config error: {0}")]
    ConfigError(String),
}
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn metric_label(&self) -> String {
        let label = match self {
            Error::SerializationError(_) => "serialization",
            Error::KubeError(_) => "kube",
            Error::NetworkError(_) => "network",
            Error::ApiError { .. } => "api",
            Error::InvalidTopology(_) => "invalid_topology",
            Error::InvalidParity(_) => "invalid_parity",
            Error::InvalidQuantity(_) => "invalid_quantity",
            Error::ConfigError(_) => "config",
        };

        label.to_string()
    }
}
