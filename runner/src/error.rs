//! Error types for the runner.

use std::path::PathBuf;

use brokerbot_broker::BrokerError;

/// All errors that can occur while setting up or driving a run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("credential error: {0}")]
    Credentials(String),

    #[error("{provider}: {source}")]
    Provider {
        provider: String,
        #[source]
        source: BrokerError,
    },

    #[error("no brokerage could be reached")]
    NoSessions,

    #[error("notification delivery failed: {0}")]
    Delivery(String),

    #[error("execution aborted: {0}")]
    Aborted(String),
}

pub type Result<T> = std::result::Result<T, Error>;
