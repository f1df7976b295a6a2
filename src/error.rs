use std::time::Duration;

use thiserror::Error;

// Every variant is terminal for the task that observed it, except `Timeout`, which a load
// worker logs and survives.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write command: {source}")]
    Write {
        #[source]
        source: std::io::Error,
    },
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("connection closed by peer")]
    Closed,
}

impl ConnectionError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}
