pub mod config;
pub mod connection;
pub mod error;
pub mod load;
pub mod parser;
pub mod series;
pub mod telemetry;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use connection::{Connection, ConnectionSettings};
pub use error::ConnectionError;
pub use load::{LoadCoordinator, LoadSummary, LoadWorker, WorkerReport};
pub use parser::parse_numeric;
pub use series::{Sample, TimeSeries};
pub use telemetry::TelemetryReader;
