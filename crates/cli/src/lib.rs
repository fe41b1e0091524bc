// Document HTTP API
pub mod http_server;
// Latency summaries for batch runs
pub mod metrics;
// Logging bootstrap
pub mod process;
// App state (configuration, paths, keys)
pub mod state;

pub use metrics::LatencyReport;
pub use process::{init_logging, LogConfig};
pub use state::{AppConfig, AppState, StateError, StorageConfig};
