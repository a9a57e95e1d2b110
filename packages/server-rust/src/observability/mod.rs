//! Logging and metrics plumbing shared by the server and the item client.

pub mod logging;
pub mod metrics;

pub use self::logging::{init_tracing, LogFormat};
pub use self::metrics::{install_metrics, CallObservation, CLIENT_METRICS, SERVER_METRICS};
