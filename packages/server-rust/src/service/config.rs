use std::time::Duration;

use crate::store::RetryPolicy;

/// Configuration for the RPC pipeline and the order service behind it.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Artificial delay added to every call. Zero disables the sleeper stage.
    pub sleeper_delay: Duration,
    /// Deadline applied to calls that do not carry a shorter `grpc-timeout`.
    pub default_call_timeout: Duration,
    /// Reject calls that present no bearer credential.
    pub require_auth: bool,
    /// Seed the order book with fixture orders at construction.
    pub load_sample_data: bool,
    /// Retry policy for item lookups that fail as unavailable.
    pub item_retry: RetryPolicy,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            sleeper_delay: Duration::ZERO,
            default_call_timeout: Duration::from_secs(30),
            require_auth: false,
            load_sample_data: true,
            item_retry: RetryPolicy::default(),
        }
    }
}
