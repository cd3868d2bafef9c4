//! brokerbot-runner: fan one equity order out across every account of every
//! configured brokerage login.
//!
//! Reads `config.toml` and provider credentials from the environment, logs
//! in to each provider concurrently, discovers accounts, and then reports
//! accounts, reports holdings, or drives the per-attempt order state machine
//! with progress sent to the console and an optional chat webhook.

pub mod config;
pub mod credentials;
pub mod error;
pub mod execution;
pub mod executor;
pub mod holdings;
pub mod notify;
pub mod session;
