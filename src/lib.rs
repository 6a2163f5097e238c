//! Notification Client - Main Library
//!
//! Top-level crate for the realtime notification client.
//!
//! ## Architecture
//!
//! - **bin_common**: Common utilities for binary executables (config path, runner)
//! - **notify_stream**: Realtime delivery client and inbox reconciliation (re-exported from workspace)
//!
//! ## Usage in Binaries
//!
//! ```rust,no_run
//! use notification_client::bin_common::{load_config_from_env, ConfigType};
//! use notification_client::notify_stream::ClientConfig;
//!
//! let config = ClientConfig::load(load_config_from_env(ConfigType::Client));
//! ```

// Re-export workspace libraries for convenience
pub use notify_stream;

// Binary common utilities
pub mod bin_common {
    //! Common utilities for binary executables

    pub mod cli;
    pub mod runner;

    pub use cli::{load_config_from_env, parse_args, ConfigType, TailArgs, TOKEN_ENV};
    pub use runner::{init_tracing, wait_for_shutdown, BinaryRunner, RunConfig};
}
