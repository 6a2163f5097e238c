//! CLI utilities for binaries
//!
//! Handles configuration path resolution, the token variable and
//! command line arguments for all binary executables.

use std::path::PathBuf;

/// Environment variable holding the bearer token
pub const TOKEN_ENV: &str = "NOTIFY_TOKEN";

/// Type of configuration to load
#[derive(Debug, Clone)]
pub enum ConfigType {
    /// Realtime client configuration (config/notify.yaml)
    Client,
    /// Custom path
    Custom(String),
}

impl ConfigType {
    /// Get the default path for this config type
    pub fn default_path(&self) -> &str {
        match self {
            ConfigType::Client => "config/notify.yaml",
            ConfigType::Custom(path) => path,
        }
    }

    /// Get the environment variable name for this config type
    pub fn env_var_name(&self) -> &str {
        "NOTIFY_CONFIG_PATH"
    }
}

/// Load configuration path from environment or use default
///
/// A `Custom` path always wins over the environment.
pub fn load_config_from_env(config_type: ConfigType) -> PathBuf {
    if let ConfigType::Custom(path) = &config_type {
        return PathBuf::from(path);
    }
    std::env::var(config_type.env_var_name())
        .unwrap_or_else(|_| config_type.default_path().to_string())
        .into()
}

/// Arguments of `notify-tail`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailArgs {
    /// Identity to connect as
    pub identity: String,
    /// Config file given with `--config`
    pub config: Option<String>,
    /// Fetch the unread count over HTTP on every (re)connect
    pub resync: bool,
}

/// Parse command line arguments (excluding the program name)
///
/// `notify-tail <identity> [--config PATH] [--resync]`
pub fn parse_args<I>(args: I) -> Result<TailArgs, String>
where
    I: IntoIterator<Item = String>,
{
    let mut identity = None;
    let mut config = None;
    let mut resync = false;

    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                config = Some(args.next().ok_or("--config needs a path")?);
            }
            "--resync" => resync = true,
            flag if flag.starts_with("--") => return Err(format!("unknown flag {}", flag)),
            _ if identity.is_none() => identity = Some(arg),
            _ => return Err(format!("unexpected argument {}", arg)),
        }
    }

    let identity = identity
        .filter(|id| !id.trim().is_empty())
        .ok_or("usage: notify-tail <identity> [--config PATH] [--resync]")?;

    Ok(TailArgs {
        identity,
        config,
        resync,
    })
}
