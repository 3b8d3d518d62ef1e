//! Server configuration.
//!
//! Everything has a default, so `ServerConfig::default()` is a working
//! development setup. [`ServerConfig::from_env`] reads overrides from the
//! process environment:
//!
//! | Variable | Meaning | Default |
//! |---|---|---|
//! | `SWITCHYARD_ADDR` | listen address | `0.0.0.0:3000` |
//! | `SWITCHYARD_ENV` | `development` or `production` | `development` |
//! | `SWITCHYARD_REQUEST_TIMEOUT_SECS` | per-request deadline, `0` disables | `30` |

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::Error;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Controls how much the top-level error sink reveals.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Environment {
    /// Error messages are sent to the client as-is.
    #[default]
    Development,
    /// Clients only see the status's reason phrase.
    Production,
}

impl Environment {
    fn parse(value: &str) -> Result<Self, Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => Err(Error::Config(format!("unknown environment `{other}`"))),
        }
    }
}

/// Settings the pipeline reads on every request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Settings {
    pub environment: Environment,
    /// `None` lets a request run forever.
    pub request_timeout: Option<Duration>,
}

impl Default for Settings {
    fn default() -> Self {
        Self { environment: Environment::default(), request_timeout: Some(DEFAULT_TIMEOUT) }
    }
}

/// Everything [`Server`](crate::Server) needs to start.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub settings: Settings,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            settings: Settings::default(),
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `SWITCHYARD_*` environment variables.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let mut config = Self::default();

        if let Some(addr) = lookup("SWITCHYARD_ADDR") {
            config.addr = addr.parse()
                .map_err(|e| Error::Config(format!("SWITCHYARD_ADDR `{addr}`: {e}")))?;
        }
        if let Some(env) = lookup("SWITCHYARD_ENV") {
            config.settings.environment = Environment::parse(&env)?;
        }
        if let Some(secs) = lookup("SWITCHYARD_REQUEST_TIMEOUT_SECS") {
            let secs: u64 = secs.trim().parse()
                .map_err(|e| Error::Config(format!("SWITCHYARD_REQUEST_TIMEOUT_SECS `{secs}`: {e}")))?;
            config.settings.request_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }

        Ok(config)
    }
}
