use std::net::SocketAddr;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use crate::{Error, Result};

/// Adapter configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AdapterConfig {
    /// Listener settings.
    #[serde(default)]
    pub server: ServerSettings,
    /// Logging settings.
    #[serde(default)]
    pub log: LogSettings,
}

/// Listener settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Port to listen on, `""`/`"0"` for any free port, or a full `host:port`.
    #[serde(deserialize_with = "port_spec")]
    pub port: String,
}

// Env values such as `ADAPTER_SERVER_PORT=9070` arrive as integers.
fn port_spec<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PortSpec {
        Text(String),
        Number(u64),
    }

    Ok(match PortSpec::deserialize(deserializer)? {
        PortSpec::Text(port) => port,
        PortSpec::Number(port) => port.to_string(),
    })
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: "0".to_string(),
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogSettings {
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl AdapterConfig {
    /// Loads configuration from a TOML file and environment variables.
    ///
    /// Configuration priority: environment variables (`ADAPTER_SERVER_PORT`,
    /// `ADAPTER_LOG_FILTER`) > TOML file > defaults. A missing file is not
    /// an error.
    #[allow(clippy::result_large_err)]
    pub fn load(path: impl AsRef<Path>) -> figment::error::Result<Self> {
        use figment::providers::{Env, Format, Serialized, Toml};
        use figment::Figment;

        Figment::from(Serialized::defaults(AdapterConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("ADAPTER_").split("_"))
            .extract()
    }

    /// Checks that the port specifier can be handed to the listener.
    pub fn validate(&self) -> Result<()> {
        let port = self.server.port.as_str();
        if port.is_empty() || port.parse::<u16>().is_ok() || is_host_port(port) {
            return Ok(());
        }
        Err(Error::Config(format!(
            "server.port must be a port number or host:port, got {port:?}"
        )))
    }
}

// Host names are resolved by the listener, so only the shape is checked.
fn is_host_port(addr: &str) -> bool {
    if addr.parse::<SocketAddr>().is_ok() {
        return true;
    }
    match addr.rsplit_once(':') {
        Some((host, port)) => {
            !host.is_empty() && !host.contains(':') && port.parse::<u16>().is_ok()
        }
        None => false,
    }
}
