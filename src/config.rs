// src/config.rs

//! Connection options: defaults, TOML loading, and folding a connection URL
//! into concrete fields.

use crate::core::LinkError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

const URL_SCHEME: &str = "redis";
const TLS_URL_SCHEME: &str = "rediss";

/// Parameters for the single connection owned by a `ConnectionManager`.
///
/// A bare string passed to `ConnectionManager::connect` is treated as `url`.
/// When `url` is set, anything it specifies overrides the matching field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectOptions {
    /// `redis://[username:password@]host[:port][/database]`
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Logical database selected right after the connection is established.
    #[serde(default)]
    pub database: u32,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Sent with `CLIENT SETNAME` during the handshake.
    #[serde(default)]
    pub client_name: Option<String>,

    #[serde(with = "humantime_serde", default = "default_connect_timeout")]
    pub connect_timeout: Duration,

    /// Per-command reply deadline. `None` waits indefinitely.
    #[serde(with = "humantime_serde", default)]
    pub command_timeout: Option<Duration>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    6379
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(5)
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            url: None,
            host: default_host(),
            port: default_port(),
            database: 0,
            username: None,
            password: None,
            client_name: None,
            connect_timeout: default_connect_timeout(),
            command_timeout: None,
        }
    }
}

impl From<&str> for ConnectOptions {
    fn from(url: &str) -> Self {
        Self::from(url.to_string())
    }
}

impl From<String> for ConnectOptions {
    fn from(url: String) -> Self {
        Self {
            url: Some(url),
            ..Self::default()
        }
    }
}

impl ConnectOptions {
    /// Options pointing at `host:port` with every other field defaulted.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn with_database(mut self, database: u32) -> Self {
        self.database = database;
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = Some(name.into());
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }

    /// Parses options from a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let options: ConnectOptions =
            toml::from_str(content).context("invalid connection options")?;
        options.resolve()?;
        Ok(options)
    }

    /// Loads options from a TOML file.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// Returns a copy with `url` folded into the concrete fields and cleared.
    pub fn resolve(&self) -> Result<ConnectOptions, LinkError> {
        let mut resolved = self.clone();
        let Some(raw) = resolved.url.take() else {
            return Ok(resolved);
        };

        let url = Url::parse(&raw)
            .map_err(|e| LinkError::InvalidConfig(format!("cannot parse url '{raw}': {e}")))?;

        match url.scheme() {
            URL_SCHEME => {}
            TLS_URL_SCHEME => {
                return Err(LinkError::InvalidConfig(format!(
                    "TLS connections ('{TLS_URL_SCHEME}://') are not supported"
                )));
            }
            other => {
                return Err(LinkError::InvalidConfig(format!(
                    "unsupported url scheme '{other}', expected '{URL_SCHEME}://'"
                )));
            }
        }

        if let Some(host) = url.host_str() {
            // IPv6 hosts come back bracketed.
            resolved.host = host.trim_start_matches('[').trim_end_matches(']').to_string();
        }
        if let Some(port) = url.port() {
            resolved.port = port;
        }
        if !url.username().is_empty() {
            resolved.username = Some(decode_component(url.username())?);
        }
        if let Some(password) = url.password() {
            resolved.password = Some(decode_component(password)?);
        }

        let path = url.path().trim_start_matches('/');
        if !path.is_empty() {
            resolved.database = path.parse().map_err(|_| {
                LinkError::InvalidConfig(format!("database index '{path}' is not a number"))
            })?;
        }

        Ok(resolved)
    }

    /// `host:port`, ready for `TcpStream::connect`.
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

fn decode_component(raw: &str) -> Result<String, LinkError> {
    urlencoding::decode(raw)
        .map(|decoded| decoded.into_owned())
        .map_err(|e| LinkError::InvalidConfig(format!("cannot decode '{raw}': {e}")))
}
