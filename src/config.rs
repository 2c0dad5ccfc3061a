use std::net::{AddrParseError, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use framework::tls::TlsConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::zookeeper::MAX_TIMEOUT;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file {path:?} failed: {err}")]
    Read {
        path: PathBuf,
        err: std::io::Error,
    },
    #[error("parse config file {path:?} failed: {err}")]
    Parse {
        path: PathBuf,
        err: serde_yaml::Error,
    },
    #[error("no zookeeper hosts configured")]
    NoTargets,
    #[error("invalid listen address {listen:?}: {err}")]
    InvalidListen {
        listen: String,
        err: AddrParseError,
    },
    #[error("metrics location {0:?} must start with '/'")]
    InvalidLocation(String),
    #[error("timeout must be between 1 and {max} seconds, got {got}")]
    InvalidTimeout { got: u64, max: u64 },
    #[error("concurrency must be greater than zero")]
    InvalidConcurrency,
}

fn default_listen() -> String {
    "0.0.0.0:9141".to_string()
}

fn default_location() -> String {
    "/metrics".to_string()
}

const fn default_timeout() -> u64 {
    30
}

const fn default_concurrency() -> usize {
    4
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Address the metrics endpoint listens on
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Path the metrics are served at
    #[serde(default = "default_location")]
    pub location: String,

    /// Deadline of every single probe, in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// ZooKeeper members to scrape, `host:port`. An entry may hold a comma
    /// separated list.
    #[serde(default)]
    pub hosts: Vec<String>,

    /// Present when connections to ZooKeeper use TLS client authentication
    #[serde(default)]
    pub tls: Option<TlsConfig>,

    /// How many members are probed at the same time
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            location: default_location(),
            timeout: default_timeout(),
            hosts: vec![],
            tls: None,
            concurrency: default_concurrency(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|err| ConfigError::Read {
            path: path.to_path_buf(),
            err,
        })?;

        serde_yaml::from_str(&content).map_err(|err| ConfigError::Parse {
            path: path.to_path_buf(),
            err,
        })
    }

    /// Every configured host, separated and trimmed.
    pub fn targets(&self) -> Vec<String> {
        self.hosts.iter().flat_map(|hosts| split_hosts(hosts)).collect()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Checks what can be checked without touching the network or the
    /// TLS identity files, and returns the listen address.
    pub fn validate(&self) -> Result<SocketAddr, ConfigError> {
        let addr = self
            .listen
            .parse::<SocketAddr>()
            .map_err(|err| ConfigError::InvalidListen {
                listen: self.listen.clone(),
                err,
            })?;

        if !self.location.starts_with('/') {
            return Err(ConfigError::InvalidLocation(self.location.clone()));
        }

        let max = MAX_TIMEOUT.as_secs();
        if self.timeout == 0 || self.timeout > max {
            return Err(ConfigError::InvalidTimeout {
                got: self.timeout,
                max,
            });
        }

        if self.concurrency == 0 {
            return Err(ConfigError::InvalidConcurrency);
        }

        if self.targets().is_empty() {
            return Err(ConfigError::NoTargets);
        }

        Ok(addr)
    }
}

/// Split a comma separated host list, dropping empty entries.
pub fn split_hosts(hosts: &str) -> Vec<String> {
    hosts
        .split(',')
        .map(str::trim)
        .filter(|host| !host.is_empty())
        .map(ToString::to_string)
        .collect()
}
