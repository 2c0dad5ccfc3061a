use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use framework::tls::{Connector, TlsError};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{Instant, timeout_at};

pub const MNTR: &str = "mntr";
pub const RUOK: &str = "ruok";
pub const IMOK: &str = "imok";

/// Upper bound of a probe timeout, larger values are clamped.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("cannot resolve zk hostname {host:?}: {err}")]
    Resolve { host: String, err: io::Error },
    #[error("cannot connect to {host:?}: {err}")]
    Connect { host: String, err: TlsError },
    #[error("failed to send {command:?} to {host:?}: {err}")]
    Write {
        command: &'static str,
        host: String,
        err: io::Error,
    },
    #[error("failed to read {command:?} response from {host:?}: {err}")]
    Read {
        command: &'static str,
        host: String,
        err: io::Error,
    },
}

fn timed_out() -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, "deadline exceeded")
}

/// Issues four-letter-word commands. Every command gets its own connection,
/// and a single deadline bounds resolving, connecting, writing and reading.
#[derive(Clone)]
pub struct Prober {
    connector: Connector,
    timeout: Duration,
}

impl Prober {
    pub fn new(connector: Connector, timeout: Duration) -> Self {
        Self {
            connector,
            timeout: timeout.min(MAX_TIMEOUT),
        }
    }

    /// Send `command` to `target` (`host:port`) and read the response until
    /// the server closes the connection.
    pub async fn probe(&self, target: &str, command: &'static str) -> Result<String, ProbeError> {
        let now = Instant::now();
        let deadline = now.checked_add(self.timeout).unwrap_or(now);

        let addr = timeout_at(deadline, resolve(target))
            .await
            .unwrap_or_else(|_elapsed| Err(timed_out()))
            .map_err(|err| ProbeError::Resolve {
                host: target.to_string(),
                err,
            })?;

        let mut stream = timeout_at(deadline, self.connector.connect(server_name(target), &addr))
            .await
            .unwrap_or_else(|_elapsed| Err(TlsError::Connect(timed_out())))
            .map_err(|err| ProbeError::Connect {
                host: target.to_string(),
                err,
            })?;

        timeout_at(deadline, stream.write_all(command.as_bytes()))
            .await
            .unwrap_or_else(|_elapsed| Err(timed_out()))
            .map_err(|err| ProbeError::Write {
                command,
                host: target.to_string(),
                err,
            })?;

        let mut buf = Vec::with_capacity(4 * 1024);
        let read = timeout_at(deadline, stream.read_to_end(&mut buf))
            .await
            .unwrap_or_else(|_elapsed| Err(timed_out()));
        match read {
            Ok(_) => {}
            // ZooKeeper may close a TLS connection without close_notify
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof && self.connector.is_tls() => {}
            Err(err) => {
                return Err(ProbeError::Read {
                    command,
                    host: target.to_string(),
                    err,
                });
            }
        }

        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

/// Resolve on every call, so a scrape always follows the current topology.
async fn resolve(target: &str) -> io::Result<SocketAddr> {
    tokio::net::lookup_host(target).await?.next().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("no address found for {target}"),
        )
    })
}

/// The host part of `host:port` or `[v6]:port`, used as the TLS server name.
fn server_name(target: &str) -> &str {
    if let Some(rest) = target.strip_prefix('[') {
        if let Some((host, _port)) = rest.split_once(']') {
            return host;
        }
    }

    target.rsplit_once(':').map_or(target, |(host, _port)| host)
}
