mod outgoing;
mod settings;

use std::path::PathBuf;

pub use outgoing::{Connector, MaybeTlsStream};
pub use settings::TlsConfig;

#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("Could not read {note} file {filename:?}: {err}")]
    FileReadFailed {
        note: &'static str,
        filename: PathBuf,
        err: std::io::Error,
    },
    #[error("Identity certificate is missing a key")]
    MissingKey,
    #[error("Identity key is missing a certificate")]
    MissingCertificate,
    #[error("Certificate and PrivateKey must be set")]
    MissingCertAndKey,
    #[error("Certificate file contains no certificates")]
    EmptyCertificate,
    #[error("Could not parse certificate in {filename:?}: {err}")]
    CertificateParse {
        filename: PathBuf,
        err: std::io::Error,
    },
    #[error("Could not parse private key in {filename:?}: {err}")]
    PrivateKeyParse {
        filename: PathBuf,
        err: std::io::Error,
    },
    #[error("TLS handshake failed: {0}")]
    Handshake(std::io::Error),
    #[error("Invalid Server Name {0:?}")]
    InvalidServerName(String),
    #[error("Error building TLS config: {0}")]
    TlsBuild(rustls::Error),
    #[error(transparent)]
    Connect(std::io::Error),
}
