use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::{fs, io};

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, Error, SignatureScheme};
use serde::{Deserialize, Serialize};

use super::TlsError;

/// Client identity presented to ZooKeeper servers which require TLS client
/// authentication. The server certificate is never verified.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TlsConfig {
    /// Path to the certificate file used to identify this connection, in
    /// PEM format (X.509). If this is set, "key" must also be set.
    pub cert: Option<PathBuf>,

    /// Path to the private key file used to identify this connection, in
    /// PEM format (PKCS#8). If this is set, "cert" must also be set.
    pub key: Option<PathBuf>,

    /// Pass phrase used to unlock the encrypted key file. This has no effect
    /// unless "key" is set.
    pub key_pass: Option<String>,
}

impl TlsConfig {
    pub fn client_config(&self) -> Result<ClientConfig, TlsError> {
        let (cert_file, key_file) = match (&self.cert, &self.key) {
            (Some(cert), Some(key)) => (cert, key),
            (Some(_), None) => return Err(TlsError::MissingKey),
            (None, Some(_)) => return Err(TlsError::MissingCertificate),
            (None, None) => return Err(TlsError::MissingCertAndKey),
        };

        let certs = load_certs(cert_file)?;
        if certs.is_empty() {
            return Err(TlsError::EmptyCertificate);
        }
        let key = load_private_key(key_file, self.key_pass.as_deref())?;

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        ClientConfig::builder_with_provider(Arc::clone(&provider))
            .with_safe_default_protocol_versions()
            .map_err(TlsError::TlsBuild)?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert { provider }))
            .with_client_auth_cert(certs, key)
            .map_err(TlsError::TlsBuild)
    }
}

/// Four-letter-word endpoints have no server side certificate
/// authentication, every presented certificate is accepted. Handshake
/// signatures are still checked, so the peer must own the key it presented.
#[derive(Debug)]
struct AcceptAnyServerCert {
    provider: Arc<CryptoProvider>,
}

impl rustls::client::danger::ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

fn load_certs(filename: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let content = fs::read(filename).map_err(|err| TlsError::FileReadFailed {
        note: "certificate",
        filename: filename.to_path_buf(),
        err,
    })?;

    let certs = pem::parse_many(content)
        .map_err(|err| TlsError::CertificateParse {
            filename: filename.to_path_buf(),
            err: io::Error::new(io::ErrorKind::InvalidData, err),
        })?
        .into_iter()
        .filter(|p| p.tag() == "CERTIFICATE")
        .map(|p| CertificateDer::from(p.into_contents()))
        .collect::<Vec<_>>();

    Ok(certs)
}

fn load_private_key(
    filename: &Path,
    password: Option<&str>,
) -> Result<PrivateKeyDer<'static>, TlsError> {
    use pkcs8::der::Decode;

    let invalid = |err: String| TlsError::PrivateKeyParse {
        filename: filename.to_path_buf(),
        err: io::Error::new(io::ErrorKind::InvalidData, err),
    };

    let expected_tag = match password {
        Some(_) => "ENCRYPTED PRIVATE KEY",
        None => "PRIVATE KEY",
    };

    let content = fs::read(filename).map_err(|err| TlsError::FileReadFailed {
        note: "private key",
        filename: filename.to_path_buf(),
        err,
    })?;

    let Some(key) = pem::parse_many(content)
        .map_err(|err| invalid(err.to_string()))?
        .into_iter()
        .find(|p| p.tag() == expected_tag)
        .map(|p| p.into_contents())
    else {
        return Err(invalid(format!("no {expected_tag} found in PEM file")));
    };

    match password {
        Some(password) => {
            let encrypted = pkcs8::EncryptedPrivateKeyInfo::from_der(&key)
                .map_err(|err| invalid(err.to_string()))?;
            let decrypted = encrypted
                .decrypt(password)
                .map_err(|err| invalid(err.to_string()))?;

            PrivateKeyDer::try_from(decrypted.as_bytes().to_owned())
                .map_err(|err| invalid(err.to_string()))
        }
        None => PrivateKeyDer::try_from(key).map_err(|err| invalid(err.to_string())),
    }
}
