use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use pin_project_lite::pin_project;
use rustls::pki_types::ServerName;
use tokio::io::{self, AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;

use super::{TlsConfig, TlsError};

pin_project! {
    /// An outgoing connection which is either plain TCP or wrapped by TLS.
    #[project = MaybeTlsProj]
    pub enum MaybeTlsStream {
        Raw { #[pin] raw: TcpStream },
        Tls { #[pin] tls: TlsStream<TcpStream> },
    }
}

impl AsyncRead for MaybeTlsStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.project() {
            MaybeTlsProj::Raw { raw } => raw.poll_read(cx, buf),
            MaybeTlsProj::Tls { tls } => tls.poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for MaybeTlsStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.project() {
            MaybeTlsProj::Raw { raw } => raw.poll_write(cx, buf),
            MaybeTlsProj::Tls { tls } => tls.poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.project() {
            MaybeTlsProj::Raw { raw } => raw.poll_flush(cx),
            MaybeTlsProj::Tls { tls } => tls.poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.project() {
            MaybeTlsProj::Raw { raw } => raw.poll_shutdown(cx),
            MaybeTlsProj::Tls { tls } => tls.poll_shutdown(cx),
        }
    }
}

/// Opens outgoing connections, optionally wrapped by TLS. The TLS client config
/// is built once and shared by every connection.
#[derive(Clone)]
pub struct Connector {
    tls: Option<TlsConnector>,
}

impl Connector {
    pub fn new(config: Option<&TlsConfig>) -> Result<Self, TlsError> {
        let tls = match config {
            Some(config) => Some(TlsConnector::from(Arc::new(config.client_config()?))),
            None => None,
        };

        Ok(Self { tls })
    }

    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }

    pub async fn connect(
        &self,
        host: &str,
        addr: &SocketAddr,
    ) -> Result<MaybeTlsStream, TlsError> {
        let stream = TcpStream::connect(addr).await.map_err(TlsError::Connect)?;

        match &self.tls {
            None => Ok(MaybeTlsStream::Raw { raw: stream }),
            Some(connector) => {
                let name = ServerName::try_from(host.to_string())
                    .map_err(|_| TlsError::InvalidServerName(host.to_string()))?;
                let tls = connector
                    .connect(name, stream)
                    .await
                    .map_err(TlsError::Handshake)?;

                debug!(message = "Negotiated TLS", %addr);

                Ok(MaybeTlsStream::Tls { tls })
            }
        }
    }
}
