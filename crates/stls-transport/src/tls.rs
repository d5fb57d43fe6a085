//! TLS stream-wrapping service.
//!
//! - [`StreamWrapper`]: turns a leased socket pipe into a TLS stream,
//!   performing the handshake before it resolves.
//! - [`RustlsWrapper`]: the default server-side implementation on top of
//!   tokio-rustls.

use std::future::Future;
use std::io::{self, Read};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use stls_config::TlsConfig;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls;
use tokio_util::sync::CancellationToken;

use crate::cert::Certificate;
use crate::error::TransportError;
use crate::pipe::PipeIo;

/// A duplex stream that encrypts what is written and decrypts what is read.
pub trait TlsIo: AsyncRead + AsyncWrite + Send + Unpin {
    /// Queue a close_notify alert; it is sent on the next flush.
    fn send_close_notify(&mut self);

    /// Protocol agreed through ALPN, if any.
    fn alpn_protocol(&self) -> Option<&[u8]>;

    /// Move plaintext the session has already decrypted into `out`.
    ///
    /// Never touches the underlying transport: ciphertext still sitting in
    /// the socket pipe stays there.
    fn drain_plaintext(&mut self, out: &mut Vec<u8>) -> io::Result<()>;
}

impl<IO> TlsIo for tokio_rustls::server::TlsStream<IO>
where
    IO: AsyncRead + AsyncWrite + Send + Unpin,
{
    fn send_close_notify(&mut self) {
        self.get_mut().1.send_close_notify();
    }

    fn alpn_protocol(&self) -> Option<&[u8]> {
        self.get_ref().1.alpn_protocol()
    }

    fn drain_plaintext(&mut self, out: &mut Vec<u8>) -> io::Result<()> {
        let session = self.get_mut().1;
        session
            .process_new_packets()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let mut chunk = [0u8; 4096];
        loop {
            match session.reader().read(&mut chunk) {
                Ok(0) => return Ok(()),
                Ok(n) => out.extend_from_slice(&chunk[..n]),
                // Nothing more buffered, or the peer left without close_notify.
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::UnexpectedEof
                    ) =>
                {
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Wraps a socket pipe in TLS.
///
/// Implementations must complete (or fail) the handshake before resolving
/// and must return promptly once `cancel` fires. On failure the leased pipe
/// is dropped, which returns it to its owner; bytes read during the attempt
/// are gone.
pub trait StreamWrapper: Send + Sync + 'static {
    fn wrap<'a>(
        &'a self,
        io: PipeIo,
        certificate: &'a Certificate,
        cancel: &'a CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn TlsIo>, TransportError>> + Send + 'a>>;
}

static TLS12_ONLY: [&rustls::SupportedProtocolVersion; 1] = [&rustls::version::TLS12];
static TLS13_ONLY: [&rustls::SupportedProtocolVersion; 1] = [&rustls::version::TLS13];
static TLS12_AND_TLS13: [&rustls::SupportedProtocolVersion; 2] =
    [&rustls::version::TLS12, &rustls::version::TLS13];

/// Server-side TLS via rustls.
#[derive(Debug, Clone)]
pub struct RustlsWrapper {
    versions: &'static [&'static rustls::SupportedProtocolVersion],
    alpn: Vec<Vec<u8>>,
    handshake_timeout: Duration,
}

impl RustlsWrapper {
    pub fn new(cfg: &TlsConfig) -> Self {
        let versions: &'static [&'static rustls::SupportedProtocolVersion] =
            match (cfg.min_version.as_str(), cfg.max_version.as_str()) {
                ("tls13", "tls13") => &TLS13_ONLY,
                ("tls12", "tls12") => &TLS12_ONLY,
                _ => &TLS12_AND_TLS13,
            };

        Self {
            versions,
            alpn: cfg.alpn.iter().map(|p| p.as_bytes().to_vec()).collect(),
            handshake_timeout: Duration::from_secs(cfg.handshake_timeout_secs),
        }
    }

    fn server_config(&self, certificate: &Certificate) -> Result<rustls::ServerConfig, TransportError> {
        let provider = rustls::crypto::CryptoProvider::get_default()
            .cloned()
            .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()));

        let mut config = rustls::ServerConfig::builder_with_provider(provider)
            .with_protocol_versions(self.versions)?
            .with_no_client_auth()
            .with_single_cert(certificate.chain().to_vec(), certificate.key())?;
        config.alpn_protocols = self.alpn.clone();

        Ok(config)
    }
}

impl Default for RustlsWrapper {
    fn default() -> Self {
        Self::new(&TlsConfig::default())
    }
}

impl StreamWrapper for RustlsWrapper {
    fn wrap<'a>(
        &'a self,
        io: PipeIo,
        certificate: &'a Certificate,
        cancel: &'a CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn TlsIo>, TransportError>> + Send + 'a>> {
        Box::pin(async move {
            let acceptor = TlsAcceptor::from(Arc::new(self.server_config(certificate)?));
            let handshake = tokio::time::timeout(self.handshake_timeout, acceptor.accept(io));

            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(TransportError::Cancelled),
                res = handshake => match res {
                    Err(_) => Err(TransportError::HandshakeTimeout),
                    Ok(Err(e)) => Err(TransportError::Io(e)),
                    Ok(Ok(stream)) => Ok(Box::new(stream) as Box<dyn TlsIo>),
                },
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipe::DuplexPipe;
    use tokio::io::{AsyncWriteExt, duplex};

    #[test]
    fn version_bounds_from_config() {
        let mut cfg = TlsConfig::default();
        assert_eq!(RustlsWrapper::new(&cfg).versions.len(), 2);

        cfg.min_version = "tls13".into();
        let wrapper = RustlsWrapper::new(&cfg);
        assert_eq!(wrapper.versions.len(), 1);
        assert_eq!(wrapper.versions[0].version, rustls::ProtocolVersion::TLSv1_3);

        cfg.min_version = "tls12".into();
        cfg.max_version = "tls12".into();
        let wrapper = RustlsWrapper::new(&cfg);
        assert_eq!(wrapper.versions[0].version, rustls::ProtocolVersion::TLSv1_2);
        // The bounds must be accepted by the rustls builder.
        let cert = Certificate::self_signed(&["localhost"]).unwrap();
        wrapper.server_config(&cert).unwrap();
    }

    #[tokio::test]
    async fn garbage_client_hello_fails() {
        let (mut peer, local) = duplex(1024);
        let pipe = DuplexPipe::from_stream(local);
        let cert = Certificate::self_signed(&["localhost"]).unwrap();
        let wrapper = RustlsWrapper::default();

        peer.write_all(b"USER anonymous\r\n").await.unwrap();
        let io = pipe.lease().unwrap();
        let counter = io.read_counter();
        let res = wrapper.wrap(io, &cert, &CancellationToken::new()).await;

        assert!(matches!(res, Err(TransportError::Io(_))));
        assert!(counter.get() > 0);
        assert!(!pipe.is_leased());
    }

    #[tokio::test]
    async fn cancel_interrupts_handshake() {
        let (_peer, local) = duplex(1024);
        let pipe = DuplexPipe::from_stream(local);
        let cert = Certificate::self_signed(&["localhost"]).unwrap();
        let wrapper = RustlsWrapper::default();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let res = wrapper.wrap(pipe.lease().unwrap(), &cert, &cancel).await;
        assert!(matches!(res, Err(TransportError::Cancelled)));
    }
}
