//! Server certificates presented when a connection goes secure.

use std::fmt;
use std::io::BufRead;
use std::sync::Arc;

use rcgen::{CertificateParams, KeyPair, PKCS_ECDSA_P256_SHA256};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use stls_config::TlsConfig;

use crate::error::TransportError;

/// Certificate chain plus private key. Cheap to clone.
#[derive(Clone)]
pub struct Certificate {
    inner: Arc<Inner>,
}

struct Inner {
    chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
}

impl Certificate {
    pub fn new(
        chain: Vec<CertificateDer<'static>>,
        key: PrivateKeyDer<'static>,
    ) -> Result<Self, TransportError> {
        if chain.is_empty() {
            return Err(TransportError::Config("empty certificate chain".into()));
        }
        Ok(Self {
            inner: Arc::new(Inner { chain, key }),
        })
    }

    /// Parse a PEM certificate chain and a PEM private key.
    pub fn from_pem(cert_pem: &[u8], key_pem: &[u8]) -> Result<Self, TransportError> {
        let chain = read_certs(&mut &cert_pem[..], "certificate PEM")?;
        let key = read_key(&mut &key_pem[..], "key PEM")?;
        Self::new(chain, key)
    }

    /// Load certificate and private key from PEM files.
    pub fn from_pem_files(cert_path: &str, key_path: &str) -> Result<Self, TransportError> {
        let mut reader = std::io::BufReader::new(std::fs::File::open(cert_path)?);
        let chain = read_certs(&mut reader, cert_path)?;
        let mut reader = std::io::BufReader::new(std::fs::File::open(key_path)?);
        let key = read_key(&mut reader, key_path)?;
        Self::new(chain, key)
    }

    /// Load the pair named by `tls.cert` and `tls.key`; `None` when unset.
    pub fn from_config(cfg: &TlsConfig) -> Result<Option<Self>, TransportError> {
        match (&cfg.cert, &cfg.key) {
            (Some(cert), Some(key)) => Self::from_pem_files(cert, key).map(Some),
            _ => Ok(None),
        }
    }

    /// Generate a self-signed certificate in memory using rcgen.
    pub fn self_signed(names: &[&str]) -> Result<Self, TransportError> {
        let key_pair = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256)
            .map_err(|e| TransportError::CertGeneration(e.to_string()))?;

        let params = CertificateParams::new(names.iter().map(|n| n.to_string()).collect::<Vec<_>>())
            .map_err(|e| TransportError::CertGeneration(e.to_string()))?;
        let cert = params
            .self_signed(&key_pair)
            .map_err(|e| TransportError::CertGeneration(e.to_string()))?;

        let cert_der = CertificateDer::from(cert.der().to_vec());
        let key_der = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));

        Self::new(vec![cert_der], key_der)
    }

    /// The certificate chain, leaf first.
    pub fn chain(&self) -> &[CertificateDer<'static>] {
        &self.inner.chain
    }

    pub(crate) fn key(&self) -> PrivateKeyDer<'static> {
        self.inner.key.clone_key()
    }
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("chain_len", &self.inner.chain.len())
            .finish_non_exhaustive()
    }
}

fn read_certs(
    reader: &mut dyn BufRead,
    origin: &str,
) -> Result<Vec<CertificateDer<'static>>, TransportError> {
    let certs = rustls_pemfile::certs(reader)
        .map(|c| {
            c.map(|v| v.into_owned()).map_err(|e| {
                TransportError::Config(format!("invalid certificate in {}: {}", origin, e))
            })
        })
        .collect::<Result<Vec<CertificateDer<'static>>, _>>()?;

    if certs.is_empty() {
        return Err(TransportError::Config(format!(
            "no certificates found in {}",
            origin
        )));
    }
    Ok(certs)
}

fn read_key(reader: &mut dyn BufRead, origin: &str) -> Result<PrivateKeyDer<'static>, TransportError> {
    loop {
        match rustls_pemfile::read_one(reader)? {
            Some(rustls_pemfile::Item::Pkcs8Key(key)) => return Ok(PrivateKeyDer::Pkcs8(key)),
            Some(rustls_pemfile::Item::Pkcs1Key(key)) => return Ok(PrivateKeyDer::Pkcs1(key)),
            Some(rustls_pemfile::Item::Sec1Key(key)) => return Ok(PrivateKeyDer::Sec1(key)),
            Some(_) => continue,
            None => {
                return Err(TransportError::Config(format!(
                    "no private key found in {}",
                    origin
                )));
            }
        }
    }
}
