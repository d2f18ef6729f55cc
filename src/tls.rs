use std::fs::File;
use std::io::{self, BufReader, ErrorKind};
use std::sync::Arc;

use pgwire::tokio::TlsAcceptor;
use pgwire::tokio::tokio_rustls::rustls::ServerConfig as RustlsConfig;
use pgwire::tokio::tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};

use crate::config::ServerConfig;

/// TLS acceptor for the configured certificate pair, or `None` when TLS is
/// not configured.
pub fn load_tls_acceptor(config: &ServerConfig) -> io::Result<Option<TlsAcceptor>> {
    let (cert_path, key_path) = match (config.tls_cert.as_deref(), config.tls_key.as_deref()) {
        (None, None) => return Ok(None),
        (Some(c), Some(k)) => (c, k),
        _ => {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                "both LOADLINE_TLS_CERT and LOADLINE_TLS_KEY must be set, or neither",
            ));
        }
    };

    let certs = load_certs(cert_path)?;
    if certs.is_empty() {
        return Err(io::Error::new(
            ErrorKind::InvalidInput,
            format!("no certificates found in {cert_path}"),
        ));
    }
    let key = load_key(key_path)?;

    let mut tls = RustlsConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| io::Error::new(ErrorKind::InvalidInput, e))?;
    tls.alpn_protocols = vec![b"postgresql".to_vec()];

    tracing::info!(cert = cert_path, "TLS enabled");
    Ok(Some(TlsAcceptor::from(Arc::new(tls))))
}

fn load_certs(path: &str) -> io::Result<Vec<CertificateDer<'static>>> {
    rustls_pemfile::certs(&mut BufReader::new(File::open(path)?)).collect()
}

fn load_key(path: &str) -> io::Result<PrivateKeyDer<'static>> {
    rustls_pemfile::private_key(&mut BufReader::new(File::open(path)?))?.ok_or_else(|| {
        io::Error::new(
            ErrorKind::InvalidInput,
            format!("no private key found in {path}"),
        )
    })
}
