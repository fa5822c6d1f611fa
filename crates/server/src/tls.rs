use std::sync::Arc;

use anyhow::{Context, Result};
use rcgen::{CertificateParams, KeyPair, SanType};
use rustls::ServerConfig;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};

/// Build a TLS acceptor from configured cert/key paths, or from a freshly
/// generated self-signed certificate when either path is missing.
///
/// Browsers only expose camera and microphone on secure origins, so a LAN
/// deployment without a real certificate still needs HTTPS.
pub fn build_acceptor(
    cert_path: Option<&str>,
    key_path: Option<&str>,
) -> Result<tokio_rustls::TlsAcceptor> {
    let (certs, key) = match (cert_path, key_path) {
        (Some(cert), Some(key)) => load_certs_from_files(cert, key)?,
        _ => generate_self_signed()?,
    };

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .context("Failed to build TLS server config")?;

    Ok(tokio_rustls::TlsAcceptor::from(Arc::new(config)))
}

/// Load certificate chain and private key from PEM files on disk.
fn load_certs_from_files(
    cert_path: &str,
    key_path: &str,
) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)> {
    let cert_pem = std::fs::read(cert_path)
        .with_context(|| format!("Failed to read TLS cert: {cert_path}"))?;
    let key_pem =
        std::fs::read(key_path).with_context(|| format!("Failed to read TLS key: {key_path}"))?;

    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut cert_pem.as_slice())
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("Failed to parse TLS certificate PEM")?;
    if certs.is_empty() {
        anyhow::bail!("No certificate found in {cert_path}");
    }

    let key = rustls_pemfile::private_key(&mut key_pem.as_slice())
        .context("Failed to parse TLS private key PEM")?
        .context("No private key found in PEM file")?;

    tracing::info!("Loaded TLS cert from {cert_path}");
    Ok((certs, key))
}

/// Generate a self-signed certificate for localhost development.
fn generate_self_signed() -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)> {
    tracing::info!("Generating self-signed TLS certificate for localhost");

    let mut params = CertificateParams::new(vec!["localhost".to_string()])
        .context("Failed to create certificate params")?;
    params
        .subject_alt_names
        .push(SanType::IpAddress(std::net::Ipv4Addr::LOCALHOST.into()));
    params
        .subject_alt_names
        .push(SanType::IpAddress(std::net::Ipv6Addr::LOCALHOST.into()));

    let key_pair = KeyPair::generate().context("Failed to generate key pair")?;
    let cert = params
        .self_signed(&key_pair)
        .context("Failed to generate self-signed certificate")?;

    let cert_der = CertificateDer::from(cert.der().to_vec());
    let key_der = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));

    Ok((vec![cert_der], key_der))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn install_provider() {
        // Another test may have installed it already.
        let _ = rustls::crypto::ring::default_provider().install_default();
    }

    #[test]
    fn self_signed_when_paths_missing() {
        install_provider();
        assert!(build_acceptor(None, None).is_ok());
        assert!(build_acceptor(Some("/tmp/only-cert.pem"), None).is_ok());
    }

    #[test]
    fn unreadable_cert_is_an_error() {
        install_provider();
        let err = build_acceptor(Some("/nonexistent/cert.pem"), Some("/nonexistent/key.pem"))
            .err()
            .expect("missing files should fail");
        assert!(err.to_string().contains("Failed to read TLS cert"));
    }

    #[test]
    fn generated_pem_files_load() {
        install_provider();
        let key_pair = KeyPair::generate().unwrap();
        let cert = CertificateParams::new(vec!["localhost".to_string()])
            .unwrap()
            .self_signed(&key_pair)
            .unwrap();

        let dir = std::env::temp_dir().join(format!("chadmeet-tls-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let cert_path = dir.join("cert.pem");
        let key_path = dir.join("key.pem");
        std::fs::write(&cert_path, cert.pem()).unwrap();
        std::fs::write(&key_path, key_pair.serialize_pem()).unwrap();

        let result = build_acceptor(cert_path.to_str(), key_path.to_str());
        std::fs::remove_dir_all(&dir).ok();
        assert!(result.is_ok());
    }
}
