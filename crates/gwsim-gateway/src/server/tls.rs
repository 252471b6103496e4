//! TLS context for the listener
//!
//! One `rustls::ServerConfig` is built at startup and shared read-only by
//! every connection.

use gwsim_common::{AppError, AppResult, TlsConfig};
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;
use std::sync::Arc;

/// Load the PEM certificate chain and private key named in `config`
pub fn load_server_config(config: &TlsConfig) -> AppResult<Arc<ServerConfig>> {
    let certs = CertificateDer::pem_file_iter(&config.cert_path)
        .and_then(|certs| certs.collect::<Result<Vec<_>, _>>())
        .map_err(|e| AppError::tls(format!("{}: {e}", config.cert_path.display())))?;
    if certs.is_empty() {
        return Err(AppError::tls(format!(
            "{}: no certificates found",
            config.cert_path.display()
        )));
    }

    let key = PrivateKeyDer::from_pem_file(&config.key_path)
        .map_err(|e| AppError::tls(format!("{}: {e}", config.key_path.display())))?;

    server_config(certs, key)
}

/// Build a server config from DER material
pub fn server_config(
    certs: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
) -> AppResult<Arc<ServerConfig>> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(AppError::tls)?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(AppError::tls)?;

    Ok(Arc::new(config))
}
