//! Listening socket and TLS acceptor construction.
//!
//! Both builders run once at startup and fail fatally; nothing here touches
//! a live connection.

use crate::{config::Config, errors::StartupError};
use socket2::{Domain, Protocol, Socket, Type};
use std::{fs::File, io::BufReader, net::SocketAddr, net::ToSocketAddrs, path::Path, sync::Arc};
use tokio::net::TcpListener;
use tokio_rustls::{
    rustls::{pki_types::CertificateDer, ServerConfig as RustlsConfig},
    TlsAcceptor,
};

/// Binds `host:port` with the configured listen backlog.
///
/// Must be called from within the tokio runtime so the listener can register
/// with the reactor.
pub(crate) fn bind(config: &Config) -> Result<TcpListener, StartupError> {
    let bind_error = |source| StartupError::Bind {
        addr: config.addr(),
        source,
    };

    let addr: SocketAddr = (config.host.as_str(), config.port)
        .to_socket_addrs()
        .map_err(bind_error)?
        .next()
        .ok_or_else(|| {
            StartupError::Config(format!("host {:?} does not resolve", config.host))
        })?;

    let domain = if addr.is_ipv6() {
        Domain::IPV6
    } else {
        Domain::IPV4
    };

    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP)).map_err(bind_error)?;
    socket.set_reuse_address(true).map_err(bind_error)?;
    socket.set_nonblocking(true).map_err(bind_error)?;
    socket.bind(&addr.into()).map_err(bind_error)?;
    socket
        .listen(config.backlog.min(i32::MAX as u32) as i32)
        .map_err(bind_error)?;

    TcpListener::from_std(socket.into()).map_err(bind_error)
}

/// Loads PEM cert/key material into a TLS acceptor, if TLS is enabled.
///
/// rustls defaults give TLS 1.2/1.3 with forward-secret (ECDHE) suites
/// only; client certificates are not requested.
pub(crate) fn load_tls(config: &Config) -> Result<Option<TlsAcceptor>, StartupError> {
    if !config.tls_enabled {
        return Ok(None);
    }

    // validate() guarantees both paths are present when TLS is enabled.
    let cert_path = config.tls_cert.as_deref().unwrap_or(Path::new(""));
    let key_path = config.tls_key.as_deref().unwrap_or(Path::new(""));

    let cert_file = File::open(cert_path)
        .map_err(|err| StartupError::Tls(format!("{}: {err}", cert_path.display())))?;
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut BufReader::new(cert_file))
        .collect::<Result<_, _>>()
        .map_err(|err| StartupError::Tls(format!("{}: {err}", cert_path.display())))?;
    if certs.is_empty() {
        return Err(StartupError::Tls(format!(
            "{}: no certificates found",
            cert_path.display()
        )));
    }

    let key_file = File::open(key_path)
        .map_err(|err| StartupError::Tls(format!("{}: {err}", key_path.display())))?;
    let key = rustls_pemfile::private_key(&mut BufReader::new(key_file))
        .map_err(|err| StartupError::Tls(format!("{}: {err}", key_path.display())))?
        .ok_or_else(|| {
            StartupError::Tls(format!("{}: no private key found", key_path.display()))
        })?;

    let tls_config = RustlsConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|err| StartupError::Tls(err.to_string()))?;

    Ok(Some(TlsAcceptor::from(Arc::new(tls_config))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn config_with_tls(cert: &str, key: &str) -> Config {
        let mut config = Config::default();
        config.data_path = PathBuf::from("/srv/data.txt");
        config.tls_enabled = true;
        config.tls_cert = Some(PathBuf::from(cert));
        config.tls_key = Some(PathBuf::from(key));
        config
    }

    #[test]
    fn tls_disabled_loads_nothing() {
        let mut config = Config::default();
        config.data_path = PathBuf::from("/srv/data.txt");

        assert!(load_tls(&config).unwrap().is_none());
    }

    #[test]
    fn missing_material_is_fatal() {
        let config = config_with_tls("/nonexistent/cert.pem", "/nonexistent/key.pem");

        assert!(matches!(load_tls(&config), Err(StartupError::Tls(_))));
    }

    #[test]
    fn garbage_pem_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("cert.pem");
        let key = dir.path().join("key.pem");
        std::fs::write(&cert, "not a certificate").unwrap();
        std::fs::write(&key, "not a key").unwrap();

        let config = config_with_tls(cert.to_str().unwrap(), key.to_str().unwrap());
        assert!(matches!(load_tls(&config), Err(StartupError::Tls(_))));
    }
}
