//! TLS configuration and certificate loading.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use axum_server::tls_rustls::RustlsConfig;

/// Load TLS configuration from PEM certificate chain and key files.
pub async fn load_tls_config(cert_path: &Path, key_path: &Path) -> Result<RustlsConfig, io::Error> {
    let certs = read_certs(cert_path)?;
    let key = read_key(key_path)?;
    tracing::debug!(certificates = certs.len(), path = ?cert_path, "TLS material loaded");
    RustlsConfig::from_der(certs, key).await
}

fn open(path: &Path, what: &str) -> io::Result<BufReader<File>> {
    File::open(path).map(BufReader::new).map_err(|e| {
        io::Error::new(e.kind(), format!("{what} file {}: {e}", path.display()))
    })
}

/// DER certificates in file order.
pub fn read_certs(path: &Path) -> io::Result<Vec<Vec<u8>>> {
    let mut reader = open(path, "Certificate")?;
    let certs = rustls_pemfile::certs(&mut reader)
        .map(|cert| cert.map(|der| der.to_vec()))
        .collect::<io::Result<Vec<_>>>()?;
    if certs.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("no certificates in {}", path.display()),
        ));
    }
    Ok(certs)
}

/// DER private key (PKCS#1, PKCS#8 or SEC1).
pub fn read_key(path: &Path) -> io::Result<Vec<u8>> {
    let mut reader = open(path, "Private key")?;
    match rustls_pemfile::private_key(&mut reader)? {
        Some(key) => Ok(key.secret_der().to_vec()),
        None => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("no private key in {}", path.display()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("forwarder-tls-{}-{name}", std::process::id()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = read_certs(Path::new("/nonexistent/cert.pem")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn file_without_pem_blocks_is_invalid() {
        let path = temp_file("empty.pem", "not a certificate\n");
        assert_eq!(
            read_certs(&path).unwrap_err().kind(),
            io::ErrorKind::InvalidData
        );
        assert_eq!(
            read_key(&path).unwrap_err().kind(),
            io::ErrorKind::InvalidData
        );
        let _ = std::fs::remove_file(path);
    }
}
