//! HTTPS configuration resolution.
//!
//! `HTTPS=true` turns the dev server into an HTTPS server backed by a
//! user-supplied certificate and key (`SSL_CRT_FILE` / `SSL_KEY_FILE`,
//! resolved against the app directory). Before the server binds, the pair
//! is proven to match: a fixed token is encrypted with the certificate's
//! public key and decrypted with the private key. A pair that fails the
//! round trip is rejected with an error naming the offending file.

use std::fmt;
use std::path::{Path, PathBuf};

use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use rustls_pki_types::PrivateKeyDer;
use x509_cert::der::{Decode, Encode};
use x509_cert::Certificate;

use crate::env::EnvironmentSnapshot;
use crate::error::ConfigError;

/// Plaintext used for the encrypt/decrypt round trip.
const VALIDATION_TOKEN: &[u8] = b"test";

/// Resolved HTTPS settings for the dev server.
#[derive(Clone)]
pub enum HttpsConfig {
    Disabled,
    /// Validated certificate and key, byte-for-byte as read from disk.
    Enabled { cert: Vec<u8>, key: Vec<u8> },
}

impl HttpsConfig {
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled { .. })
    }

    #[must_use]
    pub fn protocol(&self) -> &'static str {
        if self.is_enabled() {
            "https"
        } else {
            "http"
        }
    }
}

impl fmt::Debug for HttpsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => f.write_str("Disabled"),
            Self::Enabled { cert, key } => f
                .debug_struct("Enabled")
                .field("cert_len", &cert.len())
                .field("key_len", &key.len())
                .finish(),
        }
    }
}

/// Resolve HTTPS settings from the environment.
///
/// HTTPS is off unless `HTTPS` is the literal string `"true"`. When on,
/// both `SSL_CRT_FILE` and `SSL_KEY_FILE` must be set and point at
/// existing files; the certificate is checked first so its error always
/// wins when both are missing.
pub fn resolve_https_config(
    snapshot: &EnvironmentSnapshot,
    app_dir: &Path,
) -> Result<HttpsConfig, ConfigError> {
    if !snapshot.is_true("HTTPS") {
        return Ok(HttpsConfig::Disabled);
    }

    let crt_file = require_file_var(snapshot, app_dir, "SSL_CRT_FILE")?;
    let key_file = require_file_var(snapshot, app_dir, "SSL_KEY_FILE")?;

    let cert = std::fs::read(&crt_file)?;
    let key = std::fs::read(&key_file)?;

    validate_cert_and_key(&cert, &crt_file, &key, &key_file)?;

    Ok(HttpsConfig::Enabled { cert, key })
}

/// Look up a variable naming a file and resolve it against `app_dir`.
fn require_file_var(
    snapshot: &EnvironmentSnapshot,
    app_dir: &Path,
    var: &'static str,
) -> Result<PathBuf, ConfigError> {
    let Some(value) = snapshot.get(var) else {
        return Err(ConfigError::MissingVariable { var });
    };

    // join() keeps absolute values as-is.
    let path = app_dir.join(value);
    if !path.is_file() {
        return Err(ConfigError::FileNotFound { var, path });
    }

    Ok(path)
}

/// Prove the key decrypts what the certificate's public key encrypts.
fn validate_cert_and_key(
    cert_pem: &[u8],
    cert_path: &Path,
    key_pem: &[u8],
    key_path: &Path,
) -> Result<(), ConfigError> {
    let public_key =
        certificate_public_key(cert_pem).map_err(|reason| ConfigError::InvalidCertificate {
            path: cert_path.to_path_buf(),
            reason,
        })?;
    let private_key = private_key_from_pem(key_pem).map_err(|reason| ConfigError::InvalidKey {
        path: key_path.to_path_buf(),
        reason,
    })?;

    let mut rng = rand::thread_rng();
    let encrypted = public_key
        .encrypt(&mut rng, Pkcs1v15Encrypt, VALIDATION_TOKEN)
        .map_err(|e| ConfigError::InvalidCertificate {
            path: cert_path.to_path_buf(),
            reason: e.to_string(),
        })?;
    let decrypted =
        private_key
            .decrypt(Pkcs1v15Encrypt, &encrypted)
            .map_err(|e| ConfigError::InvalidKey {
                path: key_path.to_path_buf(),
                reason: e.to_string(),
            })?;

    if decrypted != VALIDATION_TOKEN {
        return Err(ConfigError::InvalidKey {
            path: key_path.to_path_buf(),
            reason: "decrypted challenge does not match".to_string(),
        });
    }

    Ok(())
}

/// Extract the RSA public key from the first certificate in a PEM bundle.
fn certificate_public_key(pem: &[u8]) -> Result<RsaPublicKey, String> {
    let cert_der = rustls_pemfile::certs(&mut &pem[..])
        .next()
        .ok_or_else(|| "no certificate found in PEM file".to_string())?
        .map_err(|e| e.to_string())?;

    let cert = Certificate::from_der(cert_der.as_ref()).map_err(|e| e.to_string())?;
    let spki = cert
        .tbs_certificate
        .subject_public_key_info
        .to_der()
        .map_err(|e| e.to_string())?;

    RsaPublicKey::from_public_key_der(&spki).map_err(|e| format!("not an RSA public key: {e}"))
}

/// Parse the first private key in a PEM bundle, accepting PKCS#1 and
/// PKCS#8 encodings.
fn private_key_from_pem(pem: &[u8]) -> Result<RsaPrivateKey, String> {
    let key = rustls_pemfile::private_key(&mut &pem[..])
        .map_err(|e| e.to_string())?
        .ok_or_else(|| "no private key found in PEM file".to_string())?;

    match key {
        PrivateKeyDer::Pkcs1(der) => RsaPrivateKey::from_pkcs1_der(der.secret_pkcs1_der())
            .map_err(|e| format!("not an RSA private key: {e}")),
        PrivateKeyDer::Pkcs8(der) => RsaPrivateKey::from_pkcs8_der(der.secret_pkcs8_der())
            .map_err(|e| format!("not an RSA private key: {e}")),
        _ => Err("unsupported key encoding (expected RSA PKCS#1 or PKCS#8)".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::EnvironmentSnapshot;

    fn snapshot(pairs: &[(&str, &str)]) -> EnvironmentSnapshot {
        EnvironmentSnapshot::from_vars(
            pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string())),
        )
    }

    #[test]
    fn test_disabled_unless_https_is_literal_true() {
        let dir = tempfile::tempdir().unwrap();

        for vars in [
            vec![],
            vec![("HTTPS", "false")],
            vec![("HTTPS", "TRUE")],
            vec![("HTTPS", "1")],
        ] {
            let config = resolve_https_config(&snapshot(&vars), dir.path()).unwrap();
            assert!(!config.is_enabled());
            assert_eq!(config.protocol(), "http");
        }
    }

    #[test]
    fn test_missing_cert_var_reported_before_key_var() {
        let dir = tempfile::tempdir().unwrap();

        let err = resolve_https_config(&snapshot(&[("HTTPS", "true")]), dir.path()).unwrap_err();
        assert!(err.is_missing_variable());
        match err {
            ConfigError::MissingVariable { var } => assert_eq!(var, "SSL_CRT_FILE"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_key_var_reported_when_cert_present() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("cert.pem"), "placeholder").unwrap();

        let snap = snapshot(&[("HTTPS", "true"), ("SSL_CRT_FILE", "cert.pem")]);
        let err = resolve_https_config(&snap, dir.path()).unwrap_err();
        match err {
            ConfigError::MissingVariable { var } => assert_eq!(var, "SSL_KEY_FILE"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_file_not_found_names_var_and_resolved_path() {
        let dir = tempfile::tempdir().unwrap();

        let snap = snapshot(&[
            ("HTTPS", "true"),
            ("SSL_CRT_FILE", "certs/server.crt"),
            ("SSL_KEY_FILE", "certs/server.key"),
        ]);
        let err = resolve_https_config(&snap, dir.path()).unwrap_err();
        match &err {
            ConfigError::FileNotFound { var, path } => {
                assert_eq!(*var, "SSL_CRT_FILE");
                assert_eq!(*path, dir.path().join("certs/server.crt"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("can't be found"));
    }

    #[test]
    fn test_garbage_cert_is_invalid_certificate() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("cert.pem"), "not a certificate").unwrap();
        std::fs::write(dir.path().join("key.pem"), "not a key").unwrap();

        let snap = snapshot(&[
            ("HTTPS", "true"),
            ("SSL_CRT_FILE", "cert.pem"),
            ("SSL_KEY_FILE", "key.pem"),
        ]);
        let err = resolve_https_config(&snap, dir.path()).unwrap_err();
        match err {
            ConfigError::InvalidCertificate { path, .. } => {
                assert_eq!(path, dir.path().join("cert.pem"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_debug_does_not_dump_key_material() {
        let config = HttpsConfig::Enabled {
            cert: b"CERTBYTES".to_vec(),
            key: b"KEYBYTES".to_vec(),
        };
        let printed = format!("{config:?}");
        assert!(!printed.contains("KEYBYTES"));
        assert!(printed.contains("key_len"));
    }
}
