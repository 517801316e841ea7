//! Secrets read from a directory tree in the mounted-secret layout:
//! `<root>/<namespace>/<name>/{tls.crt,tls.key,ca.crt}`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{SecretError, SecretStore, TlsSecret};

const CERT_FILE: &str = "tls.crt";
const KEY_FILE: &str = "tls.key";
const CA_FILE: &str = "ca.crt";

#[derive(Debug, Clone)]
pub struct DirSecretStore {
    root: PathBuf,
}

impl DirSecretStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Read `path`, mapping a missing file to `None`.
async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, SecretError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl SecretStore for DirSecretStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<TlsSecret, SecretError> {
        let dir = self.root.join(namespace).join(name);
        if !tokio::fs::try_exists(&dir).await? {
            return Err(SecretError::NotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            });
        }

        let missing = |key| SecretError::MissingKey {
            namespace: namespace.to_string(),
            name: name.to_string(),
            key,
        };

        let certificate = read_optional(&dir.join(CERT_FILE))
            .await?
            .ok_or_else(|| missing(CERT_FILE))?;
        let private_key = read_optional(&dir.join(KEY_FILE))
            .await?
            .ok_or_else(|| missing(KEY_FILE))?;
        let ca = read_optional(&dir.join(CA_FILE)).await?;

        tracing::debug!(namespace, name, has_ca = ca.is_some(), "Read secret from disk");
        Ok(TlsSecret {
            certificate,
            private_key,
            ca,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(label: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("gnmi-secrets-{}-{}", label, uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn reads_mounted_secret_layout() {
        let root = scratch_dir("layout");
        let dir = root.join("ndd-system").join("gnmi-tls");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("tls.crt"), b"cert").unwrap();
        std::fs::write(dir.join("tls.key"), b"key").unwrap();

        let store = DirSecretStore::new(&root);
        let secret = store.get("ndd-system", "gnmi-tls").await.unwrap();
        assert_eq!(secret.certificate, b"cert");
        assert_eq!(secret.private_key, b"key");
        assert!(secret.ca.is_none());

        std::fs::write(dir.join("ca.crt"), b"ca").unwrap();
        let secret = store.get("ndd-system", "gnmi-tls").await.unwrap();
        assert_eq!(secret.ca.as_deref(), Some(&b"ca"[..]));

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[tokio::test]
    async fn missing_directory_is_not_found() {
        let root = scratch_dir("missing");
        let err = DirSecretStore::new(&root).get("ns", "absent").await.unwrap_err();
        assert!(matches!(err, SecretError::NotFound { .. }));
        std::fs::remove_dir_all(&root).unwrap();
    }

    #[tokio::test]
    async fn missing_key_file_is_reported() {
        let root = scratch_dir("nokey");
        let dir = root.join("ns").join("tls");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("tls.crt"), b"cert").unwrap();

        let err = DirSecretStore::new(&root).get("ns", "tls").await.unwrap_err();
        assert!(matches!(err, SecretError::MissingKey { key: "tls.key", .. }));
        std::fs::remove_dir_all(&root).unwrap();
    }
}
