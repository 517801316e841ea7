use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{SecretError, SecretStore, TlsSecret};

/// In-process store. Inserting over an existing entry simulates rotation.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    secrets: RwLock<HashMap<(String, String), TlsSecret>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `secret` at namespace/name, returning the previous one.
    pub fn insert(
        &self,
        namespace: impl Into<String>,
        name: impl Into<String>,
        secret: TlsSecret,
    ) -> Option<TlsSecret> {
        self.secrets
            .write()
            .insert((namespace.into(), name.into()), secret)
    }

    pub fn remove(&self, namespace: &str, name: &str) -> Option<TlsSecret> {
        self.secrets
            .write()
            .remove(&(namespace.to_string(), name.to_string()))
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<TlsSecret, SecretError> {
        self.secrets
            .read()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| SecretError::NotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(tag: &str) -> TlsSecret {
        TlsSecret {
            certificate: tag.as_bytes().to_vec(),
            private_key: b"key".to_vec(),
            ca: None,
        }
    }

    #[tokio::test]
    async fn insert_replaces_previous_secret() {
        let store = MemorySecretStore::new();
        assert!(store.insert("ns", "tls", secret("one")).is_none());
        assert_eq!(store.get("ns", "tls").await.unwrap().certificate, b"one");

        store.insert("ns", "tls", secret("two"));
        assert_eq!(store.get("ns", "tls").await.unwrap().certificate, b"two");
    }

    #[tokio::test]
    async fn missing_secret_is_not_found() {
        let store = MemorySecretStore::new();
        store.insert("ns", "tls", secret("one"));

        let err = store.get("other", "tls").await.unwrap_err();
        assert!(matches!(err, SecretError::NotFound { ref namespace, .. } if namespace == "other"));
    }
}
