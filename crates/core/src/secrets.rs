//! Credential storage seam; the engine only reads the account token.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::errors::{Error, Result};

/// Storage key of the bearer token used against the remote record store.
pub const ACCOUNT_ACCESS_TOKEN_KEY: &str = "account_access_token";

/// Platform secret storage (keychain, keyring, environment).
pub trait SecretStore: Send + Sync {
    fn get_secret(&self, key: &str) -> Result<Option<String>>;

    fn set_secret(&self, key: &str, value: &str) -> Result<()>;

    fn delete_secret(&self, key: &str) -> Result<()>;
}

/// Process-local secret store for hosts without a keychain and for tests.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    secrets: RwLock<HashMap<String, String>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(key: &str, value: &str) -> Self {
        let store = Self::new();
        if let Ok(mut secrets) = store.secrets.write() {
            secrets.insert(key.to_string(), value.to_string());
        }
        store
    }
}

impl SecretStore for MemorySecretStore {
    fn get_secret(&self, key: &str) -> Result<Option<String>> {
        let secrets = self
            .secrets
            .read()
            .map_err(|_| Error::storage("secret store lock poisoned"))?;
        Ok(secrets.get(key).cloned())
    }

    fn set_secret(&self, key: &str, value: &str) -> Result<()> {
        let mut secrets = self
            .secrets
            .write()
            .map_err(|_| Error::storage("secret store lock poisoned"))?;
        secrets.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete_secret(&self, key: &str) -> Result<()> {
        let mut secrets = self
            .secrets
            .write()
            .map_err(|_| Error::storage("secret store lock poisoned"))?;
        secrets.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_delete_roundtrip() {
        let store = MemorySecretStore::with_secret(ACCOUNT_ACCESS_TOKEN_KEY, "t0");
        assert_eq!(
            store.get_secret(ACCOUNT_ACCESS_TOKEN_KEY).unwrap(),
            Some("t0".to_string())
        );

        store.set_secret(ACCOUNT_ACCESS_TOKEN_KEY, "t1").unwrap();
        assert_eq!(
            store.get_secret(ACCOUNT_ACCESS_TOKEN_KEY).unwrap(),
            Some("t1".to_string())
        );

        store.delete_secret(ACCOUNT_ACCESS_TOKEN_KEY).unwrap();
        assert_eq!(store.get_secret(ACCOUNT_ACCESS_TOKEN_KEY).unwrap(), None);
    }
}
