use crate::infrastructure::error::ApiError;
use std::sync::Mutex;

/// Capability interface over the platform secret store. Values are opaque
/// byte blobs; callers own the serialization.
pub trait SecureStore: Send + Sync {
    fn get(&self) -> Result<Option<Vec<u8>>, ApiError>;
    fn set(&self, value: &[u8]) -> Result<(), ApiError>;
    fn delete(&self) -> Result<(), ApiError>;
}

/// Keyring-backed store holding a single entry per service/account pair.
#[derive(Debug, Clone)]
pub struct KeyringSecureStore {
    service_name: String,
    account_name: String,
}

impl KeyringSecureStore {
    pub fn new(service_name: impl Into<String>, account_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            account_name: account_name.into(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry, ApiError> {
        keyring::Entry::new(&self.service_name, &self.account_name)
            .map_err(|error| ApiError::Credential(error.to_string()))
    }
}

impl Default for KeyringSecureStore {
    fn default() -> Self {
        Self::new("wattview.api.token", "default")
    }
}

impl SecureStore for KeyringSecureStore {
    fn get(&self) -> Result<Option<Vec<u8>>, ApiError> {
        match self.entry()?.get_secret() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(error) => Err(ApiError::Credential(error.to_string())),
        }
    }

    fn set(&self, value: &[u8]) -> Result<(), ApiError> {
        self.entry()?
            .set_secret(value)
            .map_err(|error| ApiError::Credential(error.to_string()))
    }

    fn delete(&self) -> Result<(), ApiError> {
        match self.entry()?.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(error) => Err(ApiError::Credential(error.to_string())),
        }
    }
}

#[derive(Debug, Default)]
pub struct InMemorySecureStore {
    value: Mutex<Option<Vec<u8>>>,
}

impl SecureStore for InMemorySecureStore {
    fn get(&self) -> Result<Option<Vec<u8>>, ApiError> {
        let guard = self
            .value
            .lock()
            .map_err(|error| ApiError::Credential(format!("in-memory lock poisoned: {error}")))?;
        Ok(guard.clone())
    }

    fn set(&self, value: &[u8]) -> Result<(), ApiError> {
        let mut guard = self
            .value
            .lock()
            .map_err(|error| ApiError::Credential(format!("in-memory lock poisoned: {error}")))?;
        *guard = Some(value.to_vec());
        Ok(())
    }

    fn delete(&self) -> Result<(), ApiError> {
        let mut guard = self
            .value
            .lock()
            .map_err(|error| ApiError::Credential(format!("in-memory lock poisoned: {error}")))?;
        *guard = None;
        Ok(())
    }
}
