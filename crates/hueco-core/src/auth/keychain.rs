use keyring::Entry;
use serde::{Deserialize, Serialize};

use super::store::{Credentials, TokenStorage};
use super::StoreError;

/// Keychain entry holding the token pair
const SESSION_ENTRY: &str = "session";

/// Both tokens travel in one keychain secret so a write lands whole or not at all.
#[derive(Debug, Default, Serialize, Deserialize)]
struct KeychainRecord {
    access_token: Option<String>,
    refresh_token: Option<String>,
}

impl From<&Credentials> for KeychainRecord {
    fn from(credentials: &Credentials) -> Self {
        Self {
            access_token: credentials.access.clone(),
            refresh_token: credentials.refresh.clone(),
        }
    }
}

impl From<KeychainRecord> for Credentials {
    fn from(record: KeychainRecord) -> Self {
        Credentials::new(record.access_token, record.refresh_token)
    }
}

/// Keeps the token pair in the OS keychain under `service`.
pub struct KeyringTokenStorage {
    service: String,
}

impl KeyringTokenStorage {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self) -> Result<Entry, StoreError> {
        Ok(Entry::new(&self.service, SESSION_ENTRY)?)
    }
}

/// A missing keychain entry is "no token", not a failure.
fn missing_as_none<T>(result: keyring::Result<T>) -> Result<Option<T>, StoreError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn decode(secret: Option<String>) -> Result<Credentials, StoreError> {
    match secret {
        Some(secret) => Ok(serde_json::from_str::<KeychainRecord>(&secret)?.into()),
        None => Ok(Credentials::default()),
    }
}

fn encode(credentials: &Credentials) -> Result<String, StoreError> {
    Ok(serde_json::to_string(&KeychainRecord::from(credentials))?)
}

impl TokenStorage for KeyringTokenStorage {
    fn load(&self) -> Result<Credentials, StoreError> {
        decode(missing_as_none(self.entry()?.get_password())?)
    }

    fn persist(&mut self, credentials: &Credentials) -> Result<(), StoreError> {
        self.entry()?.set_password(&encode(credentials)?)?;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        missing_as_none(self.entry()?.delete_credential())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_entry_is_none() {
        let result: keyring::Result<String> = Err(keyring::Error::NoEntry);
        assert!(missing_as_none(result).unwrap().is_none());
    }

    #[test]
    fn test_other_keychain_errors_propagate() {
        let result: keyring::Result<String> = Err(keyring::Error::TooLong("user".into(), 255));
        assert!(matches!(missing_as_none(result), Err(StoreError::Keychain(_))));
    }

    #[test]
    fn test_pair_is_one_secret_with_both_keys() {
        let credentials = Credentials::new(Some("A".into()), Some("R".into()));
        let secret = encode(&credentials).unwrap();

        let value: serde_json::Value = serde_json::from_str(&secret).unwrap();
        assert_eq!(value["access_token"], "A");
        assert_eq!(value["refresh_token"], "R");
        assert_eq!(decode(Some(secret)).unwrap(), credentials);
    }

    #[test]
    fn test_no_secret_is_signed_out() {
        assert_eq!(decode(None).unwrap(), Credentials::default());
    }

    #[test]
    fn test_garbled_secret_is_corrupt() {
        assert!(matches!(
            decode(Some("not json".into())),
            Err(StoreError::Corrupt(_))
        ));
    }
}
