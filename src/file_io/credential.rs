use std::io;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use ureq::serde_json;

use crate::file_io::model::Versioned;
use crate::file_io::storage::KeyValueStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

/// Holds the bearer token and its absolute expiry. Only non-expired tokens are handed out, and
/// freshness is evaluated against the wall clock on every call to `get`.
pub struct CredentialStore<S: KeyValueStore> {
    store: S,
}

impl<S: KeyValueStore> CredentialStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn get(&self) -> Option<Token> {
        let credential = self.load()?;
        if SystemTime::now() < credential.expires_at {
            Some(credential.token)
        } else {
            debug!("Stored access token has expired.");
            None
        }
    }

    /// The refresh token is returned even if the access token has expired: That's exactly the
    /// situation it is needed for.
    pub fn refresh_token(&self) -> Option<String> {
        self.load().and_then(|credential| credential.token.refresh_token)
    }

    pub fn set(&self, token: &Token, ttl_seconds: u64) -> io::Result<()> {
        let credential = StoredCredential {
            token: token.clone(),
            expires_at: SystemTime::now() + Duration::from_secs(ttl_seconds),
        };
        let credential_v1 = CredentialV1::from(credential);
        let credential_as_json = serde_json::to_string(&credential_v1)?;
        self.store.set(CREDENTIAL_KEY, &credential_as_json)
    }

    pub fn clear(&self) -> io::Result<()> {
        self.store.remove(CREDENTIAL_KEY)
    }

    fn load(&self) -> Option<StoredCredential> {
        let stored = match self.store.get(CREDENTIAL_KEY) {
            Ok(Some(s)) => s,
            Ok(None) => return None,
            Err(e) => {
                error!("Unable to read stored credential: {:?}", e);
                return None;
            }
        };
        match parse_credential(&stored) {
            Some(credential) => Some(credential),
            None => {
                // A corrupt credential is never surfaced to the caller: we drop it, which forces
                // the user to log in again.
                warn!("Stored credential is malformed and will be removed.");
                if let Err(e) = self.clear() {
                    error!("Unable to remove malformed credential: {:?}", e);
                }
                None
            }
        }
    }
}

fn parse_credential(stored: &str) -> Option<StoredCredential> {
    let credential: CredentialV1 = serde_json::from_str(stored).ok()?;
    if credential.version != 1 || credential.token.is_empty() {
        return None;
    }

    Some(credential.into())
}

struct StoredCredential {
    token: Token,
    expires_at: SystemTime,
}

#[derive(Serialize, Deserialize)]
struct CredentialV1 {
    version: u32,
    token: String,
    // Milliseconds since the unix epoch.
    expiry: u64,
    refresh_token: Option<String>,
}

impl Versioned<StoredCredential> for CredentialV1 {}

impl From<StoredCredential> for CredentialV1 {
    fn from(value: StoredCredential) -> Self {
        let expiry = value
            .expires_at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            version: 1,
            token: value.token.access_token,
            expiry,
            refresh_token: value.token.refresh_token,
        }
    }
}

impl From<CredentialV1> for StoredCredential {
    fn from(value: CredentialV1) -> Self {
        Self {
            token: Token {
                access_token: value.token,
                refresh_token: value.refresh_token,
            },
            expires_at: UNIX_EPOCH + Duration::from_millis(value.expiry),
        }
    }
}

const CREDENTIAL_KEY: &str = "credential";
