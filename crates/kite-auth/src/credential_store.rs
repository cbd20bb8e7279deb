//! On-disk credential store.
//!
//! Loading is forgiving: a missing or unparsable file reads as an empty store
//! so a corrupted file never blocks re-authentication. Saving stages an
//! owner-only temp file and renames it over the target; the previous file is
//! left untouched on every failure path.

use std::path::{Path, PathBuf};

use anyhow::Context;
use kite_core::{create_private_dir_all, write_private_text_atomic};

use crate::error::AuthError;
use crate::types::{CredentialStore, CREDENTIAL_STORE_SCHEMA_VERSION};

#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> CredentialStore {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return CredentialStore::default();
            }
            Err(error) => {
                tracing::warn!(
                    credential_store = %self.path.display(),
                    error = %error,
                    "failed to read credential store; treating as empty"
                );
                return CredentialStore::default();
            }
        };

        match parse_credential_store(&raw) {
            Ok(store) => {
                tracing::debug!(
                    credential_store = %self.path.display(),
                    profiles = store.profiles.len(),
                    "loaded credential store"
                );
                store
            }
            Err(error) => {
                tracing::warn!(
                    credential_store = %self.path.display(),
                    error = %error,
                    "failed to parse credential store; treating as empty"
                );
                CredentialStore::default()
            }
        }
    }

    pub fn save(&self, store: &CredentialStore) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent() {
            create_private_dir_all(parent).map_err(AuthError::Persistence)?;
        }
        let encoded = encode_credential_store(store)
            .context("failed to encode credential store")
            .map_err(AuthError::Persistence)?;
        write_private_text_atomic(&self.path, &encoded).map_err(AuthError::Persistence)?;
        tracing::debug!(
            credential_store = %self.path.display(),
            profiles = store.profiles.len(),
            "saved credential store"
        );
        Ok(())
    }
}

pub fn parse_credential_store(raw: &str) -> Result<CredentialStore, serde_json::Error> {
    let store = serde_json::from_str::<CredentialStore>(raw)?;
    if store.version != CREDENTIAL_STORE_SCHEMA_VERSION {
        tracing::warn!(
            version = store.version,
            expected = CREDENTIAL_STORE_SCHEMA_VERSION,
            "credential store has an unexpected schema version"
        );
    }
    Ok(store)
}

pub fn encode_credential_store(store: &CredentialStore) -> Result<String, serde_json::Error> {
    let mut encoded = serde_json::to_string_pretty(store)?;
    encoded.push('\n');
    Ok(encoded)
}
