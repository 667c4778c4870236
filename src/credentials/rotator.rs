//! Lifecycle of one principal's access key pair.
//!
//! A rotator is single-use: it captures the key that was active when the
//! rotation started, issues at most one replacement, and retires the captured
//! key once the caller says propagation has run.

use super::{Credential, CredentialFieldSet, CredentialStore, StoreError};
use crate::rotation::RotationError;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct CredentialRotator {
    store: Arc<dyn CredentialStore>,
    principal: String,
    /// `None` until fetched; `Some(None)` when the principal had no key.
    previous_key_id: Option<Option<String>>,
    account_id: Option<String>,
    issued: Option<Credential>,
}

impl CredentialRotator {
    pub fn new(store: Arc<dyn CredentialStore>, principal: impl Into<String>) -> Self {
        Self {
            store,
            principal: principal.into(),
            previous_key_id: None,
            account_id: None,
            issued: None,
        }
    }

    pub fn principal(&self) -> &str {
        &self.principal
    }

    /// The key issued by [`begin`](Self::begin), if any.
    pub fn issued(&self) -> Option<&Credential> {
        self.issued.as_ref()
    }

    /// Key that was active before this rotation began.
    ///
    /// Fetched once and cached for the lifetime of the rotator.
    pub async fn current_key_id(&mut self) -> Result<Option<String>, RotationError> {
        if let Some(cached) = &self.previous_key_id {
            return Ok(cached.clone());
        }

        let keys = self.store.list_credentials(&self.principal).await?;
        let current = keys.first().map(|k| k.id.clone());
        debug!(principal = %self.principal, current = ?current, "captured active access key");
        self.previous_key_id = Some(current.clone());
        Ok(current)
    }

    async fn account_id(&mut self) -> Result<String, RotationError> {
        if let Some(account_id) = &self.account_id {
            return Ok(account_id.clone());
        }
        let account_id = self.store.caller_account_id().await?;
        self.account_id = Some(account_id.clone());
        Ok(account_id)
    }

    /// Issue a new key and return the field set to propagate.
    ///
    /// When the principal is already at the key ceiling, the oldest key is
    /// deleted and creation is retried exactly once.
    pub async fn begin(&mut self) -> Result<CredentialFieldSet, RotationError> {
        if self.issued.is_some() {
            return Err(RotationError::AlreadyIssued {
                principal: self.principal.clone(),
            });
        }

        // Capture the previous key before anything changes the key list.
        self.current_key_id().await?;
        let account_id = self.account_id().await?;

        let credential = match self.store.create_credential(&self.principal).await {
            Ok(credential) => credential,
            Err(StoreError::CeilingExceeded { .. }) => {
                warn!(principal = %self.principal, "access key limit reached, evicting oldest key");
                let evicted = self.evict_oldest().await?;
                warn!(principal = %self.principal, "retrying creating new credentials");
                match self.store.create_credential(&self.principal).await {
                    Ok(credential) => credential,
                    Err(StoreError::CeilingExceeded { principal }) => {
                        return Err(RotationError::CeilingExceeded {
                            principal,
                            evicted: Some(evicted),
                        });
                    }
                    Err(err) => return Err(err.into()),
                }
            }
            Err(err) => return Err(err.into()),
        };

        info!(principal = %self.principal, key_id = %credential.id, "created new access key");

        let fields = CredentialFieldSet::new(&account_id, &credential, Utc::now().date_naive());
        self.issued = Some(credential);
        Ok(fields)
    }

    async fn evict_oldest(&mut self) -> Result<String, RotationError> {
        let keys = self.store.list_credentials(&self.principal).await?;
        let Some(oldest) = keys.last().map(|k| k.id.clone()) else {
            return Err(RotationError::CeilingExceeded {
                principal: self.principal.clone(),
                evicted: None,
            });
        };

        self.store
            .delete_credential(&self.principal, &oldest)
            .await?;
        info!(principal = %self.principal, key_id = %oldest, "deleted oldest access key");

        // The evicted key may be the one we meant to retire later.
        if self.previous_key_id == Some(Some(oldest.clone())) {
            self.previous_key_id = Some(None);
        }
        Ok(oldest)
    }

    /// Delete the key captured by [`current_key_id`](Self::current_key_id).
    ///
    /// Returns the id of the retired key, or `None` when there was nothing to
    /// retire. Refuses to run unless [`begin`](Self::begin) succeeded.
    pub async fn complete(&mut self) -> Result<Option<String>, RotationError> {
        if self.issued.is_none() {
            return Err(RotationError::NoReplacement {
                principal: self.principal.clone(),
            });
        }

        let Some(previous) = self.previous_key_id.clone().flatten() else {
            info!(principal = %self.principal, "no previous key to delete");
            return Ok(None);
        };

        self.store
            .delete_credential(&self.principal, &previous)
            .await?;
        self.previous_key_id = Some(None);
        info!(principal = %self.principal, key_id = %previous, "deleted old access key");
        Ok(Some(previous))
    }
}
