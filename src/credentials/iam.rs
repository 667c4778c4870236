//! AWS IAM / STS implementation of [`CredentialStore`].

use super::{Credential, CredentialOperation, CredentialStore, CredentialSummary, StoreError};
use crate::config::AwsConfig;
use async_trait::async_trait;
use aws_sdk_iam::error::DisplayErrorContext;
use chrono::{DateTime, Utc};
use tracing::debug;

pub struct IamCredentialStore {
    iam: aws_sdk_iam::Client,
    sts: aws_sdk_sts::Client,
}

impl IamCredentialStore {
    /// Build clients from the default AWS credential chain.
    pub async fn from_config(config: &AwsConfig) -> Self {
        let sdk_config = config.load_sdk_config().await;

        tracing::info!(
            region = ?config.region,
            endpoint = ?config.endpoint_url,
            "Initialized IAM credential store"
        );

        Self {
            iam: aws_sdk_iam::Client::new(&sdk_config),
            sts: aws_sdk_sts::Client::new(&sdk_config),
        }
    }
}

fn to_utc(value: Option<&aws_sdk_iam::primitives::DateTime>) -> Option<DateTime<Utc>> {
    value.and_then(|d| DateTime::from_timestamp(d.secs(), d.subsec_nanos()))
}

#[async_trait]
impl CredentialStore for IamCredentialStore {
    async fn list_credentials(&self, principal: &str) -> Result<Vec<CredentialSummary>, StoreError> {
        let output = self
            .iam
            .list_access_keys()
            .user_name(principal)
            .send()
            .await
            .map_err(|e| {
                StoreError::provider(principal, CredentialOperation::ListKeys, DisplayErrorContext(&e))
            })?;

        let mut keys: Vec<CredentialSummary> = output
            .access_key_metadata()
            .iter()
            .filter_map(|meta| {
                meta.access_key_id().map(|id| CredentialSummary {
                    id: id.to_string(),
                    created_at: to_utc(meta.create_date()),
                })
            })
            .collect();

        // Newest first; keys without a creation date sort last.
        keys.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        debug!(principal, count = keys.len(), "listed access keys");
        Ok(keys)
    }

    async fn create_credential(&self, principal: &str) -> Result<Credential, StoreError> {
        let output = self
            .iam
            .create_access_key()
            .user_name(principal)
            .send()
            .await
            .map_err(|e| {
                let err = e.into_service_error();
                if err.is_limit_exceeded_exception() {
                    StoreError::CeilingExceeded {
                        principal: principal.to_string(),
                    }
                } else {
                    StoreError::provider(
                        principal,
                        CredentialOperation::CreateKey,
                        DisplayErrorContext(&err),
                    )
                }
            })?;

        let key = output.access_key().ok_or_else(|| {
            StoreError::provider(
                principal,
                CredentialOperation::CreateKey,
                "response did not contain an access key",
            )
        })?;

        Ok(Credential {
            id: key.access_key_id().to_string(),
            secret: key.secret_access_key().to_string(),
            principal: key.user_name().to_string(),
            created_at: to_utc(key.create_date()).unwrap_or_else(Utc::now),
        })
    }

    async fn delete_credential(&self, principal: &str, id: &str) -> Result<(), StoreError> {
        self.iam
            .delete_access_key()
            .user_name(principal)
            .access_key_id(id)
            .send()
            .await
            .map_err(|e| {
                StoreError::provider(principal, CredentialOperation::DeleteKey, DisplayErrorContext(&e))
            })?;
        Ok(())
    }

    async fn caller_account_id(&self) -> Result<String, StoreError> {
        let output = self.sts.get_caller_identity().send().await.map_err(|e| {
            StoreError::provider(
                "caller",
                CredentialOperation::ResolveAccount,
                aws_sdk_sts::error::DisplayErrorContext(&e),
            )
        })?;

        output.account().map(str::to_string).ok_or_else(|| {
            StoreError::provider(
                "caller",
                CredentialOperation::ResolveAccount,
                "response did not contain an account id",
            )
        })
    }
}
