//! Access credentials for a single principal.
//!
//! The identity provider is reached through the [`CredentialStore`] trait;
//! [`rotator::CredentialRotator`] drives the create/evict/delete lifecycle on
//! top of it and produces the [`CredentialFieldSet`] that gets propagated to
//! every workspace.

pub mod iam;
pub mod rotator;

pub use iam::IamCredentialStore;
pub use rotator::CredentialRotator;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of live access keys the identity provider allows per principal.
pub const CREDENTIAL_CEILING: usize = 2;

// ============================================================================
// Credential Types
// ============================================================================

/// A newly issued access key, including its secret.
#[derive(Clone)]
pub struct Credential {
    pub id: String,
    pub secret: String,
    pub principal: String,
    pub created_at: DateTime<Utc>,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("secret", &"***")
            .field("principal", &self.principal)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// An existing access key as returned by a listing. Secrets are never listed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialSummary {
    pub id: String,
    pub created_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Field Set
// ============================================================================

/// The well-known variables written to every workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CredentialField {
    AccountId,
    AccessKeyId,
    SecretAccessKey,
    IamRole,
    LastRotated,
}

impl CredentialField {
    /// All fields, in propagation order.
    pub const ALL: [CredentialField; 5] = [
        CredentialField::AccountId,
        CredentialField::AccessKeyId,
        CredentialField::SecretAccessKey,
        CredentialField::IamRole,
        CredentialField::LastRotated,
    ];

    /// Variable key used in the workspace.
    pub fn key(self) -> &'static str {
        match self {
            CredentialField::AccountId => "AWS_ACCOUNT_ID",
            CredentialField::AccessKeyId => "AWS_ACCESS_KEY_ID",
            CredentialField::SecretAccessKey => "AWS_SECRET_ACCESS_KEY",
            CredentialField::IamRole => "AWS_IAM_ROLE",
            CredentialField::LastRotated => "LAST_ROTATED",
        }
    }

    /// Description attached to newly created variables.
    pub fn description(self) -> &'static str {
        match self {
            CredentialField::AccountId => "AWS account in which resources will be created",
            CredentialField::AccessKeyId => "AWS access key identifier used for Terraform executions",
            CredentialField::SecretAccessKey => "AWS secret key used for Terraform executions",
            CredentialField::IamRole => "AWS IAM role used for Terraform executions",
            CredentialField::LastRotated => "Date of last AWS key rotation",
        }
    }

    pub fn is_sensitive(self) -> bool {
        !matches!(self, CredentialField::IamRole | CredentialField::LastRotated)
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.key() == key)
    }
}

impl fmt::Display for CredentialField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Ordered field → value mapping derived from a freshly issued credential.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialFieldSet {
    values: [String; 5],
}

impl CredentialFieldSet {
    pub fn new(account_id: &str, credential: &Credential, rotated_on: NaiveDate) -> Self {
        Self {
            values: [
                account_id.to_string(),
                credential.id.clone(),
                credential.secret.clone(),
                credential.principal.clone(),
                rotated_on.format("%Y-%m-%d").to_string(),
            ],
        }
    }

    /// A field set with obviously fake values, for planning without issuing a key.
    pub fn placeholder(principal: &str) -> Self {
        Self {
            values: [
                "<account-id>".to_string(),
                "<new-access-key-id>".to_string(),
                "<new-secret-access-key>".to_string(),
                principal.to_string(),
                Utc::now().date_naive().format("%Y-%m-%d").to_string(),
            ],
        }
    }

    pub fn get(&self, field: CredentialField) -> &str {
        &self.values[field as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = (CredentialField, &str)> {
        CredentialField::ALL
            .into_iter()
            .zip(self.values.iter().map(String::as_str))
    }

    pub fn access_key_id(&self) -> &str {
        self.get(CredentialField::AccessKeyId)
    }
}

impl fmt::Debug for CredentialFieldSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (field, value) in self.iter() {
            if field.is_sensitive() {
                map.entry(&field.key(), &"***");
            } else {
                map.entry(&field.key(), &value);
            }
        }
        map.finish()
    }
}

// ============================================================================
// Store Trait
// ============================================================================

/// Identity provider calls the rotator depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialOperation {
    ListKeys,
    CreateKey,
    DeleteKey,
    ResolveAccount,
}

impl fmt::Display for CredentialOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CredentialOperation::ListKeys => "list_access_keys",
            CredentialOperation::CreateKey => "create_access_key",
            CredentialOperation::DeleteKey => "delete_access_key",
            CredentialOperation::ResolveAccount => "get_caller_identity",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The principal already holds [`CREDENTIAL_CEILING`] keys.
    #[error("({principal}) access key limit exceeded")]
    CeilingExceeded { principal: String },

    #[error("({principal}) {operation} failed: {message}")]
    Provider {
        principal: String,
        operation: CredentialOperation,
        message: String,
    },
}

impl StoreError {
    pub fn provider(
        principal: impl Into<String>,
        operation: CredentialOperation,
        message: impl fmt::Display,
    ) -> Self {
        StoreError::Provider {
            principal: principal.into(),
            operation,
            message: message.to_string(),
        }
    }
}

/// Capability over the identity provider's access keys.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Live keys for `principal`, newest first.
    async fn list_credentials(&self, principal: &str) -> Result<Vec<CredentialSummary>, StoreError>;

    async fn create_credential(&self, principal: &str) -> Result<Credential, StoreError>;

    async fn delete_credential(&self, principal: &str, id: &str) -> Result<(), StoreError>;

    /// Account the caller's own credentials belong to.
    async fn caller_account_id(&self) -> Result<String, StoreError>;
}
