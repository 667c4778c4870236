//! Remote workspaces and the variables they hold.

pub mod state;
pub mod terraform;

pub use state::{VariableEntry, WorkspaceState};
pub use terraform::TerraformCloudClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

// ============================================================================
// Workspace Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableCategory {
    Terraform,
    Env,
}

impl fmt::Display for VariableCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariableCategory::Terraform => f.write_str("terraform"),
            VariableCategory::Env => f.write_str("env"),
        }
    }
}

/// A variable as listed by the remote API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub id: String,
    /// Owning workspace; `None` for variables attached to something else (e.g. a variable set).
    pub workspace_id: Option<String>,
    pub key: String,
    /// Sensitive values are never returned.
    pub value: Option<String>,
    pub category: VariableCategory,
    pub sensitive: bool,
    pub hcl: bool,
    pub description: Option<String>,
}

/// Attributes sent when creating or updating a variable.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct VariableAttributes {
    pub key: String,
    pub value: String,
    pub description: String,
    pub category: VariableCategory,
    pub hcl: bool,
    pub sensitive: bool,
}

impl fmt::Debug for VariableAttributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value: &str = if self.sensitive { "***" } else { &self.value };
        f.debug_struct("VariableAttributes")
            .field("key", &self.key)
            .field("value", &value)
            .field("category", &self.category)
            .field("hcl", &self.hcl)
            .field("sensitive", &self.sensitive)
            .finish()
    }
}

// ============================================================================
// API Trait
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum WorkspaceApiError {
    #[error("{operation} request failed: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{operation} returned {status}: {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("{operation} response could not be decoded: {message}")]
    Decode {
        operation: &'static str,
        message: String,
    },

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
}

/// Remote workspace/variable API, bound to one organisation.
#[async_trait]
pub trait WorkspaceApi: Send + Sync {
    async fn list_workspaces(&self) -> Result<Vec<Workspace>, WorkspaceApiError>;

    async fn list_variables(&self) -> Result<Vec<Variable>, WorkspaceApiError>;

    /// Create a variable in `workspace_id`; returns the id assigned by the API.
    async fn create_variable(
        &self,
        workspace_id: &str,
        attributes: &VariableAttributes,
    ) -> Result<String, WorkspaceApiError>;

    async fn update_variable(
        &self,
        variable_id: &str,
        attributes: &VariableAttributes,
    ) -> Result<(), WorkspaceApiError>;
}
