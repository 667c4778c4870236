//! Reconciliation of the desired credential fields against the workspace snapshot.
//!
//! Every (workspace, field) pair in the cross product becomes exactly one of:
//! an update of an existing `env` variable, a create in a known workspace, or
//! an unresolved pair that is reported and never sent.

use crate::credentials::{CredentialField, CredentialFieldSet};
use crate::workspaces::{VariableAttributes, VariableCategory, WorkspaceState};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// How a record will be applied remotely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum RecordAction {
    Update { variable_id: String },
    Create { workspace_id: String },
}

impl RecordAction {
    pub fn is_create(&self) -> bool {
        matches!(self, RecordAction::Create { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationRecord {
    pub workspace: String,
    pub field: CredentialField,
    pub action: RecordAction,
    pub attributes: VariableAttributes,
}

impl ReconciliationRecord {
    pub fn key(&self) -> &str {
        self.field.key()
    }
}

/// A (workspace, key) pair that maps to no remote identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct UnresolvedPair {
    pub workspace: String,
    pub key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationPlan {
    pub records: Vec<ReconciliationRecord>,
    pub unresolved: Vec<UnresolvedPair>,
}

impl ReconciliationPlan {
    pub fn creates(&self) -> usize {
        self.records.iter().filter(|r| r.action.is_create()).count()
    }

    pub fn updates(&self) -> usize {
        self.records.len() - self.creates()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReconciliationEngine {
    targets: Option<BTreeSet<String>>,
}

impl ReconciliationEngine {
    /// Reconcile every workspace in the snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconcile only the named workspaces. Names missing from the snapshot
    /// come back as unresolved pairs.
    pub fn with_targets<I, S>(targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            targets: Some(targets.into_iter().map(Into::into).collect()),
        }
    }

    pub fn targets(&self) -> Option<&BTreeSet<String>> {
        self.targets.as_ref()
    }

    pub fn reconcile(&self, fields: &CredentialFieldSet, state: &WorkspaceState) -> ReconciliationPlan {
        let names: Vec<&str> = match &self.targets {
            Some(targets) => targets.iter().map(String::as_str).collect(),
            None => state.workspace_names().collect(),
        };

        let mut plan = ReconciliationPlan::default();

        for workspace in names {
            for (field, value) in fields.iter() {
                let action = if let Some(existing) =
                    state.variable(workspace, field.key(), VariableCategory::Env)
                {
                    RecordAction::Update {
                        variable_id: existing.variable_id.clone(),
                    }
                } else if let Some(workspace_id) = state.workspace_id(workspace) {
                    RecordAction::Create {
                        workspace_id: workspace_id.to_string(),
                    }
                } else {
                    plan.unresolved.push(UnresolvedPair {
                        workspace: workspace.to_string(),
                        key: field.key().to_string(),
                    });
                    continue;
                };

                plan.records.push(ReconciliationRecord {
                    workspace: workspace.to_string(),
                    field,
                    action,
                    attributes: VariableAttributes {
                        key: field.key().to_string(),
                        value: value.to_string(),
                        description: field.description().to_string(),
                        category: VariableCategory::Env,
                        hcl: false,
                        sensitive: field.is_sensitive(),
                    },
                });
            }
        }

        for pair in &plan.unresolved {
            warn!(
                workspace = %pair.workspace,
                key = %pair.key,
                "workspace not found, variable cannot be reconciled"
            );
        }
        debug!(
            creates = plan.creates(),
            updates = plan.updates(),
            unresolved = plan.unresolved.len(),
            "reconciled credential fields"
        );

        plan
    }
}
