//! Structured outcome of one rotation run.

use super::RotationStage;
use crate::propagation::{OperationKind, Outcome, PropagationSummary};
use crate::reconcile::UnresolvedPair;
use serde::Serialize;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum FinalState {
    Completed,
    /// Propagation ran but the retirement policy kept the previous key alive.
    Retained { reason: String },
    Aborted { stage: RotationStage, error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropagationFailure {
    pub workspace: String,
    pub key: String,
    pub operation: OperationKind,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationReport {
    pub principal: String,
    pub new_key_id: Option<String>,
    pub previous_key_id: Option<String>,
    pub retired_key_id: Option<String>,
    pub created: usize,
    pub updated: usize,
    pub unresolved: Vec<UnresolvedPair>,
    pub failures: Vec<PropagationFailure>,
    pub final_state: FinalState,
}

impl RotationReport {
    pub(crate) fn new(principal: &str) -> Self {
        Self {
            principal: principal.to_string(),
            new_key_id: None,
            previous_key_id: None,
            retired_key_id: None,
            created: 0,
            updated: 0,
            unresolved: Vec::new(),
            failures: Vec::new(),
            final_state: FinalState::Completed,
        }
    }

    pub(crate) fn record_propagation(&mut self, summary: &PropagationSummary) {
        self.created = summary.succeeded(OperationKind::Create);
        self.updated = summary.succeeded(OperationKind::Update);
        self.failures = summary
            .failures()
            .filter_map(|o| match &o.outcome {
                Outcome::Failure(reason) => Some(PropagationFailure {
                    workspace: o.workspace.clone(),
                    key: o.key.clone(),
                    operation: o.operation,
                    reason: reason.clone(),
                }),
                Outcome::Success => None,
            })
            .collect();
    }

    pub fn is_completed(&self) -> bool {
        self.final_state == FinalState::Completed
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self.final_state, FinalState::Aborted { .. })
    }

    /// Completed with nothing skipped or failed.
    pub fn is_clean(&self) -> bool {
        self.is_completed() && self.unresolved.is_empty() && self.failures.is_empty()
    }

    /// Emit the report at a level matching how well the run went.
    pub fn log(&self) {
        let report = serde_json::to_string(self).unwrap_or_default();
        match &self.final_state {
            FinalState::Aborted { stage, error } => {
                error!(principal = %self.principal, stage = ?stage, %error, %report, "rotation aborted");
            }
            _ if !self.is_clean() => {
                warn!(
                    principal = %self.principal,
                    unresolved = self.unresolved.len(),
                    failed = self.failures.len(),
                    %report,
                    "rotation finished with issues"
                );
            }
            _ => {
                info!(
                    principal = %self.principal,
                    created = self.created,
                    updated = self.updated,
                    "rotated access keys"
                );
            }
        }
    }
}
