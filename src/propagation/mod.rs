//! Applies reconciliation records against the remote workspace API.
//!
//! Sends run with bounded concurrency. Each send is isolated: a failure or
//! timeout is recorded against that record only and never cancels siblings.

use crate::reconcile::{ReconciliationRecord, RecordAction};
use crate::workspaces::{WorkspaceApi, WorkspaceApiError};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

pub const DEFAULT_MAX_CONCURRENCY: usize = 8;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Create,
    Update,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordOutcome {
    pub workspace: String,
    pub key: String,
    pub operation: OperationKind,
    pub outcome: Outcome,
}

impl RecordOutcome {
    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }
}

/// Per-record outcomes in the order the records were given.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropagationSummary {
    pub outcomes: Vec<RecordOutcome>,
}

impl PropagationSummary {
    pub fn succeeded(&self, operation: OperationKind) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.operation == operation && o.is_success())
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &RecordOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    pub fn failure_count(&self) -> usize {
        self.failures().count()
    }

    /// Fraction of records that succeeded; 1.0 when there was nothing to send.
    pub fn success_ratio(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 1.0;
        }
        let ok = self.outcomes.iter().filter(|o| o.is_success()).count();
        ok as f64 / self.outcomes.len() as f64
    }
}

pub struct PropagationExecutor {
    api: Arc<dyn WorkspaceApi>,
    max_concurrency: usize,
    request_timeout: Duration,
}

impl PropagationExecutor {
    pub fn new(api: Arc<dyn WorkspaceApi>) -> Self {
        Self {
            api,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub async fn apply(&self, records: &[ReconciliationRecord]) -> PropagationSummary {
        debug!(
            records = records.len(),
            max_concurrency = self.max_concurrency,
            "propagating credential fields"
        );

        // `buffered` keeps results in input order while sends overlap.
        let outcomes: Vec<RecordOutcome> = stream::iter(records.iter().map(|r| self.apply_one(r)))
            .buffered(self.max_concurrency)
            .collect()
            .await;

        let summary = PropagationSummary { outcomes };
        info!(
            created = summary.succeeded(OperationKind::Create),
            updated = summary.succeeded(OperationKind::Update),
            failed = summary.failure_count(),
            "propagation finished"
        );
        summary
    }

    async fn apply_one(&self, record: &ReconciliationRecord) -> RecordOutcome {
        let (operation, result) = match &record.action {
            RecordAction::Update { variable_id } => (
                OperationKind::Update,
                self.with_timeout(
                    "update_variable",
                    self.api.update_variable(variable_id, &record.attributes),
                )
                .await,
            ),
            RecordAction::Create { workspace_id } => {
                let result = self
                    .with_timeout(
                        "create_variable",
                        self.api.create_variable(workspace_id, &record.attributes),
                    )
                    .await;
                if let Ok(variable_id) = &result {
                    debug!(
                        workspace = %record.workspace,
                        key = record.key(),
                        variable_id = %variable_id,
                        "created variable"
                    );
                }
                (OperationKind::Create, result.map(|_| ()))
            }
        };

        let outcome = match result {
            Ok(()) => Outcome::Success,
            Err(err) => {
                error!(
                    workspace = %record.workspace,
                    key = record.key(),
                    operation = ?operation,
                    error = %err,
                    "failed to propagate variable"
                );
                Outcome::Failure(err.to_string())
            }
        };

        RecordOutcome {
            workspace: record.workspace.clone(),
            key: record.key().to_string(),
            operation,
            outcome,
        }
    }

    async fn with_timeout<T>(
        &self,
        operation: &'static str,
        call: impl std::future::Future<Output = Result<T, WorkspaceApiError>>,
    ) -> Result<T, WorkspaceApiError> {
        match tokio::time::timeout(self.request_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(WorkspaceApiError::Timeout {
                operation,
                after: self.request_timeout,
            }),
        }
    }
}
