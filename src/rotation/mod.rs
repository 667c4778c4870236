//! End-to-end rotation: issue a key, reconcile, propagate, retire the old key.
//!
//! The pipeline is an explicit state machine:
//!
//! ```text
//! Idle -> KeyCreated -> Reconciled -> Propagated -> Completed
//!   \________\_____________\______________\-----> Aborted
//! ```
//!
//! The previous key is deleted only after `Propagated` is reached. Aborts
//! before that leave every existing key in place, including the freshly
//! issued one.

mod error;
mod report;

pub use error::RotationError;
pub use report::{FinalState, PropagationFailure, RotationReport};

use crate::credentials::{CredentialRotator, CredentialStore};
use crate::propagation::{PropagationExecutor, PropagationSummary};
use crate::reconcile::ReconciliationEngine;
use crate::workspaces::{WorkspaceApi, WorkspaceState};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RotationStage {
    Idle,
    KeyCreated,
    Reconciled,
    Propagated,
    Completed,
}

/// Decides whether the previous key may be retired once propagation has run.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RetirementPolicy {
    /// Minimum fraction of records that must succeed. `None` always retires.
    pub min_success_ratio: Option<f64>,
}

impl RetirementPolicy {
    pub fn always() -> Self {
        Self::default()
    }

    pub fn min_success_ratio(ratio: f64) -> Self {
        Self {
            min_success_ratio: Some(ratio),
        }
    }

    /// `Err(reason)` when the previous key must be kept.
    fn check(&self, summary: &PropagationSummary) -> Result<(), String> {
        match self.min_success_ratio {
            Some(min) if summary.success_ratio() < min => Err(format!(
                "success ratio {:.2} below required {:.2}",
                summary.success_ratio(),
                min
            )),
            _ => Ok(()),
        }
    }
}

pub struct RotationOrchestrator {
    store: Arc<dyn CredentialStore>,
    api: Arc<dyn WorkspaceApi>,
    principal: String,
    engine: ReconciliationEngine,
    executor: PropagationExecutor,
    policy: RetirementPolicy,
}

impl RotationOrchestrator {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        api: Arc<dyn WorkspaceApi>,
        principal: impl Into<String>,
    ) -> Self {
        let executor = PropagationExecutor::new(api.clone());
        Self {
            store,
            api,
            principal: principal.into(),
            engine: ReconciliationEngine::new(),
            executor,
            policy: RetirementPolicy::always(),
        }
    }

    pub fn with_engine(mut self, engine: ReconciliationEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_executor(mut self, executor: PropagationExecutor) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_policy(mut self, policy: RetirementPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn principal(&self) -> &str {
        &self.principal
    }

    /// Run one rotation. Always returns a report; aborts are recorded in
    /// [`RotationReport::final_state`].
    pub async fn run(&self) -> RotationReport {
        let mut report = RotationReport::new(&self.principal);
        let mut stage = RotationStage::Idle;

        if let Err(err) = self.drive(&mut stage, &mut report).await {
            report.final_state = FinalState::Aborted {
                stage,
                error: err.to_string(),
            };
        }

        report.log();
        report
    }

    async fn drive(
        &self,
        stage: &mut RotationStage,
        report: &mut RotationReport,
    ) -> Result<(), RotationError> {
        let mut rotator = CredentialRotator::new(self.store.clone(), self.principal.clone());

        // Idle -> KeyCreated
        report.previous_key_id = rotator.current_key_id().await?;
        let fields = rotator.begin().await?;
        report.new_key_id = Some(fields.access_key_id().to_string());
        advance(stage, RotationStage::KeyCreated, &self.principal);

        // KeyCreated -> Reconciled. A snapshot failure leaves the new key in place.
        let state = WorkspaceState::load(self.api.as_ref()).await?;
        let plan = self.engine.reconcile(&fields, &state);
        report.unresolved = plan.unresolved.clone();
        advance(stage, RotationStage::Reconciled, &self.principal);

        // Reconciled -> Propagated
        let summary = self.executor.apply(&plan.records).await;
        report.record_propagation(&summary);
        advance(stage, RotationStage::Propagated, &self.principal);

        // Propagated -> Completed
        if let Err(reason) = self.policy.check(&summary) {
            warn!(principal = %self.principal, %reason, "keeping previous access key");
            report.final_state = FinalState::Retained { reason };
            return Ok(());
        }
        report.retired_key_id = rotator.complete().await?;
        advance(stage, RotationStage::Completed, &self.principal);
        report.final_state = FinalState::Completed;
        Ok(())
    }
}

fn advance(stage: &mut RotationStage, next: RotationStage, principal: &str) {
    debug!(principal, from = ?*stage, to = ?next, "rotation stage");
    *stage = next;
}
