//! End-to-end tests for the rotation pipeline.
//!
//! Both collaborators are in-memory fakes, so these tests cover the stage
//! machine, the report, and the ordering guarantee that the previous key is
//! only deleted once propagation has run.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use pretty_assertions::assert_eq;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use key_rotation::credentials::{
    Credential, CredentialOperation, CredentialStore, CredentialSummary, StoreError,
    CREDENTIAL_CEILING,
};
use key_rotation::reconcile::{ReconciliationEngine, UnresolvedPair};
use key_rotation::rotation::{
    FinalState, RetirementPolicy, RotationOrchestrator, RotationReport, RotationStage,
};
use key_rotation::workspaces::{
    Variable, VariableAttributes, VariableCategory, Workspace, WorkspaceApi, WorkspaceApiError,
};

const PRINCIPAL: &str = "svc";

// ============================================================================
// Fake Identity Provider
// ============================================================================

#[derive(Default)]
struct FakeStore {
    /// Live keys, newest first.
    keys: Mutex<Vec<CredentialSummary>>,
    issued: AtomicUsize,
    deleted: Mutex<Vec<String>>,
    create_attempts: AtomicUsize,
    /// Report the ceiling on this many create calls regardless of key count.
    forced_ceiling: AtomicUsize,
    fail_create: bool,
    fail_delete: bool,
}

impl FakeStore {
    fn with_keys(ids: &[&str]) -> Self {
        let now = Utc::now();
        let keys = ids
            .iter()
            .enumerate()
            .map(|(i, id)| CredentialSummary {
                id: id.to_string(),
                created_at: Some(now - ChronoDuration::days(i as i64 + 1)),
            })
            .collect();
        Self {
            keys: Mutex::new(keys),
            ..Default::default()
        }
    }

    fn live_keys(&self) -> Vec<String> {
        self.keys.lock().unwrap().iter().map(|k| k.id.clone()).collect()
    }

    fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    fn create_attempts(&self) -> usize {
        self.create_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialStore for FakeStore {
    async fn list_credentials(&self, _principal: &str) -> Result<Vec<CredentialSummary>, StoreError> {
        Ok(self.keys.lock().unwrap().clone())
    }

    async fn create_credential(&self, principal: &str) -> Result<Credential, StoreError> {
        self.create_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_create {
            return Err(StoreError::provider(
                principal,
                CredentialOperation::CreateKey,
                "AccessDenied",
            ));
        }

        let forced = self
            .forced_ceiling
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        let mut keys = self.keys.lock().unwrap();
        if forced || keys.len() >= CREDENTIAL_CEILING {
            return Err(StoreError::CeilingExceeded {
                principal: principal.to_string(),
            });
        }

        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 2;
        let credential = Credential {
            id: format!("K{n}"),
            secret: format!("secret-{n}"),
            principal: principal.to_string(),
            created_at: Utc::now(),
        };
        keys.insert(
            0,
            CredentialSummary {
                id: credential.id.clone(),
                created_at: Some(credential.created_at),
            },
        );
        Ok(credential)
    }

    async fn delete_credential(&self, principal: &str, id: &str) -> Result<(), StoreError> {
        if self.fail_delete {
            return Err(StoreError::provider(
                principal,
                CredentialOperation::DeleteKey,
                "AccessDenied",
            ));
        }
        self.keys.lock().unwrap().retain(|k| k.id != id);
        self.deleted.lock().unwrap().push(id.to_string());
        Ok(())
    }

    async fn caller_account_id(&self) -> Result<String, StoreError> {
        Ok("123456789012".to_string())
    }
}

// ============================================================================
// Fake Workspace API
// ============================================================================

#[derive(Default)]
struct FakeApi {
    workspaces: Vec<Workspace>,
    variables: Vec<Variable>,
    fail_listing: bool,
    /// Variable ids whose update fails.
    fail_updates: HashSet<String>,
    /// Workspace ids whose creates fail.
    fail_creates: HashSet<String>,
    sent: Mutex<Vec<String>>,
}

impl FakeApi {
    fn with_workspaces(names: &[&str]) -> Self {
        Self {
            workspaces: names
                .iter()
                .map(|n| Workspace {
                    id: workspace_id(n),
                    name: n.to_string(),
                })
                .collect(),
            ..Default::default()
        }
    }

    /// Give `workspace` an existing env variable for every credential key.
    fn with_all_variables(mut self, workspace: &str) -> Self {
        for key in KEYS {
            self.variables.push(Variable {
                id: variable_id(workspace, key),
                workspace_id: Some(workspace_id(workspace)),
                key: key.to_string(),
                value: None,
                category: VariableCategory::Env,
                sensitive: true,
                hcl: false,
                description: None,
            });
        }
        self
    }

    fn sent(&self) -> Vec<String> {
        let mut sent = self.sent.lock().unwrap().clone();
        sent.sort();
        sent
    }
}

const KEYS: [&str; 5] = [
    "AWS_ACCOUNT_ID",
    "AWS_ACCESS_KEY_ID",
    "AWS_SECRET_ACCESS_KEY",
    "AWS_IAM_ROLE",
    "LAST_ROTATED",
];

fn workspace_id(name: &str) -> String {
    format!("ws-{name}")
}

fn variable_id(workspace: &str, key: &str) -> String {
    format!("var-{workspace}-{key}")
}

fn http_error(operation: &'static str) -> WorkspaceApiError {
    WorkspaceApiError::Status {
        operation,
        status: 503,
        body: "unavailable".to_string(),
    }
}

#[async_trait]
impl WorkspaceApi for FakeApi {
    async fn list_workspaces(&self) -> Result<Vec<Workspace>, WorkspaceApiError> {
        if self.fail_listing {
            return Err(http_error("list_workspaces"));
        }
        Ok(self.workspaces.clone())
    }

    async fn list_variables(&self) -> Result<Vec<Variable>, WorkspaceApiError> {
        Ok(self.variables.clone())
    }

    async fn create_variable(
        &self,
        workspace_id: &str,
        attributes: &VariableAttributes,
    ) -> Result<String, WorkspaceApiError> {
        self.sent
            .lock()
            .unwrap()
            .push(format!("create {workspace_id} {}", attributes.key));
        if self.fail_creates.contains(workspace_id) {
            return Err(http_error("create_variable"));
        }
        Ok(format!("var-new-{}", attributes.key))
    }

    async fn update_variable(
        &self,
        variable_id: &str,
        attributes: &VariableAttributes,
    ) -> Result<(), WorkspaceApiError> {
        self.sent
            .lock()
            .unwrap()
            .push(format!("update {variable_id} {}", attributes.key));
        if self.fail_updates.contains(variable_id) {
            return Err(http_error("update_variable"));
        }
        Ok(())
    }
}

fn orchestrator(store: &Arc<FakeStore>, api: &Arc<FakeApi>) -> RotationOrchestrator {
    RotationOrchestrator::new(store.clone(), api.clone(), PRINCIPAL)
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn rotates_and_retires_previous_key() {
    let store = Arc::new(FakeStore::with_keys(&["K1"]));
    let api = Arc::new(FakeApi::with_workspaces(&["A", "B"]).with_all_variables("A"));

    let report = orchestrator(&store, &api).run().await;

    assert_eq!(report.final_state, FinalState::Completed);
    assert_eq!(report.new_key_id.as_deref(), Some("K2"));
    assert_eq!(report.previous_key_id.as_deref(), Some("K1"));
    assert_eq!(report.retired_key_id.as_deref(), Some("K1"));
    assert_eq!(report.updated, 5);
    assert_eq!(report.created, 5);
    assert!(report.unresolved.is_empty());
    assert!(report.failures.is_empty());
    assert!(report.is_clean());

    assert_eq!(store.deleted(), vec!["K1"]);
    assert_eq!(store.live_keys(), vec!["K2"]);
    assert_eq!(api.sent().len(), 10);
}

#[tokio::test]
async fn failed_send_is_reported_and_previous_key_still_retired() {
    let store = Arc::new(FakeStore::with_keys(&["K1"]));
    let mut api = FakeApi::with_workspaces(&["A", "B"]).with_all_variables("A");
    api.fail_updates
        .insert(variable_id("A", "AWS_SECRET_ACCESS_KEY"));
    let api = Arc::new(api);

    let report = orchestrator(&store, &api).run().await;

    assert_eq!(api.sent().len(), 10);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].workspace, "A");
    assert_eq!(report.failures[0].key, "AWS_SECRET_ACCESS_KEY");
    assert_eq!(report.updated, 4);
    assert_eq!(report.created, 5);
    assert_eq!(report.final_state, FinalState::Completed);
    assert!(!report.is_clean());
    assert_eq!(store.deleted(), vec!["K1"]);
}

#[tokio::test]
async fn missing_target_workspace_is_unresolved_and_never_sent() {
    let store = Arc::new(FakeStore::with_keys(&["K1"]));
    let api = Arc::new(FakeApi::with_workspaces(&["A"]).with_all_variables("A"));

    let report = orchestrator(&store, &api)
        .with_engine(ReconciliationEngine::with_targets(["A", "C"]))
        .run()
        .await;

    let expected: Vec<UnresolvedPair> = KEYS
        .iter()
        .map(|k| UnresolvedPair {
            workspace: "C".to_string(),
            key: k.to_string(),
        })
        .collect();
    let mut unresolved = report.unresolved.clone();
    unresolved.sort();
    let mut expected = expected;
    expected.sort();

    assert_eq!(unresolved, expected);
    assert_eq!(report.updated, 5);
    assert_eq!(report.created, 0);
    assert!(api.sent().iter().all(|s| !s.contains("ws-C")));
    assert_eq!(report.final_state, FinalState::Completed);
}

#[tokio::test]
async fn no_previous_key_completes_without_delete() {
    let store = Arc::new(FakeStore::default());
    let api = Arc::new(FakeApi::with_workspaces(&["A"]));

    let report = orchestrator(&store, &api).run().await;

    assert_eq!(report.final_state, FinalState::Completed);
    assert_eq!(report.previous_key_id, None);
    assert_eq!(report.retired_key_id, None);
    assert_eq!(report.created, 5);
    assert!(store.deleted().is_empty());
}

#[tokio::test]
async fn at_ceiling_evicts_oldest_key_then_rotates() {
    let store = Arc::new(FakeStore::with_keys(&["K1", "K0"]));
    let api = Arc::new(FakeApi::with_workspaces(&["A"]).with_all_variables("A"));

    let report = orchestrator(&store, &api).run().await;

    assert_eq!(report.final_state, FinalState::Completed);
    assert_eq!(report.previous_key_id.as_deref(), Some("K1"));
    assert_eq!(store.deleted(), vec!["K0", "K1"]);
    assert_eq!(store.live_keys(), vec!["K2"]);
}

// ============================================================================
// Aborts
// ============================================================================

#[tokio::test]
async fn create_failure_aborts_at_idle_without_touching_keys() {
    let store = Arc::new(FakeStore {
        fail_create: true,
        ..FakeStore::with_keys(&["K1"])
    });
    let api = Arc::new(FakeApi::with_workspaces(&["A"]));

    let report = orchestrator(&store, &api).run().await;

    match &report.final_state {
        FinalState::Aborted { stage, error } => {
            assert_eq!(*stage, RotationStage::Idle);
            assert!(error.contains("create_access_key"), "{error}");
        }
        other => panic!("expected abort, got {other:?}"),
    }
    assert!(report.is_aborted());
    assert_eq!(report.new_key_id, None);
    assert!(store.deleted().is_empty());
    assert!(api.sent().is_empty());
}

#[tokio::test]
async fn exhausted_ceiling_retry_aborts_at_idle() {
    let store = Arc::new(FakeStore::with_keys(&["K1", "K0"]));
    store.forced_ceiling.store(2, Ordering::SeqCst);
    let api = Arc::new(FakeApi::with_workspaces(&["A"]).with_all_variables("A"));

    let report = orchestrator(&store, &api).run().await;

    match &report.final_state {
        FinalState::Aborted { stage, error } => {
            assert_eq!(*stage, RotationStage::Idle);
            assert!(error.contains("after evicting K0"), "{error}");
        }
        other => panic!("expected abort, got {other:?}"),
    }
    assert_eq!(store.create_attempts(), 2);
    assert_eq!(store.deleted(), vec!["K0"]);
    assert_eq!(store.live_keys(), vec!["K1"]);
    assert_eq!(report.new_key_id, None);
    assert!(api.sent().is_empty());
}

#[tokio::test]
async fn failed_retirement_aborts_after_propagation() {
    let store = Arc::new(FakeStore {
        fail_delete: true,
        ..FakeStore::with_keys(&["K1"])
    });
    let mut api = FakeApi::with_workspaces(&["A", "B"]).with_all_variables("A");
    api.fail_updates.insert(variable_id("A", "AWS_IAM_ROLE"));
    let api = Arc::new(api);

    let report = orchestrator(&store, &api).run().await;

    match &report.final_state {
        FinalState::Aborted { stage, error } => {
            assert_eq!(*stage, RotationStage::Propagated);
            assert!(error.contains("delete_access_key"), "{error}");
        }
        other => panic!("expected abort, got {other:?}"),
    }
    assert_eq!(report.new_key_id.as_deref(), Some("K2"));
    assert_eq!(report.previous_key_id.as_deref(), Some("K1"));
    assert_eq!(report.retired_key_id, None);
    assert_eq!(report.created, 5);
    assert_eq!(report.updated, 4);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].key, "AWS_IAM_ROLE");
    assert_eq!(store.live_keys(), vec!["K2", "K1"]);
}

#[tokio::test]
async fn snapshot_failure_keeps_both_keys() {
    let store = Arc::new(FakeStore::with_keys(&["K1"]));
    let api = Arc::new(FakeApi {
        fail_listing: true,
        ..FakeApi::with_workspaces(&["A"])
    });

    let report = orchestrator(&store, &api).run().await;

    assert!(matches!(
        report.final_state,
        FinalState::Aborted {
            stage: RotationStage::KeyCreated,
            ..
        }
    ));
    assert_eq!(report.new_key_id.as_deref(), Some("K2"));
    assert!(store.deleted().is_empty());
    assert_eq!(store.live_keys(), vec!["K2", "K1"]);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["finalState"]["state"], "aborted");
    assert_eq!(json["finalState"]["stage"], "keyCreated");
}

// ============================================================================
// Retirement Policy
// ============================================================================

#[tokio::test]
async fn policy_retains_previous_key_when_too_many_sends_fail() {
    let store = Arc::new(FakeStore::with_keys(&["K1"]));
    let mut api = FakeApi::with_workspaces(&["A", "B"]).with_all_variables("A");
    api.fail_creates.insert(workspace_id("B"));
    let api = Arc::new(api);

    let report = orchestrator(&store, &api)
        .with_policy(RetirementPolicy::min_success_ratio(0.9))
        .run()
        .await;

    assert!(matches!(report.final_state, FinalState::Retained { .. }));
    assert_eq!(report.failures.len(), 5);
    assert_eq!(report.retired_key_id, None);
    assert!(store.deleted().is_empty());
    assert!(!report.is_completed());
    assert!(!report.is_aborted());
}

#[tokio::test]
async fn policy_allows_retirement_above_threshold() {
    let store = Arc::new(FakeStore::with_keys(&["K1"]));
    let mut api = FakeApi::with_workspaces(&["A", "B"]).with_all_variables("A");
    api.fail_updates.insert(variable_id("A", "LAST_ROTATED"));
    let api = Arc::new(api);

    let report = orchestrator(&store, &api)
        .with_policy(RetirementPolicy::min_success_ratio(0.9))
        .run()
        .await;

    assert_eq!(report.final_state, FinalState::Completed);
    assert_eq!(store.deleted(), vec!["K1"]);
}

#[tokio::test]
async fn orchestrator_can_run_twice() {
    let store = Arc::new(FakeStore::with_keys(&["K1"]));
    let api = Arc::new(FakeApi::with_workspaces(&["A"]).with_all_variables("A"));
    let orchestrator = orchestrator(&store, &api);

    let first = orchestrator.run().await;
    let second = orchestrator.run().await;

    assert_eq!(first.retired_key_id.as_deref(), Some("K1"));
    assert_eq!(second.previous_key_id.as_deref(), Some("K2"));
    assert_eq!(second.retired_key_id.as_deref(), Some("K2"));
    assert_eq!(store.live_keys(), vec!["K3"]);
}

#[test]
fn report_serializes_final_state_with_tag() {
    let store = Arc::new(FakeStore::with_keys(&["K1"]));
    let api = Arc::new(FakeApi::with_workspaces(&["A"]).with_all_variables("A"));

    let report: RotationReport =
        tokio_test::block_on(orchestrator(&store, &api).run());
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["finalState"]["state"], "completed");
    assert_eq!(json["finalState"].get("stage"), None);
    assert_eq!(json["newKeyId"], "K2");
    assert_eq!(json["updated"], 5);
}
