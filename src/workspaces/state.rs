//! Read-only snapshot of every workspace and variable in the organisation.

use super::{Variable, VariableCategory, Workspace, WorkspaceApi, WorkspaceApiError};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// Current remote state of one variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableEntry {
    pub variable_id: String,
    pub workspace_id: String,
    pub value: Option<String>,
    pub category: VariableCategory,
    pub sensitive: bool,
    pub hcl: bool,
}

#[derive(Debug, Clone, Default)]
pub struct WorkspaceState {
    workspaces: BTreeMap<String, String>,
    variables: BTreeMap<(String, VariableCategory, String), VariableEntry>,
    detached: usize,
}

impl WorkspaceState {
    /// Fetch workspaces and variables and join them.
    pub async fn load(api: &dyn WorkspaceApi) -> Result<Self, WorkspaceApiError> {
        let workspaces = api.list_workspaces().await?;
        let variables = api.list_variables().await?;
        Ok(Self::from_parts(workspaces, variables))
    }

    /// Join variables to their owning workspace by relationship id.
    pub fn from_parts(workspaces: Vec<Workspace>, variables: Vec<Variable>) -> Self {
        let names_by_id: HashMap<&str, &str> = workspaces
            .iter()
            .map(|w| (w.id.as_str(), w.name.as_str()))
            .collect();

        let mut indexed = BTreeMap::new();
        let mut detached = 0;

        for variable in &variables {
            let Some((workspace_id, workspace_name)) = variable
                .workspace_id
                .as_deref()
                .and_then(|id| names_by_id.get(id).map(|name| (id, *name)))
            else {
                detached += 1;
                continue;
            };

            let index_key = (
                workspace_name.to_string(),
                variable.category,
                variable.key.clone(),
            );
            let entry = VariableEntry {
                variable_id: variable.id.clone(),
                workspace_id: workspace_id.to_string(),
                value: variable.value.clone(),
                category: variable.category,
                sensitive: variable.sensitive,
                hcl: variable.hcl,
            };

            // Duplicates resolve to the lowest variable id, whatever the listing order.
            match indexed.entry(index_key) {
                Entry::Vacant(slot) => {
                    slot.insert(entry);
                }
                Entry::Occupied(mut slot) => {
                    warn!(
                        workspace = workspace_name,
                        key = %variable.key,
                        kept = %slot.get().variable_id.as_str().min(variable.id.as_str()),
                        "duplicate variable key, keeping the lowest id"
                    );
                    if entry.variable_id < slot.get().variable_id {
                        slot.insert(entry);
                    }
                }
            }
        }

        if detached > 0 {
            warn!(detached, "variables not attached to any listed workspace were ignored");
        }

        let workspaces: BTreeMap<String, String> = workspaces
            .into_iter()
            .map(|w| (w.name, w.id))
            .collect();

        debug!(
            workspaces = workspaces.len(),
            variables = indexed.len(),
            "built workspace snapshot"
        );

        Self {
            workspaces,
            variables: indexed,
            detached,
        }
    }

    pub fn workspace_id(&self, name: &str) -> Option<&str> {
        self.workspaces.get(name).map(String::as_str)
    }

    /// Workspace names in sorted order.
    pub fn workspace_names(&self) -> impl Iterator<Item = &str> {
        self.workspaces.keys().map(String::as_str)
    }

    pub fn variable(
        &self,
        workspace: &str,
        key: &str,
        category: VariableCategory,
    ) -> Option<&VariableEntry> {
        self.variables
            .get(&(workspace.to_string(), category, key.to_string()))
    }

    pub fn workspace_count(&self) -> usize {
        self.workspaces.len()
    }

    pub fn variable_count(&self) -> usize {
        self.variables.len()
    }

    /// Variables whose owning workspace was not in the listing.
    pub fn detached_count(&self) -> usize {
        self.detached
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workspace(id: &str, name: &str) -> Workspace {
        Workspace {
            id: id.into(),
            name: name.into(),
        }
    }

    fn variable(id: &str, workspace_id: Option<&str>, key: &str, category: VariableCategory) -> Variable {
        Variable {
            id: id.into(),
            workspace_id: workspace_id.map(String::from),
            key: key.into(),
            value: Some("old".into()),
            category,
            sensitive: false,
            hcl: false,
            description: None,
        }
    }

    #[test]
    fn joins_variables_to_workspace_names() {
        let state = WorkspaceState::from_parts(
            vec![workspace("ws-a", "alpha"), workspace("ws-b", "beta")],
            vec![
                variable("var-1", Some("ws-a"), "AWS_ACCESS_KEY_ID", VariableCategory::Env),
                variable("var-2", Some("ws-b"), "AWS_ACCESS_KEY_ID", VariableCategory::Env),
            ],
        );

        assert_eq!(state.workspace_id("alpha"), Some("ws-a"));
        let entry = state
            .variable("beta", "AWS_ACCESS_KEY_ID", VariableCategory::Env)
            .unwrap();
        assert_eq!(entry.variable_id, "var-2");
        assert_eq!(entry.workspace_id, "ws-b");
        assert_eq!(state.variable_count(), 2);
    }

    #[test]
    fn category_is_part_of_the_lookup() {
        let state = WorkspaceState::from_parts(
            vec![workspace("ws-a", "alpha")],
            vec![variable("var-1", Some("ws-a"), "AWS_IAM_ROLE", VariableCategory::Terraform)],
        );

        assert!(state
            .variable("alpha", "AWS_IAM_ROLE", VariableCategory::Env)
            .is_none());
        assert!(state
            .variable("alpha", "AWS_IAM_ROLE", VariableCategory::Terraform)
            .is_some());
    }

    #[test]
    fn variables_without_listed_workspace_are_detached() {
        let state = WorkspaceState::from_parts(
            vec![workspace("ws-a", "alpha")],
            vec![
                variable("var-1", Some("ws-gone"), "AWS_ACCESS_KEY_ID", VariableCategory::Env),
                variable("var-2", None, "AWS_ACCESS_KEY_ID", VariableCategory::Env),
            ],
        );

        assert_eq!(state.detached_count(), 2);
        assert_eq!(state.variable_count(), 0);
    }

    #[test]
    fn duplicate_keys_resolve_independent_of_listing_order() {
        let first = variable("var-1", Some("ws-a"), "LAST_ROTATED", VariableCategory::Env);
        let second = variable("var-2", Some("ws-a"), "LAST_ROTATED", VariableCategory::Env);

        for listing in [
            vec![first.clone(), second.clone()],
            vec![second.clone(), first.clone()],
        ] {
            let state = WorkspaceState::from_parts(vec![workspace("ws-a", "alpha")], listing);
            let entry = state
                .variable("alpha", "LAST_ROTATED", VariableCategory::Env)
                .unwrap();
            assert_eq!(entry.variable_id, "var-1");
            assert_eq!(state.variable_count(), 1);
        }
    }

    #[test]
    fn workspace_names_are_sorted() {
        let state = WorkspaceState::from_parts(
            vec![workspace("ws-2", "zeta"), workspace("ws-1", "alpha")],
            vec![],
        );
        let names: Vec<&str> = state.workspace_names().collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }
}
