//! Terraform Cloud / Enterprise implementation of [`WorkspaceApi`].
//!
//! Speaks the JSON:API dialect of `app.terraform.io/api/v2`. Listings follow
//! `meta.pagination.next-page` until it runs out.

use super::{
    Variable, VariableAttributes, VariableCategory, Workspace, WorkspaceApi, WorkspaceApiError,
};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const JSON_API: &str = "application/vnd.api+json";

pub struct TerraformCloudClient {
    base_url: String,
    organization: String,
    token: String,
    page_size: u32,
    timeout: Duration,
    client: Client,
}

impl TerraformCloudClient {
    pub fn new(
        base_url: &str,
        organization: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            organization: organization.into(),
            token: token.into(),
            page_size: 100,
            timeout,
            client,
        })
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn organization(&self) -> &str {
        &self.organization
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Content-Type", JSON_API)
    }

    async fn send(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<Response, WorkspaceApiError> {
        let resp = request.send().await.map_err(|source| {
            if source.is_timeout() {
                WorkspaceApiError::Timeout {
                    operation,
                    after: self.timeout,
                }
            } else {
                WorkspaceApiError::Transport { operation, source }
            }
        })?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(WorkspaceApiError::Status {
                operation,
                status,
                body,
            });
        }

        Ok(resp)
    }

    /// Collect every page of a listing endpoint.
    async fn list_all<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        url: &str,
        filters: &[(&str, &str)],
    ) -> Result<Vec<T>, WorkspaceApiError> {
        let mut items = Vec::new();
        let mut page = 1u32;

        loop {
            debug!(operation, url, page, "fetching page");
            let page_number = page.to_string();
            let page_size = self.page_size.to_string();
            let request = self
                .authorized(self.client.get(url))
                .query(filters)
                .query(&[
                    ("page[number]", page_number.as_str()),
                    ("page[size]", page_size.as_str()),
                ]);

            let resp = self.send(operation, request).await?;
            let body: ListDocument<T> = decode(operation, resp).await?;
            items.extend(body.data);

            match body.meta.and_then(|m| m.pagination).and_then(|p| p.next_page) {
                Some(next) if next > page => page = next,
                _ => break,
            }
        }

        Ok(items)
    }
}

async fn decode<T: DeserializeOwned>(
    operation: &'static str,
    resp: Response,
) -> Result<T, WorkspaceApiError> {
    let bytes = resp
        .bytes()
        .await
        .map_err(|source| WorkspaceApiError::Transport { operation, source })?;
    serde_json::from_slice(&bytes).map_err(|e| WorkspaceApiError::Decode {
        operation,
        message: e.to_string(),
    })
}

// ============================================================================
// JSON:API Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ListDocument<T> {
    data: Vec<T>,
    #[serde(default)]
    meta: Option<ListMeta>,
}

#[derive(Debug, Deserialize)]
struct ListMeta {
    pagination: Option<Pagination>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct Pagination {
    next_page: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct WorkspaceResource {
    id: String,
    attributes: WorkspaceResourceAttributes,
}

#[derive(Debug, Deserialize)]
struct WorkspaceResourceAttributes {
    name: String,
}

#[derive(Debug, Deserialize)]
struct VariableResource {
    id: String,
    attributes: VariableResourceAttributes,
    #[serde(default)]
    relationships: VariableRelationships,
}

#[derive(Debug, Deserialize)]
struct VariableResourceAttributes {
    key: String,
    value: Option<String>,
    category: VariableCategory,
    #[serde(default)]
    sensitive: bool,
    #[serde(default)]
    hcl: bool,
    description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct VariableRelationships {
    configurable: Option<Relationship>,
    workspace: Option<Relationship>,
}

#[derive(Debug, Deserialize)]
struct Relationship {
    data: Option<ResourceIdentifier>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ResourceIdentifier {
    id: String,
    #[serde(rename = "type")]
    kind: String,
}

impl VariableResource {
    fn into_variable(self) -> Variable {
        let rels = self.relationships;
        let workspace_id = rels
            .configurable
            .and_then(|r| r.data)
            .filter(|d| d.kind == "workspaces")
            .or_else(|| rels.workspace.and_then(|r| r.data))
            .map(|d| d.id);

        Variable {
            id: self.id,
            workspace_id,
            key: self.attributes.key,
            value: self.attributes.value,
            category: self.attributes.category,
            sensitive: self.attributes.sensitive,
            hcl: self.attributes.hcl,
            description: self.attributes.description,
        }
    }
}

#[derive(Debug, Serialize)]
struct VariableDocument<'a> {
    data: VariableData<'a>,
}

#[derive(Debug, Serialize)]
struct VariableData<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    attributes: &'a VariableAttributes,
    #[serde(skip_serializing_if = "Option::is_none")]
    relationships: Option<CreateRelationships>,
}

#[derive(Debug, Serialize)]
struct CreateRelationships {
    workspace: CreateRelationship,
}

#[derive(Debug, Serialize)]
struct CreateRelationship {
    data: ResourceIdentifier,
}

#[derive(Debug, Deserialize)]
struct CreatedDocument {
    data: CreatedResource,
}

#[derive(Debug, Deserialize)]
struct CreatedResource {
    id: String,
}

// ============================================================================
// WorkspaceApi Implementation
// ============================================================================

#[async_trait]
impl WorkspaceApi for TerraformCloudClient {
    async fn list_workspaces(&self) -> Result<Vec<Workspace>, WorkspaceApiError> {
        let url = format!(
            "{}/organizations/{}/workspaces",
            self.base_url, self.organization
        );
        let resources: Vec<WorkspaceResource> =
            self.list_all("list_workspaces", &url, &[]).await?;
        debug!(organization = %self.organization, count = resources.len(), "found workspaces");

        Ok(resources
            .into_iter()
            .map(|r| Workspace {
                id: r.id,
                name: r.attributes.name,
            })
            .collect())
    }

    async fn list_variables(&self) -> Result<Vec<Variable>, WorkspaceApiError> {
        let url = format!("{}/vars", self.base_url);
        let resources: Vec<VariableResource> = self
            .list_all(
                "list_variables",
                &url,
                &[("filter[organization][name]", self.organization.as_str())],
            )
            .await?;
        debug!(organization = %self.organization, count = resources.len(), "found variables");

        Ok(resources
            .into_iter()
            .map(VariableResource::into_variable)
            .collect())
    }

    async fn create_variable(
        &self,
        workspace_id: &str,
        attributes: &VariableAttributes,
    ) -> Result<String, WorkspaceApiError> {
        let body = VariableDocument {
            data: VariableData {
                kind: "vars",
                id: None,
                attributes,
                relationships: Some(CreateRelationships {
                    workspace: CreateRelationship {
                        data: ResourceIdentifier {
                            id: workspace_id.to_string(),
                            kind: "workspaces".to_string(),
                        },
                    },
                }),
            },
        };

        let request = self
            .authorized(self.client.post(format!("{}/vars", self.base_url)))
            .json(&body);
        let resp = self.send("create_variable", request).await?;
        let created: CreatedDocument = decode("create_variable", resp).await?;
        Ok(created.data.id)
    }

    async fn update_variable(
        &self,
        variable_id: &str,
        attributes: &VariableAttributes,
    ) -> Result<(), WorkspaceApiError> {
        let body = VariableDocument {
            data: VariableData {
                kind: "vars",
                id: Some(variable_id),
                attributes,
                relationships: None,
            },
        };

        let request = self
            .authorized(
                self.client
                    .patch(format!("{}/vars/{}", self.base_url, variable_id)),
            )
            .json(&body);
        self.send("update_variable", request).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn variable_workspace_comes_from_configurable_relationship() {
        let resource: VariableResource = serde_json::from_value(json!({
            "id": "var-1",
            "type": "vars",
            "attributes": {
                "key": "AWS_ACCESS_KEY_ID",
                "value": null,
                "category": "env",
                "sensitive": true,
                "hcl": false,
                "description": "old"
            },
            "relationships": {
                "configurable": { "data": { "id": "ws-a", "type": "workspaces" } }
            }
        }))
        .unwrap();

        let variable = resource.into_variable();
        assert_eq!(variable.workspace_id.as_deref(), Some("ws-a"));
        assert_eq!(variable.value, None);
        assert!(variable.sensitive);
    }

    #[test]
    fn variable_set_members_have_no_workspace() {
        let resource: VariableResource = serde_json::from_value(json!({
            "id": "var-2",
            "attributes": { "key": "K", "value": "v", "category": "terraform" },
            "relationships": {
                "configurable": { "data": { "id": "varset-1", "type": "varsets" } }
            }
        }))
        .unwrap();

        assert_eq!(resource.into_variable().workspace_id, None);
    }

    #[test]
    fn update_document_carries_id_and_no_relationships() {
        let attributes = VariableAttributes {
            key: "LAST_ROTATED".into(),
            value: "2026-10-18".into(),
            description: "Date of last AWS key rotation".into(),
            category: VariableCategory::Env,
            hcl: false,
            sensitive: false,
        };
        let body = VariableDocument {
            data: VariableData {
                kind: "vars",
                id: Some("var-9"),
                attributes: &attributes,
                relationships: None,
            },
        };

        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({
                "data": {
                    "type": "vars",
                    "id": "var-9",
                    "attributes": {
                        "key": "LAST_ROTATED",
                        "value": "2026-10-18",
                        "description": "Date of last AWS key rotation",
                        "category": "env",
                        "hcl": false,
                        "sensitive": false
                    }
                }
            })
        );
    }
}
