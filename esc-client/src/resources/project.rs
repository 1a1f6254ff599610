//! Projects
//!
//! Projects have no lifecycle status, so there is no waiter for them.

use reqwest::Method;
use serde::{Deserialize, Serialize};

use crate::client::{Client, OK, decode};
use crate::error::ClientResult;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Project {
    #[serde(deserialize_with = "super::null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "super::null_as_default")]
    pub organization_id: String,
    #[serde(deserialize_with = "super::null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "super::null_as_default")]
    pub created: String,
}

#[derive(Deserialize)]
struct GetProjectResponse {
    project: Project,
}

#[derive(Deserialize)]
struct ListProjectsResponse {
    #[serde(default, deserialize_with = "super::null_as_default")]
    projects: Vec<Project>,
}

impl Client {
    pub async fn project_get(&self, organization_id: &str, id: &str) -> ClientResult<Project> {
        let path = ["resources", "v1", "organizations", organization_id, "projects", id];
        let response = self
            .send(Method::GET, &path, "getting project", OK)
            .await?;
        decode::<GetProjectResponse>(response)
            .await
            .map(|r| r.project)
    }

    pub async fn project_list(&self, organization_id: &str) -> ClientResult<Vec<Project>> {
        let path = ["resources", "v1", "organizations", organization_id, "projects"];
        let response = self
            .send(Method::GET, &path, "listing projects", OK)
            .await?;
        decode::<ListProjectsResponse>(response)
            .await
            .map(|r| r.projects)
    }
}
