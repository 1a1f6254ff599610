//! Managed clusters

use esc_core::StatusSnapshot;
use reqwest::Method;
use serde::{Deserialize, Serialize};

use super::{CreateResponse, ProjectScope};
use crate::client::{Client, OK, OK_OR_NO_CONTENT, decode};
use crate::error::ClientResult;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ManagedCluster {
    #[serde(deserialize_with = "super::null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "super::null_as_default")]
    pub organization_id: String,
    #[serde(deserialize_with = "super::null_as_default")]
    pub project_id: String,
    #[serde(deserialize_with = "super::null_as_default")]
    pub network_id: String,
    #[serde(deserialize_with = "super::null_as_default")]
    pub description: String,
    #[serde(deserialize_with = "super::null_as_default")]
    pub provider: String,
    #[serde(deserialize_with = "super::null_as_default")]
    pub region: String,
    #[serde(deserialize_with = "super::null_as_default")]
    pub topology: String,
    #[serde(deserialize_with = "super::null_as_default")]
    pub instance_type: String,
    #[serde(deserialize_with = "super::null_as_default")]
    pub disk_size_gb: i32,
    #[serde(deserialize_with = "super::null_as_default")]
    pub disk_type: String,
    #[serde(deserialize_with = "super::null_as_default")]
    pub server_version: String,
    #[serde(deserialize_with = "super::null_as_default")]
    pub projection_level: String,
    #[serde(deserialize_with = "super::null_as_default")]
    pub status: String,
    #[serde(deserialize_with = "super::null_as_default")]
    pub created: String,
}

impl StatusSnapshot for ManagedCluster {
    fn status(&self) -> &str {
        &self.status
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateManagedClusterRequest {
    pub network_id: String,
    pub description: String,
    pub topology: String,
    pub instance_type: String,
    pub disk_size_gb: i32,
    pub disk_type: String,
    pub disk_iops: i32,
    pub disk_throughput: i32,
    pub server_version: String,
    pub projection_level: String,
    #[serde(rename = "cloudIntegratedAuthentication")]
    pub cloud_auth: bool,
    pub protected: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpdateManagedClusterRequest {
    pub description: String,
    pub protected: bool,
}

#[derive(Deserialize)]
struct GetManagedClusterResponse {
    cluster: ManagedCluster,
}

fn cluster_path<'a>(scope: &'a ProjectScope<'a>, id: Option<&'a str>) -> Vec<&'a str> {
    let mut path = vec![
        "mesdb",
        "v1",
        "organizations",
        scope.organization_id,
        "projects",
        scope.project_id,
        "clusters",
    ];
    path.extend(id);
    path
}

impl Client {
    pub async fn managed_cluster_create(
        &self,
        scope: &ProjectScope<'_>,
        request: &CreateManagedClusterRequest,
    ) -> ClientResult<CreateResponse> {
        let response = self
            .send_json(
                Method::POST,
                &cluster_path(scope, None),
                request,
                "creating managed cluster",
                OK,
            )
            .await?;
        decode(response).await
    }

    pub async fn managed_cluster_get(
        &self,
        scope: &ProjectScope<'_>,
        id: &str,
    ) -> ClientResult<ManagedCluster> {
        let response = self
            .send(
                Method::GET,
                &cluster_path(scope, Some(id)),
                "getting managed cluster",
                OK,
            )
            .await?;
        decode::<GetManagedClusterResponse>(response)
            .await
            .map(|r| r.cluster)
    }

    pub async fn managed_cluster_update(
        &self,
        scope: &ProjectScope<'_>,
        id: &str,
        request: &UpdateManagedClusterRequest,
    ) -> ClientResult<()> {
        self.send_json(
            Method::PUT,
            &cluster_path(scope, Some(id)),
            request,
            "updating cluster",
            OK_OR_NO_CONTENT,
        )
        .await
        .map(|_| ())
    }

    pub async fn managed_cluster_delete(
        &self,
        scope: &ProjectScope<'_>,
        id: &str,
    ) -> ClientResult<()> {
        self.send(
            Method::DELETE,
            &cluster_path(scope, Some(id)),
            "deleting managed cluster",
            OK_OR_NO_CONTENT,
        )
        .await
        .map(|_| ())
    }
}
