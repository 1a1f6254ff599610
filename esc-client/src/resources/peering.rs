//! Network peerings

use std::collections::HashMap;

use esc_core::StatusSnapshot;
use reqwest::Method;
use serde::{Deserialize, Serialize};

use super::{CreateResponse, ProjectScope};
use crate::client::{Client, OK, OK_OR_NO_CONTENT, decode};
use crate::error::ClientResult;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Peering {
    #[serde(deserialize_with = "super::null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "super::null_as_default")]
    pub project_id: String,
    #[serde(deserialize_with = "super::null_as_default")]
    pub network_id: String,
    #[serde(deserialize_with = "super::null_as_default")]
    pub provider: String,
    #[serde(deserialize_with = "super::null_as_default")]
    pub description: String,
    #[serde(deserialize_with = "super::null_as_default")]
    pub peer_account_id: String,
    #[serde(deserialize_with = "super::null_as_default")]
    pub peer_network_id: String,
    #[serde(deserialize_with = "super::null_as_default")]
    pub peer_network_region: String,
    /// Provider-side identifiers, filled in once the link is established
    #[serde(deserialize_with = "super::null_as_default")]
    pub provider_peering_metadata: HashMap<String, String>,
    #[serde(deserialize_with = "super::null_as_default")]
    pub routes: Vec<String>,
    #[serde(deserialize_with = "super::null_as_default")]
    pub status: String,
    #[serde(
        skip_serializing_if = "String::is_empty",
        deserialize_with = "super::null_as_default"
    )]
    pub created: String,
}

impl Peering {
    /// Whether the provider metadata the peer side needs is present.
    ///
    /// AWS peerings need `peeringLinkId`; GCP peerings need `projectId` and
    /// `networkId`. Other providers have no requirement.
    pub fn has_provider_metadata(&self) -> bool {
        let has = |key: &str| self.provider_peering_metadata.contains_key(key);
        match self.provider.as_str() {
            "aws" => has("peeringLinkId"),
            "gcp" => has("projectId") && has("networkId"),
            _ => true,
        }
    }
}

impl StatusSnapshot for Peering {
    fn status(&self) -> &str {
        &self.status
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePeeringRequest {
    pub network_id: String,
    pub description: String,
    pub peer_account_id: String,
    pub peer_network_id: String,
    pub peer_network_region: String,
    pub routes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdatePeeringRequest {
    pub description: String,
}

#[derive(Deserialize)]
struct GetPeeringResponse {
    peering: Peering,
}

fn peering_path<'a>(scope: &'a ProjectScope<'a>, id: Option<&'a str>) -> Vec<&'a str> {
    let mut path = vec![
        "infra",
        "v1",
        "organizations",
        scope.organization_id,
        "projects",
        scope.project_id,
        "peerings",
    ];
    path.extend(id);
    path
}

impl Client {
    pub async fn peering_create(
        &self,
        scope: &ProjectScope<'_>,
        request: &CreatePeeringRequest,
    ) -> ClientResult<CreateResponse> {
        let response = self
            .send_json(
                Method::POST,
                &peering_path(scope, None),
                request,
                "creating peering",
                OK,
            )
            .await?;
        decode(response).await
    }

    pub async fn peering_get(&self, scope: &ProjectScope<'_>, id: &str) -> ClientResult<Peering> {
        let response = self
            .send(Method::GET, &peering_path(scope, Some(id)), "getting peering", OK)
            .await?;
        decode::<GetPeeringResponse>(response)
            .await
            .map(|r| r.peering)
    }

    pub async fn peering_update(
        &self,
        scope: &ProjectScope<'_>,
        id: &str,
        request: &UpdatePeeringRequest,
    ) -> ClientResult<()> {
        self.send_json(
            Method::PUT,
            &peering_path(scope, Some(id)),
            request,
            "updating peering",
            OK_OR_NO_CONTENT,
        )
        .await
        .map(|_| ())
    }

    pub async fn peering_delete(&self, scope: &ProjectScope<'_>, id: &str) -> ClientResult<()> {
        self.send(
            Method::DELETE,
            &peering_path(scope, Some(id)),
            "deleting peering",
            OK_OR_NO_CONTENT,
        )
        .await
        .map(|_| ())
    }
}
