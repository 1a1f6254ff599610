//! Networks

use esc_core::StatusSnapshot;
use reqwest::Method;
use serde::{Deserialize, Serialize};

use super::{CreateResponse, ProjectScope};
use crate::client::{Client, OK, OK_OR_NO_CONTENT, decode};
use crate::error::ClientResult;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Network {
    #[serde(deserialize_with = "super::null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "super::null_as_default")]
    pub project_id: String,
    #[serde(deserialize_with = "super::null_as_default")]
    pub provider: String,
    #[serde(deserialize_with = "super::null_as_default")]
    pub region: String,
    #[serde(
        skip_serializing_if = "String::is_empty",
        deserialize_with = "super::null_as_default"
    )]
    pub cidr_block: String,
    #[serde(deserialize_with = "super::null_as_default")]
    pub description: String,
    #[serde(deserialize_with = "super::null_as_default")]
    pub status: String,
    #[serde(deserialize_with = "super::null_as_default")]
    pub public_access: bool,
}

impl StatusSnapshot for Network {
    fn status(&self) -> &str {
        &self.status
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNetworkRequest {
    pub provider: String,
    pub cidr_block: String,
    pub description: String,
    pub region: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateNetworkRequest {
    pub description: String,
}

#[derive(Deserialize)]
struct GetNetworkResponse {
    network: Network,
}

fn network_path<'a>(scope: &'a ProjectScope<'a>, id: Option<&'a str>) -> Vec<&'a str> {
    let mut path = vec![
        "infra",
        "v1",
        "organizations",
        scope.organization_id,
        "projects",
        scope.project_id,
        "networks",
    ];
    path.extend(id);
    path
}

impl Client {
    pub async fn network_create(
        &self,
        scope: &ProjectScope<'_>,
        request: &CreateNetworkRequest,
    ) -> ClientResult<CreateResponse> {
        let response = self
            .send_json(
                Method::POST,
                &network_path(scope, None),
                request,
                "creating network",
                OK,
            )
            .await?;
        decode(response).await
    }

    pub async fn network_get(&self, scope: &ProjectScope<'_>, id: &str) -> ClientResult<Network> {
        let response = self
            .send(Method::GET, &network_path(scope, Some(id)), "getting network", OK)
            .await?;
        decode::<GetNetworkResponse>(response)
            .await
            .map(|r| r.network)
    }

    pub async fn network_update(
        &self,
        scope: &ProjectScope<'_>,
        id: &str,
        request: &UpdateNetworkRequest,
    ) -> ClientResult<()> {
        self.send_json(
            Method::PUT,
            &network_path(scope, Some(id)),
            request,
            "updating network",
            OK_OR_NO_CONTENT,
        )
        .await
        .map(|_| ())
    }

    pub async fn network_delete(&self, scope: &ProjectScope<'_>, id: &str) -> ClientResult<()> {
        self.send(
            Method::DELETE,
            &network_path(scope, Some(id)),
            "deleting network",
            OK_OR_NO_CONTENT,
        )
        .await
        .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::test_support::client_for;
    use crate::error::ClientError;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const NETWORKS: &str = "/infra/v1/organizations/org-1/projects/proj-1/networks";

    fn scope() -> ProjectScope<'static> {
        ProjectScope::new("org-1", "proj-1")
    }

    #[test]
    fn test_null_fields_decode_as_empty() {
        let response: GetNetworkResponse = serde_json::from_value(json!({
            "network": {
                "id": "net-1",
                "cidrBlock": null,
                "description": null,
                "status": "available",
                "publicAccess": null
            }
        }))
        .unwrap();

        assert_eq!(
            response.network,
            Network {
                id: "net-1".to_string(),
                status: "available".to_string(),
                ..Default::default()
            }
        );
    }

    #[tokio::test]
    async fn test_network_create() {
        let server = MockServer::start().await;
        let (client, _) = client_for(&server).await;
        Mock::given(method("POST"))
            .and(path(NETWORKS))
            .and(body_json(json!({
                "provider": "aws",
                "cidrBlock": "172.21.0.0/16",
                "description": "primary",
                "region": "us-west-2"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "net-1"})))
            .expect(1)
            .mount(&server)
            .await;

        let request = CreateNetworkRequest {
            provider: "aws".to_string(),
            cidr_block: "172.21.0.0/16".to_string(),
            description: "primary".to_string(),
            region: "us-west-2".to_string(),
        };
        let created = client.network_create(&scope(), &request).await.unwrap();
        assert_eq!(created.id, "net-1");
    }

    #[tokio::test]
    async fn test_network_get() {
        let server = MockServer::start().await;
        let (client, _) = client_for(&server).await;
        Mock::given(method("GET"))
            .and(path(format!("{}/net-1", NETWORKS)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "network": {
                    "id": "net-1",
                    "projectId": "proj-1",
                    "provider": "aws",
                    "region": "us-west-2",
                    "cidrBlock": "172.21.0.0/16",
                    "description": "primary",
                    "status": "provisioning",
                    "publicAccess": true
                }
            })))
            .mount(&server)
            .await;

        let network = client.network_get(&scope(), "net-1").await.unwrap();
        assert_eq!(network.status, "provisioning");
        assert_eq!(network.cidr_block, "172.21.0.0/16");
        assert!(network.public_access);
    }

    #[tokio::test]
    async fn test_network_get_not_found() {
        let server = MockServer::start().await;
        let (client, _) = client_for(&server).await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "title": "Not Found",
                "status": 404,
                "detail": "network net-2 does not exist"
            })))
            .mount(&server)
            .await;

        let err = client.network_get(&scope(), "net-2").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(
            err.to_string(),
            "error getting network: Not Found: network net-2 does not exist"
        );
    }

    #[tokio::test]
    async fn test_network_get_bad_body() {
        let server = MockServer::start().await;
        let (client, _) = client_for(&server).await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .mount(&server)
            .await;

        let err = client.network_get(&scope(), "net-1").await.unwrap_err();
        assert!(matches!(err, ClientError::Decode(_)));
    }

    #[tokio::test]
    async fn test_network_update_and_delete_accept_no_content() {
        let server = MockServer::start().await;
        let (client, _) = client_for(&server).await;
        Mock::given(method("PUT"))
            .and(path(format!("{}/net-1", NETWORKS)))
            .and(body_json(json!({"description": "renamed"})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(format!("{}/net-1", NETWORKS)))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let update = UpdateNetworkRequest {
            description: "renamed".to_string(),
        };
        client.network_update(&scope(), "net-1", &update).await.unwrap();
        client.network_delete(&scope(), "net-1").await.unwrap();
    }

    #[tokio::test]
    async fn test_network_create_rejects_no_content() {
        let server = MockServer::start().await;
        let (client, _) = client_for(&server).await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let request = CreateNetworkRequest {
            provider: "gcp".to_string(),
            cidr_block: "10.0.0.0/16".to_string(),
            description: "n".to_string(),
            region: "us-central1".to_string(),
        };
        let err = client.network_create(&scope(), &request).await.unwrap_err();
        assert_eq!(err.to_string(), "error creating network: Status 204");
    }
}
