//! Waiters for networks, clusters and peerings
//!
//! Each resource kind gets a [`StatusAccessor`] that reads the resource
//! through the [`Client`]; the polling itself is the shared
//! [`StateWaiter`](esc_core::StateWaiter).

use esc_core::{BoxFuture, ResourceKind, StatusAccessor, WaitRequest};
use tokio_util::sync::CancellationToken;

use crate::client::Client;
use crate::error::{ClientError, ClientResult};
use crate::resources::{ManagedCluster, Network, Peering, ProjectScope};

fn scope(request: &WaitRequest) -> ProjectScope<'_> {
    ProjectScope::new(&request.organization_id, &request.project_id)
}

pub struct NetworkStatus<'a>(pub &'a Client);

impl StatusAccessor for NetworkStatus<'_> {
    type Snapshot = Network;
    type Error = ClientError;

    fn kind(&self) -> ResourceKind {
        ResourceKind::Network
    }

    fn fetch<'b>(&'b self, request: &'b WaitRequest) -> BoxFuture<'b, ClientResult<Network>> {
        Box::pin(async move { self.0.network_get(&scope(request), &request.resource_id).await })
    }
}

pub struct ClusterStatus<'a>(pub &'a Client);

impl StatusAccessor for ClusterStatus<'_> {
    type Snapshot = ManagedCluster;
    type Error = ClientError;

    fn kind(&self) -> ResourceKind {
        ResourceKind::Cluster
    }

    fn fetch<'b>(
        &'b self,
        request: &'b WaitRequest,
    ) -> BoxFuture<'b, ClientResult<ManagedCluster>> {
        Box::pin(async move {
            self.0
                .managed_cluster_get(&scope(request), &request.resource_id)
                .await
        })
    }
}

/// Peerings also need their provider metadata before they are usable
pub struct PeeringStatus<'a>(pub &'a Client);

impl StatusAccessor for PeeringStatus<'_> {
    type Snapshot = Peering;
    type Error = ClientError;

    fn kind(&self) -> ResourceKind {
        ResourceKind::Peering
    }

    fn fetch<'b>(&'b self, request: &'b WaitRequest) -> BoxFuture<'b, ClientResult<Peering>> {
        Box::pin(async move { self.0.peering_get(&scope(request), &request.resource_id).await })
    }

    fn is_ready(&self, peering: &Peering) -> bool {
        peering.has_provider_metadata()
    }
}

impl Client {
    /// Block until a network reports `request.state`
    pub async fn network_wait_for_state(
        &self,
        request: &WaitRequest,
        cancel: &CancellationToken,
    ) -> ClientResult<Network> {
        Ok(self
            .waiter
            .wait_for_state(&NetworkStatus(self), request, cancel)
            .await?)
    }

    /// Block until a managed cluster reports `request.state`
    pub async fn managed_cluster_wait_for_state(
        &self,
        request: &WaitRequest,
        cancel: &CancellationToken,
    ) -> ClientResult<ManagedCluster> {
        Ok(self
            .waiter
            .wait_for_state(&ClusterStatus(self), request, cancel)
            .await?)
    }

    /// Block until a peering reports `request.state` and, unless waiting for
    /// deletion, carries the metadata its provider requires
    pub async fn peering_wait_for_state(
        &self,
        request: &WaitRequest,
        cancel: &CancellationToken,
    ) -> ClientResult<Peering> {
        Ok(self
            .waiter
            .wait_for_state(&PeeringStatus(self), request, cancel)
            .await?)
    }
}
