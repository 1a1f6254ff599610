//! Resource models and their CRUD operations

mod cluster;
mod network;
mod peering;
mod project;

use serde::{Deserialize, Deserializer, Serialize};

pub use cluster::{CreateManagedClusterRequest, ManagedCluster, UpdateManagedClusterRequest};
pub use network::{CreateNetworkRequest, Network, UpdateNetworkRequest};
pub use peering::{CreatePeeringRequest, Peering, UpdatePeeringRequest};
pub use project::Project;

/// Organization and project a resource lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectScope<'a> {
    pub organization_id: &'a str,
    pub project_id: &'a str,
}

impl<'a> ProjectScope<'a> {
    pub fn new(organization_id: &'a str, project_id: &'a str) -> Self {
        Self {
            organization_id,
            project_id,
        }
    }
}

/// Body returned by every create operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateResponse {
    pub id: String,
}

/// Decodes `null` the same way as a missing field
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
