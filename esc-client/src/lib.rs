//! Event Store Cloud API client
//!
//! Authenticated CRUD for networks, managed clusters, peerings and projects,
//! plus waiters that block until a resource reaches a status.

pub mod client;
pub mod config;
pub mod error;
pub mod resources;
pub mod waiters;

pub use client::Client;
pub use config::{Config, DEFAULT_API_URL};
pub use error::{ClientError, ClientResult, ProblemDetails};
pub use resources::{
    CreateManagedClusterRequest, CreateNetworkRequest, CreatePeeringRequest, CreateResponse,
    ManagedCluster, Network, Peering, Project, ProjectScope, UpdateManagedClusterRequest,
    UpdateNetworkRequest, UpdatePeeringRequest,
};
pub use waiters::{ClusterStatus, NetworkStatus, PeeringStatus};
