//! Resource - Kinds of waitable resources and the statuses they report

use std::fmt;

/// Status strings reported by the remote API.
///
/// The API owns these values; the client only reads and compares them.
/// Anything not listed here is still carried verbatim.
pub mod status {
    pub const PROVISIONING: &str = "provisioning";
    pub const AVAILABLE: &str = "available";
    pub const UPDATING: &str = "updating";
    pub const DELETING: &str = "deleting";
    pub const DELETED: &str = "deleted";
    pub const DEFUNCT: &str = "defunct";
    /// Peerings sit in `initiated` until the peer side accepts the link
    pub const INITIATED: &str = "initiated";
}

/// Kind of resource a waiter is blocking on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Network,
    Cluster,
    Peering,
}

impl ResourceKind {
    /// Name used in user-facing messages (e.g., "Network entered a defunct state!")
    pub fn display_name(&self) -> &'static str {
        match self {
            ResourceKind::Network => "Network",
            ResourceKind::Cluster => "Cluster",
            ResourceKind::Peering => "Peering",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Identifies the resource to poll and the status to wait for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitRequest {
    pub organization_id: String,
    pub project_id: String,
    pub resource_id: String,
    pub state: String,
}

impl WaitRequest {
    pub fn new(
        organization_id: impl Into<String>,
        project_id: impl Into<String>,
        resource_id: impl Into<String>,
        state: impl Into<String>,
    ) -> Self {
        Self {
            organization_id: organization_id.into(),
            project_id: project_id.into(),
            resource_id: resource_id.into(),
            state: state.into(),
        }
    }

    /// Whether the caller is waiting for the resource to disappear
    pub fn is_deletion(&self) -> bool {
        self.state == status::DELETED
    }
}

/// A point-in-time view of a remote resource that carries a status
pub trait StatusSnapshot {
    fn status(&self) -> &str;
}
