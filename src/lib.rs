//! podcraft
//!
//! Provisions isolated per-developer environments on a shared Kubernetes
//! cluster and tears them down again.
//!
//! ## Environment
//!
//! Each developer `<username>` gets:
//!
//! - Namespace `dev-<username>` labelled with its owner
//! - ServiceAccount, Role and RoleBinding scoped to that namespace
//! - `default-deny`, `allow-same-namespace` and `allow-shared-services`
//!   NetworkPolicies
//! - `dev-quota` ResourceQuota and `dev-limitrange` LimitRange
//! - `<username>.kubeconfig` holding a 24h token for the ServiceAccount
//!
//! Every object goes through the same ensure protocol, so running `create`
//! again converges drifted objects instead of failing or duplicating them.
//!
//! ## Example
//!
//! ```bash
//! podcraft create alice --cpu 4 --memory 4Gi --max-pods 20
//! podcraft describe alice
//! podcraft delete alice
//! ```

pub mod config;
pub mod control_plane;
pub mod credentials;
pub mod error;
pub mod labels;
pub mod managers;
pub mod provision;
pub mod quantity;
pub mod reconcile;
pub mod tenant;

pub use config::GovernanceLimits;
pub use control_plane::{ControlPlane, DeleteOutcome, KubeControlPlane, ResourceStore};
pub use credentials::{AdminEndpoint, Credential};
pub use error::{ErrorKind, ProvisionError, Result};
pub use provision::{
    create_environment, delete_environment, describe_environment, list_environments,
    with_deadline, EnvironmentDescription, EnvironmentSummary, ProvisionReport,
};
pub use reconcile::{ReconcileLog, ReconcileOutcome};
pub use tenant::TenantHandle;
