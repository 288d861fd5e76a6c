//! Resource managers for a tenant environment.
//!
//! Each manager builds the desired objects for one concern and converges
//! them through [`crate::reconcile::ensure`]. Managers stop at the first
//! error; already-converged objects are left in place.

pub mod governance;
pub mod namespace;
pub mod network;
pub mod rbac;

pub use governance::{desired_limit_range, desired_quota, ensure_governance};
pub use namespace::{desired_namespace, ensure_namespace};
pub use network::{desired_policy, ensure_network_policies, NetworkRule};
pub use rbac::{desired_role, desired_role_binding, desired_service_account, ensure_identity};
