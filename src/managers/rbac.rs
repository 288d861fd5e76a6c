//! Identity manager
//!
//! Ensures the tenant ServiceAccount, the Role granting its permissions and
//! the RoleBinding tying the two together. The Role is the whole
//! authorization surface a tenant gets; nothing else is implicitly allowed.

use crate::control_plane::ControlPlane;
use crate::error::Result;
use crate::labels::{role_binding_name, role_name};
use crate::reconcile::{DesiredState, ReconcileLog};
use crate::tenant::TenantHandle;
use k8s_openapi::api::core::v1::ServiceAccount;
use k8s_openapi::api::rbac::v1::{PolicyRule, Role, RoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::info;

pub const TENANT_API_GROUPS: &[&str] = &["", "apps"];
pub const TENANT_RESOURCES: &[&str] = &[
    "pods",
    "services",
    "deployments",
    "persistentvolumeclaims",
];
pub const TENANT_VERBS: &[&str] = &["get", "list", "watch", "create", "update", "delete"];

const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";

/// A ServiceAccount has no managed fields beyond its name.
impl DesiredState for ServiceAccount {
    fn matches(&self, _observed: &Self) -> bool {
        true
    }

    fn merge_into(&self, _observed: &mut Self) {}
}

/// Rules are replaced wholesale, so a Role missing a newly required verb is
/// brought up to the full set.
impl DesiredState for Role {
    fn matches(&self, observed: &Self) -> bool {
        self.rules == observed.rules
    }

    fn merge_into(&self, observed: &mut Self) {
        observed.rules = self.rules.clone();
    }
}

/// Subjects and roleRef are compared together; if either differs both are
/// written. The API server treats `roleRef` as immutable, so a drifted
/// `roleRef` is rejected (422, surfaced as `Rejected`) and the binding has to
/// be deleted and recreated by hand.
impl DesiredState for RoleBinding {
    fn matches(&self, observed: &Self) -> bool {
        self.subjects == observed.subjects && self.role_ref == observed.role_ref
    }

    fn merge_into(&self, observed: &mut Self) {
        observed.subjects = self.subjects.clone();
        observed.role_ref = self.role_ref.clone();
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

pub fn desired_service_account(tenant: &TenantHandle) -> ServiceAccount {
    ServiceAccount {
        metadata: ObjectMeta {
            name: Some(tenant.username().to_string()),
            namespace: Some(tenant.namespace().to_string()),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn desired_role(tenant: &TenantHandle) -> Role {
    Role {
        metadata: ObjectMeta {
            name: Some(role_name(tenant.username())),
            namespace: Some(tenant.namespace().to_string()),
            ..Default::default()
        },
        rules: Some(vec![PolicyRule {
            api_groups: Some(strings(TENANT_API_GROUPS)),
            resources: Some(strings(TENANT_RESOURCES)),
            verbs: strings(TENANT_VERBS),
            ..Default::default()
        }]),
    }
}

pub fn desired_role_binding(tenant: &TenantHandle) -> RoleBinding {
    RoleBinding {
        metadata: ObjectMeta {
            name: Some(role_binding_name(tenant.username())),
            namespace: Some(tenant.namespace().to_string()),
            ..Default::default()
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: tenant.username().to_string(),
            namespace: Some(tenant.namespace().to_string()),
            ..Default::default()
        }]),
        role_ref: RoleRef {
            api_group: RBAC_API_GROUP.to_string(),
            kind: "Role".to_string(),
            name: role_name(tenant.username()),
        },
    }
}

/// Ensure ServiceAccount, Role and RoleBinding, in that order.
pub async fn ensure_identity<C: ControlPlane>(
    cp: &C,
    tenant: &TenantHandle,
    log: &mut ReconcileLog,
) -> Result<()> {
    info!(namespace = %tenant.namespace(), "Ensuring identity and permissions");
    let namespace = tenant.namespace();

    let accounts = cp.namespaced_store::<ServiceAccount>(namespace);
    log.ensure(accounts.as_ref(), &desired_service_account(tenant)).await?;

    let roles = cp.namespaced_store::<Role>(namespace);
    log.ensure(roles.as_ref(), &desired_role(tenant)).await?;

    let bindings = cp.namespaced_store::<RoleBinding>(namespace);
    log.ensure(bindings.as_ref(), &desired_role_binding(tenant)).await?;

    Ok(())
}
