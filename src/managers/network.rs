//! Network policy manager
//!
//! Applies a zero-trust ingress posture to the tenant namespace: deny
//! everything, then allow traffic from pods in the same namespace and from
//! namespaces labelled as shared services. Only the three policies together
//! constitute the posture; a partially applied set is an intermediate state.

use crate::control_plane::ControlPlane;
use crate::error::Result;
use crate::labels::{
    shared_services_selector, ALLOW_SAME_NAMESPACE_POLICY, ALLOW_SHARED_SERVICES_POLICY,
    DEFAULT_DENY_POLICY,
};
use crate::reconcile::{DesiredState, ReconcileLog};
use crate::tenant::TenantHandle;
use k8s_openapi::api::networking::v1::{
    NetworkPolicy, NetworkPolicyIngressRule, NetworkPolicyPeer, NetworkPolicySpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use tracing::info;

/// The three rules every tenant namespace carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkRule {
    DefaultDeny,
    AllowSameNamespace,
    AllowSharedServices,
}

impl NetworkRule {
    pub const ALL: [NetworkRule; 3] = [
        NetworkRule::DefaultDeny,
        NetworkRule::AllowSameNamespace,
        NetworkRule::AllowSharedServices,
    ];

    pub fn policy_name(&self) -> &'static str {
        match self {
            NetworkRule::DefaultDeny => DEFAULT_DENY_POLICY,
            NetworkRule::AllowSameNamespace => ALLOW_SAME_NAMESPACE_POLICY,
            NetworkRule::AllowSharedServices => ALLOW_SHARED_SERVICES_POLICY,
        }
    }

    fn ingress(&self) -> Option<Vec<NetworkPolicyIngressRule>> {
        let peer = match self {
            NetworkRule::DefaultDeny => return None,
            NetworkRule::AllowSameNamespace => NetworkPolicyPeer {
                pod_selector: Some(LabelSelector::default()),
                ..Default::default()
            },
            NetworkRule::AllowSharedServices => NetworkPolicyPeer {
                namespace_selector: Some(LabelSelector {
                    match_labels: Some(shared_services_selector()),
                    ..Default::default()
                }),
                ..Default::default()
            },
        };
        Some(vec![NetworkPolicyIngressRule {
            from: Some(vec![peer]),
            ..Default::default()
        }])
    }
}

impl DesiredState for NetworkPolicy {
    fn matches(&self, observed: &Self) -> bool {
        self.spec == observed.spec
    }

    fn merge_into(&self, observed: &mut Self) {
        observed.spec = self.spec.clone();
    }
}

/// Build the policy for `rule`. Every policy selects all pods in the
/// namespace and governs ingress only.
pub fn desired_policy(tenant: &TenantHandle, rule: NetworkRule) -> NetworkPolicy {
    NetworkPolicy {
        metadata: ObjectMeta {
            name: Some(rule.policy_name().to_string()),
            namespace: Some(tenant.namespace().to_string()),
            ..Default::default()
        },
        spec: Some(NetworkPolicySpec {
            pod_selector: LabelSelector::default(),
            ingress: rule.ingress(),
            policy_types: Some(vec!["Ingress".to_string()]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Ensure default-deny, allow-same-namespace and allow-shared-services.
pub async fn ensure_network_policies<C: ControlPlane>(
    cp: &C,
    tenant: &TenantHandle,
    log: &mut ReconcileLog,
) -> Result<()> {
    info!(namespace = %tenant.namespace(), "Ensuring network policies");
    let policies = cp.namespaced_store::<NetworkPolicy>(tenant.namespace());

    for rule in NetworkRule::ALL {
        log.ensure(policies.as_ref(), &desired_policy(tenant, rule)).await?;
    }

    Ok(())
}
