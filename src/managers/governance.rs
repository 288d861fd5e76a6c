//! Governance manager
//!
//! Ensures the aggregate ceilings (ResourceQuota) and the per-container
//! defaults and maximums (LimitRange) for a tenant namespace. Quantities are
//! compared by value because the API server may return a different spelling
//! than the one written.

use crate::config::GovernanceLimits;
use crate::control_plane::ControlPlane;
use crate::error::Result;
use crate::labels::{LIMIT_RANGE_NAME, QUOTA_NAME};
use crate::quantity::resource_lists_equal;
use crate::reconcile::{DesiredState, ReconcileLog};
use crate::tenant::TenantHandle;
use k8s_openapi::api::core::v1::{
    LimitRange, LimitRangeItem, LimitRangeSpec, ResourceQuota, ResourceQuotaSpec,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;
use tracing::info;

// Per-container policy, not user-configurable
const CONTAINER_DEFAULT_REQUEST_CPU: &str = "100m";
const CONTAINER_DEFAULT_REQUEST_MEMORY: &str = "128Mi";
const CONTAINER_DEFAULT_LIMIT_CPU: &str = "500m";
const CONTAINER_DEFAULT_LIMIT_MEMORY: &str = "512Mi";
const CONTAINER_MAX_CPU: &str = "1";
const CONTAINER_MAX_MEMORY: &str = "1Gi";

/// `spec.hard` is owned in full: extra keys count as drift and are dropped
/// on update, while `scopes` and `scopeSelector` are left alone.
impl DesiredState for ResourceQuota {
    fn matches(&self, observed: &Self) -> bool {
        let desired = self.spec.as_ref().and_then(|s| s.hard.as_ref());
        let current = observed.spec.as_ref().and_then(|s| s.hard.as_ref());
        resource_lists_equal(desired, current)
    }

    fn merge_into(&self, observed: &mut Self) {
        let hard = self.spec.as_ref().and_then(|s| s.hard.clone());
        observed.spec.get_or_insert_with(Default::default).hard = hard;
    }
}

impl DesiredState for LimitRange {
    fn matches(&self, observed: &Self) -> bool {
        let desired = self.spec.as_ref().map(|s| s.limits.as_slice()).unwrap_or_default();
        let current = observed
            .spec
            .as_ref()
            .map(|s| s.limits.as_slice())
            .unwrap_or_default();

        desired.len() == current.len()
            && desired
                .iter()
                .zip(current)
                .all(|(d, c)| limit_items_equal(d, c))
    }

    fn merge_into(&self, observed: &mut Self) {
        observed.spec = self.spec.clone();
    }
}

fn limit_items_equal(a: &LimitRangeItem, b: &LimitRangeItem) -> bool {
    a.type_ == b.type_
        && resource_lists_equal(a.default.as_ref(), b.default.as_ref())
        && resource_lists_equal(a.default_request.as_ref(), b.default_request.as_ref())
        && resource_lists_equal(a.max.as_ref(), b.max.as_ref())
        && resource_lists_equal(a.min.as_ref(), b.min.as_ref())
        && resource_lists_equal(
            a.max_limit_request_ratio.as_ref(),
            b.max_limit_request_ratio.as_ref(),
        )
}

fn cpu_memory(cpu: &str, memory: &str) -> BTreeMap<String, Quantity> {
    let mut list = BTreeMap::new();
    list.insert("cpu".to_string(), Quantity(cpu.to_string()));
    list.insert("memory".to_string(), Quantity(memory.to_string()));
    list
}

pub fn desired_quota(tenant: &TenantHandle, limits: &GovernanceLimits) -> ResourceQuota {
    let mut hard = BTreeMap::new();
    hard.insert("pods".to_string(), Quantity(limits.max_pods().to_string()));
    hard.insert("limits.cpu".to_string(), limits.cpu_limit().clone());
    hard.insert("limits.memory".to_string(), limits.memory_limit().clone());
    hard.insert(
        "requests.storage".to_string(),
        limits.storage_limit().clone(),
    );

    ResourceQuota {
        metadata: ObjectMeta {
            name: Some(QUOTA_NAME.to_string()),
            namespace: Some(tenant.namespace().to_string()),
            ..Default::default()
        },
        spec: Some(ResourceQuotaSpec {
            hard: Some(hard),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn desired_limit_range(tenant: &TenantHandle) -> LimitRange {
    LimitRange {
        metadata: ObjectMeta {
            name: Some(LIMIT_RANGE_NAME.to_string()),
            namespace: Some(tenant.namespace().to_string()),
            ..Default::default()
        },
        spec: Some(LimitRangeSpec {
            limits: vec![LimitRangeItem {
                type_: "Container".to_string(),
                default_request: Some(cpu_memory(
                    CONTAINER_DEFAULT_REQUEST_CPU,
                    CONTAINER_DEFAULT_REQUEST_MEMORY,
                )),
                default: Some(cpu_memory(
                    CONTAINER_DEFAULT_LIMIT_CPU,
                    CONTAINER_DEFAULT_LIMIT_MEMORY,
                )),
                max: Some(cpu_memory(CONTAINER_MAX_CPU, CONTAINER_MAX_MEMORY)),
                ..Default::default()
            }],
        }),
    }
}

/// Ensure the quota and the limit range.
pub async fn ensure_governance<C: ControlPlane>(
    cp: &C,
    tenant: &TenantHandle,
    limits: &GovernanceLimits,
    log: &mut ReconcileLog,
) -> Result<()> {
    info!(
        namespace = %tenant.namespace(),
        cpu = %limits.cpu_limit().0,
        memory = %limits.memory_limit().0,
        max_pods = limits.max_pods(),
        "Ensuring resource governance"
    );

    let quotas = cp.namespaced_store::<ResourceQuota>(tenant.namespace());
    log.ensure(quotas.as_ref(), &desired_quota(tenant, limits)).await?;

    let limit_ranges = cp.namespaced_store::<LimitRange>(tenant.namespace());
    log.ensure(limit_ranges.as_ref(), &desired_limit_range(tenant)).await?;

    Ok(())
}
