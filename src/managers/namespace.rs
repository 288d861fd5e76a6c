//! Namespace manager
//!
//! Ensures the tenant namespace exists and carries its ownership labels.

use crate::control_plane::ControlPlane;
use crate::error::Result;
use crate::labels::namespace_labels;
use crate::reconcile::{DesiredState, ReconcileLog, ReconcileOutcome};
use crate::tenant::TenantHandle;
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::info;

/// Only the labels podcraft stamps are compared. The API server adds its own
/// (`kubernetes.io/metadata.name`) and other actors may add more; those are
/// kept.
impl DesiredState for Namespace {
    fn matches(&self, observed: &Self) -> bool {
        let Some(desired) = self.metadata.labels.as_ref() else {
            return true;
        };
        let observed = observed.metadata.labels.as_ref();
        desired
            .iter()
            .all(|(key, value)| observed.and_then(|labels| labels.get(key)) == Some(value))
    }

    fn merge_into(&self, observed: &mut Self) {
        if let Some(desired) = &self.metadata.labels {
            let labels = observed.metadata.labels.get_or_insert_with(Default::default);
            for (key, value) in desired {
                labels.insert(key.clone(), value.clone());
            }
        }
    }
}

pub fn desired_namespace(tenant: &TenantHandle) -> Namespace {
    Namespace {
        metadata: ObjectMeta {
            name: Some(tenant.namespace().to_string()),
            labels: Some(namespace_labels(tenant.username())),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Ensure the tenant boundary exists with its ownership labels.
pub async fn ensure_namespace<C: ControlPlane>(
    cp: &C,
    tenant: &TenantHandle,
    log: &mut ReconcileLog,
) -> Result<ReconcileOutcome> {
    info!(namespace = %tenant.namespace(), "Ensuring namespace");
    let namespaces = cp.cluster_store::<Namespace>();
    log.ensure(namespaces.as_ref(), &desired_namespace(tenant)).await
}
