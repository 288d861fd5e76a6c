//! Provisioning pipeline
//!
//! Orders the managers into the create flow and implements delete, describe
//! and list on top of the same control plane.
//!
//! Create runs Namespace, Identity, Credential, Network and Governance in
//! strict sequence and stops at the first error without rolling back. Every
//! step except credential issuance converges, so re-running after a failure
//! resumes where the previous run stopped.

use crate::config::GovernanceLimits;
use crate::control_plane::{ControlPlane, DeleteOutcome};
use crate::credentials::{self, AdminEndpoint};
use crate::error::{ProvisionError, Result};
use crate::labels::{NAMESPACE_PREFIX, OWNER_LABEL, QUOTA_NAME};
use crate::managers::{
    ensure_governance, ensure_identity, ensure_namespace, ensure_network_policies,
};
use crate::reconcile::ReconcileLog;
use crate::tenant::TenantHandle;
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{Namespace, Pod, ResourceQuota};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use kube::ResourceExt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// What a create run did so far. Survives errors and deadline expiry, so
/// the caller can report the steps that completed.
#[derive(Debug, Default)]
pub struct ProvisionReport {
    pub log: ReconcileLog,
    pub profile_path: Option<PathBuf>,
    pub token_expires_at: Option<DateTime<Utc>>,
}

impl ProvisionReport {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Create or converge the tenant environment and export its kubeconfig
/// into `output_dir`.
pub async fn create_environment<C: ControlPlane>(
    cp: &C,
    tenant: &TenantHandle,
    limits: &GovernanceLimits,
    endpoint: &AdminEndpoint,
    output_dir: &Path,
    report: &mut ProvisionReport,
) -> Result<()> {
    info!(tenant = %tenant, "Provisioning developer environment");

    ensure_namespace(cp, tenant, &mut report.log).await?;
    ensure_identity(cp, tenant, &mut report.log).await?;

    let credential = credentials::issue(cp, tenant).await?;
    let profile = credentials::build_profile(endpoint, tenant, &credential);
    report.profile_path = Some(credentials::export(&profile, output_dir, tenant)?);
    report.token_expires_at = credential.expires_at;

    ensure_network_policies(cp, tenant, &mut report.log).await?;
    ensure_governance(cp, tenant, limits, &mut report.log).await?;

    info!(namespace = %tenant.namespace(), "Developer environment ready");
    Ok(())
}

/// Delete the tenant namespace. Everything inside it is removed by the API
/// server's cascading delete.
pub async fn delete_environment<C: ControlPlane>(
    cp: &C,
    tenant: &TenantHandle,
) -> Result<DeleteOutcome> {
    let outcome = cp
        .cluster_store::<Namespace>()
        .delete(tenant.namespace())
        .await?;

    match outcome {
        DeleteOutcome::Deleted => info!(namespace = %tenant.namespace(), "Deleted namespace"),
        DeleteOutcome::AlreadyAbsent => {
            info!(namespace = %tenant.namespace(), "Namespace does not exist")
        }
    }
    Ok(outcome)
}

/// Run `future`, abandoning it once `deadline` elapses.
///
/// Steps that completed before expiry stay applied; the ones still pending
/// are dropped.
pub async fn with_deadline<T, F>(deadline: Option<Duration>, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match deadline {
        None => future.await,
        Some(limit) => match tokio::time::timeout(limit, future).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout_secs = limit.as_secs_f64(), "Deadline exceeded");
                Err(ProvisionError::DeadlineExceeded)
            }
        },
    }
}

/// Quota consumption for one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaUsage {
    pub resource: String,
    pub used: Option<String>,
    pub hard: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodSummary {
    pub name: String,
    pub phase: Option<String>,
}

/// Best-effort view of a tenant environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentDescription {
    pub namespace: String,
    pub owner: Option<String>,
    pub quota: Vec<QuotaUsage>,
    pub pods: Vec<PodSummary>,
    pub network_policies: Vec<String>,
}

/// Describe the environment, or `None` when its namespace does not exist.
///
/// Only the namespace read is fatal. A section that cannot be read is logged
/// and left empty.
pub async fn describe_environment<C: ControlPlane>(
    cp: &C,
    tenant: &TenantHandle,
) -> Result<Option<EnvironmentDescription>> {
    let namespace = tenant.namespace();
    let Some(ns) = cp.cluster_store::<Namespace>().get(namespace).await? else {
        return Ok(None);
    };

    let quota = match cp
        .namespaced_store::<ResourceQuota>(namespace)
        .get(QUOTA_NAME)
        .await
    {
        Ok(quota) => quota.map(|q| quota_usage(&q)).unwrap_or_default(),
        Err(e) => {
            warn!(namespace = %namespace, error = %e, "Could not read resource quota");
            Vec::new()
        }
    };

    let pods = match cp.namespaced_store::<Pod>(namespace).list(None).await {
        Ok(pods) => pods
            .iter()
            .map(|pod| PodSummary {
                name: pod.name_any(),
                phase: pod.status.as_ref().and_then(|s| s.phase.clone()),
            })
            .collect(),
        Err(e) => {
            warn!(namespace = %namespace, error = %e, "Could not list pods");
            Vec::new()
        }
    };

    let network_policies = match cp
        .namespaced_store::<NetworkPolicy>(namespace)
        .list(None)
        .await
    {
        Ok(policies) => {
            let mut names: Vec<String> = policies.iter().map(|p| p.name_any()).collect();
            names.sort();
            names
        }
        Err(e) => {
            warn!(namespace = %namespace, error = %e, "Could not list network policies");
            Vec::new()
        }
    };

    Ok(Some(EnvironmentDescription {
        namespace: namespace.to_string(),
        owner: ns.labels().get(OWNER_LABEL).cloned(),
        quota,
        pods,
        network_policies,
    }))
}

fn quota_usage(quota: &ResourceQuota) -> Vec<QuotaUsage> {
    let Some(status) = quota.status.as_ref() else {
        return Vec::new();
    };
    let used = status.used.as_ref();

    // BTreeMap iteration keeps resources sorted by name
    status
        .hard
        .iter()
        .flatten()
        .map(|(resource, hard)| QuotaUsage {
            resource: resource.clone(),
            used: used.and_then(|u| u.get(resource)).map(|q| q.0.clone()),
            hard: hard.0.clone(),
        })
        .collect()
}

/// One entry of [`list_environments`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentSummary {
    pub namespace: String,
    pub owner: Option<String>,
}

/// All namespaces named `dev-*`, sorted by name.
pub async fn list_environments<C: ControlPlane>(cp: &C) -> Result<Vec<EnvironmentSummary>> {
    let namespaces = cp.cluster_store::<Namespace>().list(None).await?;

    let mut environments: Vec<EnvironmentSummary> = namespaces
        .iter()
        .map(|ns| (ns.name_any(), ns))
        .filter(|(name, _)| {
            name.len() > NAMESPACE_PREFIX.len() && name.starts_with(NAMESPACE_PREFIX)
        })
        .map(|(name, ns)| EnvironmentSummary {
            namespace: name,
            owner: ns.labels().get(OWNER_LABEL).cloned(),
        })
        .collect();
    environments.sort_by(|a, b| a.namespace.cmp(&b.namespace));
    Ok(environments)
}
