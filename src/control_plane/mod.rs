//! Access to the Kubernetes API server.
//!
//! Everything above this module talks to the cluster through two seams:
//! [`ResourceStore`], the get/create/replace/delete/list surface for one kind
//! in one scope, and [`ControlPlane`], which hands out stores and mints
//! ServiceAccount tokens. The production implementation wraps `kube::Api`;
//! tests run against an in-memory store that enforces `resourceVersion`.

mod api_server;
#[cfg(test)]
pub(crate) mod memory;

pub use api_server::KubeControlPlane;

use crate::error::Result;
use chrono::{DateTime, Utc};
use k8s_openapi::{ClusterResourceScope, NamespaceResourceScope};
use kube::Resource;
use secrecy::SecretString;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

/// Bounds shared by every object type read from or written to the API server.
pub trait ApiObject:
    Resource<DynamicType = ()>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<K> ApiObject for K where
    K: Resource<DynamicType = ()>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// Result of a delete call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    AlreadyAbsent,
}

/// CRUD surface for one resource kind within one scope.
///
/// `get` maps "not found" to `Ok(None)` so callers can tell it apart from
/// every other read failure. `replace` must carry the observed
/// `resourceVersion`; a stale version fails with `ProvisionError::Conflict`.
#[async_trait::async_trait]
pub trait ResourceStore<K: ApiObject>: Send + Sync {
    async fn get(&self, name: &str) -> Result<Option<K>>;

    async fn create(&self, object: &K) -> Result<K>;

    async fn replace(&self, object: &K) -> Result<K>;

    async fn delete(&self, name: &str) -> Result<DeleteOutcome>;

    /// List objects, optionally filtered by a `key=value[,key=value]` selector.
    async fn list(&self, label_selector: Option<&str>) -> Result<Vec<K>>;
}

/// A token minted for a ServiceAccount.
pub struct TokenGrant {
    pub token: SecretString,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Handle to the cluster.
#[async_trait::async_trait]
pub trait ControlPlane: Send + Sync {
    /// Store for a cluster-scoped kind such as `Namespace`.
    fn cluster_store<K>(&self) -> Box<dyn ResourceStore<K>>
    where
        K: ApiObject + Resource<Scope = ClusterResourceScope>;

    /// Store for a namespaced kind inside `namespace`.
    fn namespaced_store<K>(&self, namespace: &str) -> Box<dyn ResourceStore<K>>
    where
        K: ApiObject + Resource<Scope = NamespaceResourceScope>;

    /// Mint a new token for `service_account`. Not idempotent: every call
    /// yields another valid token.
    async fn request_token(
        &self,
        namespace: &str,
        service_account: &str,
        expiration_seconds: i64,
    ) -> Result<TokenGrant>;
}
