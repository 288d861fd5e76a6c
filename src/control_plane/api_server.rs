//! `kube::Api`-backed control plane.

use super::{ApiObject, ControlPlane, DeleteOutcome, ResourceStore, TokenGrant};
use crate::error::{ProvisionError, Result};
use k8s_openapi::api::authentication::v1::{TokenRequest, TokenRequestSpec};
use k8s_openapi::api::core::v1::ServiceAccount;
use k8s_openapi::{ClusterResourceScope, NamespaceResourceScope};
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Resource, ResourceExt};
use secrecy::SecretString;
use std::time::Duration;
use tracing::debug;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Control plane backed by a live API server connection.
#[derive(Clone)]
pub struct KubeControlPlane {
    client: Client,
}

impl KubeControlPlane {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect using an operator kubeconfig and an optional context override.
    pub async fn from_kubeconfig(kubeconfig: Kubeconfig, context: Option<&str>) -> Result<Self> {
        let options = KubeConfigOptions {
            context: context.map(str::to_string),
            ..Default::default()
        };

        let mut config = kube::Config::from_custom_kubeconfig(kubeconfig, &options)
            .await
            .map_err(|e| ProvisionError::Configuration(format!("kubeconfig: {}", e)))?;
        config.connect_timeout = Some(CONNECT_TIMEOUT);
        config.read_timeout = Some(READ_TIMEOUT);

        debug!(server = %config.cluster_url, "Connecting to API server");
        let client = Client::try_from(config)
            .map_err(|e| ProvisionError::Configuration(format!("client: {}", e)))?;
        Ok(Self::new(client))
    }
}

#[async_trait::async_trait]
impl ControlPlane for KubeControlPlane {
    fn cluster_store<K>(&self) -> Box<dyn ResourceStore<K>>
    where
        K: ApiObject + Resource<Scope = ClusterResourceScope>,
    {
        Box::new(ApiStore::new(Api::<K>::all(self.client.clone())))
    }

    fn namespaced_store<K>(&self, namespace: &str) -> Box<dyn ResourceStore<K>>
    where
        K: ApiObject + Resource<Scope = NamespaceResourceScope>,
    {
        Box::new(ApiStore::new(Api::<K>::namespaced(
            self.client.clone(),
            namespace,
        )))
    }

    async fn request_token(
        &self,
        namespace: &str,
        service_account: &str,
        expiration_seconds: i64,
    ) -> Result<TokenGrant> {
        let accounts: Api<ServiceAccount> = Api::namespaced(self.client.clone(), namespace);
        let request = TokenRequest {
            spec: TokenRequestSpec {
                expiration_seconds: Some(expiration_seconds),
                ..Default::default()
            },
            ..Default::default()
        };

        let response = accounts
            .create_token_request(service_account, &PostParams::default(), &request)
            .await
            .map_err(|e| ProvisionError::from_kube(e, "ServiceAccount", service_account))?;

        let status = response.status.ok_or_else(|| ProvisionError::Rejected {
            kind: "TokenRequest".to_string(),
            name: service_account.to_string(),
            message: "API server returned no token".to_string(),
        })?;

        Ok(TokenGrant {
            token: SecretString::from(status.token),
            expires_at: Some(status.expiration_timestamp.0),
        })
    }
}

struct ApiStore<K> {
    api: Api<K>,
    kind: String,
}

impl<K: ApiObject> ApiStore<K> {
    fn new(api: Api<K>) -> Self {
        Self {
            api,
            kind: K::kind(&()).to_string(),
        }
    }

    fn error(&self, err: kube::Error, name: &str) -> ProvisionError {
        ProvisionError::from_kube(err, &self.kind, name)
    }
}

#[async_trait::async_trait]
impl<K: ApiObject> ResourceStore<K> for ApiStore<K> {
    async fn get(&self, name: &str) -> Result<Option<K>> {
        self.api
            .get_opt(name)
            .await
            .map_err(|e| self.error(e, name))
    }

    async fn create(&self, object: &K) -> Result<K> {
        let name = object.name_any();
        self.api
            .create(&PostParams::default(), object)
            .await
            .map_err(|e| self.error(e, &name))
    }

    async fn replace(&self, object: &K) -> Result<K> {
        let name = object.name_any();
        self.api
            .replace(&name, &PostParams::default(), object)
            .await
            .map_err(|e| self.error(e, &name))
    }

    async fn delete(&self, name: &str) -> Result<DeleteOutcome> {
        match self.api.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(DeleteOutcome::Deleted),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(DeleteOutcome::AlreadyAbsent),
            Err(e) => Err(self.error(e, name)),
        }
    }

    async fn list(&self, label_selector: Option<&str>) -> Result<Vec<K>> {
        let mut params = ListParams::default();
        if let Some(selector) = label_selector {
            params = params.labels(selector);
        }
        let list = self
            .api
            .list(&params)
            .await
            .map_err(|e| self.error(e, "*"))?;
        Ok(list.items)
    }
}
