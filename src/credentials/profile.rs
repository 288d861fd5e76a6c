//! Tenant kubeconfig construction and export.

use super::Credential;
use crate::error::{ProvisionError, Result};
use crate::tenant::TenantHandle;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use kube::config::Kubeconfig;
use secrecy::{ExposeSecret, SecretString};
use serde::{Serialize, Serializer};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// The parts of the operator's cluster entry a tenant may see.
///
/// Built from the cluster section only; `users` entries of the operator
/// kubeconfig are never read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminEndpoint {
    pub cluster_name: String,
    pub server: String,
    pub certificate_authority_data: Option<String>,
    pub insecure_skip_tls_verify: bool,
}

impl AdminEndpoint {
    /// Resolve the cluster behind `context`, or behind `current-context`
    /// when no override is given.
    pub fn from_kubeconfig(kubeconfig: &Kubeconfig, context: Option<&str>) -> Result<Self> {
        let context_name = context
            .map(str::to_string)
            .or_else(|| kubeconfig.current_context.clone())
            .ok_or_else(|| {
                ProvisionError::Configuration(
                    "kubeconfig has no current-context and none was given".to_string(),
                )
            })?;

        let cluster_name = kubeconfig
            .contexts
            .iter()
            .find(|c| c.name == context_name)
            .and_then(|c| c.context.as_ref())
            .map(|c| c.cluster.clone())
            .ok_or_else(|| {
                ProvisionError::Configuration(format!(
                    "context {} not found in kubeconfig",
                    context_name
                ))
            })?;

        let cluster = kubeconfig
            .clusters
            .iter()
            .find(|c| c.name == cluster_name)
            .and_then(|c| c.cluster.as_ref())
            .ok_or_else(|| {
                ProvisionError::Configuration(format!(
                    "cluster {} not found in kubeconfig",
                    cluster_name
                ))
            })?;

        let server = cluster.server.clone().ok_or_else(|| {
            ProvisionError::Configuration(format!("cluster {} has no server", cluster_name))
        })?;

        let certificate_authority_data = match (
            &cluster.certificate_authority_data,
            &cluster.certificate_authority,
        ) {
            (Some(data), _) => Some(data.clone()),
            (None, Some(path)) => Some(inline_file(Path::new(path))?),
            (None, None) => None,
        };

        Ok(Self {
            cluster_name,
            server,
            certificate_authority_data,
            insecure_skip_tls_verify: cluster.insecure_skip_tls_verify.unwrap_or(false),
        })
    }
}

fn inline_file(path: &Path) -> Result<String> {
    debug!(path = %path.display(), "Inlining certificate authority file");
    let contents = fs::read(path)
        .map_err(|e| ProvisionError::Io(format!("{}: {}", path.display(), e)))?;
    Ok(STANDARD.encode(contents))
}

/// A kubeconfig holding one cluster, one user and one context.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionProfile {
    pub api_version: String,
    pub kind: String,
    pub clusters: Vec<ProfileClusterEntry>,
    pub users: Vec<ProfileUserEntry>,
    pub contexts: Vec<ProfileContextEntry>,
    #[serde(rename = "current-context")]
    pub current_context: String,
}

#[derive(Debug, Serialize)]
pub struct ProfileClusterEntry {
    pub name: String,
    pub cluster: ProfileCluster,
}

#[derive(Debug, Serialize)]
pub struct ProfileCluster {
    pub server: String,
    #[serde(
        rename = "certificate-authority-data",
        skip_serializing_if = "Option::is_none"
    )]
    pub certificate_authority_data: Option<String>,
    #[serde(
        rename = "insecure-skip-tls-verify",
        skip_serializing_if = "std::ops::Not::not"
    )]
    pub insecure_skip_tls_verify: bool,
}

#[derive(Debug, Serialize)]
pub struct ProfileUserEntry {
    pub name: String,
    pub user: ProfileUser,
}

#[derive(Debug, Serialize)]
pub struct ProfileUser {
    #[serde(serialize_with = "expose_token")]
    pub token: SecretString,
}

#[derive(Debug, Serialize)]
pub struct ProfileContextEntry {
    pub name: String,
    pub context: ProfileContext,
}

#[derive(Debug, Serialize)]
pub struct ProfileContext {
    pub cluster: String,
    pub user: String,
    pub namespace: String,
}

// The written kubeconfig is the only place the token is ever exposed
fn expose_token<S: Serializer>(
    token: &SecretString,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(token.expose_secret())
}

/// Assemble the tenant kubeconfig: the admin endpoint, the tenant user
/// holding only its token, and a context defaulting to the tenant namespace.
pub fn build_profile(
    endpoint: &AdminEndpoint,
    tenant: &TenantHandle,
    credential: &Credential,
) -> ConnectionProfile {
    ConnectionProfile {
        api_version: "v1".to_string(),
        kind: "Config".to_string(),
        clusters: vec![ProfileClusterEntry {
            name: endpoint.cluster_name.clone(),
            cluster: ProfileCluster {
                server: endpoint.server.clone(),
                certificate_authority_data: endpoint.certificate_authority_data.clone(),
                insecure_skip_tls_verify: endpoint.insecure_skip_tls_verify,
            },
        }],
        users: vec![ProfileUserEntry {
            name: tenant.username().to_string(),
            user: ProfileUser {
                token: SecretString::from(credential.token.expose_secret().to_string()),
            },
        }],
        contexts: vec![ProfileContextEntry {
            name: tenant.namespace().to_string(),
            context: ProfileContext {
                cluster: endpoint.cluster_name.clone(),
                user: tenant.username().to_string(),
                namespace: tenant.namespace().to_string(),
            },
        }],
        current_context: tenant.namespace().to_string(),
    }
}

/// Write the profile to `<dir>/<username>.kubeconfig`, replacing any
/// existing file. The file is readable by its owner only.
pub fn export(profile: &ConnectionProfile, dir: &Path, tenant: &TenantHandle) -> Result<PathBuf> {
    let path = dir.join(format!("{}.kubeconfig", tenant.username()));
    let yaml = serde_yaml::to_string(profile)?;

    write_private(&path, yaml.as_bytes())
        .map_err(|e| ProvisionError::Io(format!("{}: {}", path.display(), e)))?;

    info!(path = %path.display(), "Wrote tenant kubeconfig");
    Ok(path)
}

#[cfg(unix)]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // mode() only applies on creation
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    file.write_all(contents)
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(contents)
}
