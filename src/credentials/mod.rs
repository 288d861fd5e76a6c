//! Credential issuance and export
//!
//! A tenant gets a short-lived token for its ServiceAccount, packaged into a
//! kubeconfig that carries the cluster endpoint and CA from the operator's
//! own kubeconfig and nothing else from it.
//!
//! Token issuance is the one step of provisioning that is not idempotent:
//! every call mints a new token and earlier tokens stay valid until they
//! expire.

pub mod profile;

pub use profile::{build_profile, export, AdminEndpoint, ConnectionProfile};

use crate::control_plane::ControlPlane;
use crate::error::Result;
use crate::tenant::TenantHandle;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use tracing::info;

/// Lifetime requested for tenant tokens.
pub const TOKEN_EXPIRATION_SECONDS: i64 = 86_400;

/// A ServiceAccount token and its expiry. `Debug` never shows the token.
#[derive(Debug)]
pub struct Credential {
    pub token: SecretString,
    pub expiration_seconds: i64,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Mint a token for the tenant ServiceAccount.
///
/// Never retried: a retry after an ambiguous failure could leave an extra
/// valid token behind.
pub async fn issue<C: ControlPlane>(cp: &C, tenant: &TenantHandle) -> Result<Credential> {
    let grant = cp
        .request_token(
            tenant.namespace(),
            tenant.username(),
            TOKEN_EXPIRATION_SECONDS,
        )
        .await?;

    info!(
        namespace = %tenant.namespace(),
        service_account = %tenant.username(),
        expires_at = ?grant.expires_at,
        "Issued ServiceAccount token"
    );

    Ok(Credential {
        token: grant.token,
        expiration_seconds: TOKEN_EXPIRATION_SECONDS,
        expires_at: grant.expires_at,
    })
}
