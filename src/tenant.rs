//! Tenant identity: a developer username and the namespace derived from it.

use crate::error::{ProvisionError, Result};
use crate::labels::NAMESPACE_PREFIX;
use std::fmt;

/// Longest valid DNS-1123 label, which bounds namespace names.
const MAX_NAMESPACE_LEN: usize = 63;

/// A developer and their isolated namespace.
///
/// The namespace is always `dev-<username>`; construction rejects usernames
/// that would not yield a valid namespace name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantHandle {
    username: String,
    namespace: String,
}

impl TenantHandle {
    pub fn new(username: &str) -> Result<Self> {
        validate_username(username)?;
        Ok(Self {
            username: username.to_string(),
            namespace: format!("{}{}", NAMESPACE_PREFIX, username),
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

impl fmt::Display for TenantHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.username, self.namespace)
    }
}

fn validate_username(username: &str) -> Result<()> {
    if username.is_empty() {
        return Err(ProvisionError::Validation(
            "username must not be empty".to_string(),
        ));
    }

    let max_len = MAX_NAMESPACE_LEN - NAMESPACE_PREFIX.len();
    if username.len() > max_len {
        return Err(ProvisionError::Validation(format!(
            "username {} is longer than {} characters",
            username, max_len
        )));
    }

    let valid_chars = username
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-');
    let bytes = username.as_bytes();
    let valid_edges =
        bytes[0].is_ascii_alphanumeric() && bytes[bytes.len() - 1].is_ascii_alphanumeric();

    if !valid_chars || !valid_edges {
        return Err(ProvisionError::Validation(format!(
            "username {} must consist of lowercase letters, digits and '-', \
             and start and end with a letter or digit",
            username
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_derivation() {
        let tenant = TenantHandle::new("alice").unwrap();
        assert_eq!(tenant.username(), "alice");
        assert_eq!(tenant.namespace(), "dev-alice");
    }

    #[test]
    fn test_rejects_invalid_usernames() {
        for bad in ["", "Alice", "alice_smith", "-alice", "alice-", "al.ice", "alïce"] {
            let err = TenantHandle::new(bad).unwrap_err();
            assert!(
                matches!(err, ProvisionError::Validation(_)),
                "expected validation error for {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_length_limit() {
        let longest = "a".repeat(59);
        assert_eq!(TenantHandle::new(&longest).unwrap().namespace().len(), 63);
        assert!(TenantHandle::new(&"a".repeat(60)).is_err());
    }

    #[test]
    fn test_accepts_digits_and_dashes() {
        assert!(TenantHandle::new("bob-2").is_ok());
        assert!(TenantHandle::new("7").is_ok());
    }
}
