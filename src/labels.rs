//! Names and labels shared by every tenant environment.

use std::collections::BTreeMap;

// Namespace ownership labels
pub const OWNER_LABEL: &str = "podcraft.dev/owner";
pub const MANAGED_LABEL: &str = "podcraft.dev/managed";
pub const MANAGED_VALUE: &str = "true";

// Namespaces carrying this label are reachable from every tenant
pub const SHARED_SERVICES_LABEL: &str = "podcraft.dev/shared";
pub const SHARED_SERVICES_VALUE: &str = "true";

pub const NAMESPACE_PREFIX: &str = "dev-";

// Object names inside a tenant namespace
pub const QUOTA_NAME: &str = "dev-quota";
pub const LIMIT_RANGE_NAME: &str = "dev-limitrange";
pub const DEFAULT_DENY_POLICY: &str = "default-deny";
pub const ALLOW_SAME_NAMESPACE_POLICY: &str = "allow-same-namespace";
pub const ALLOW_SHARED_SERVICES_POLICY: &str = "allow-shared-services";

pub fn role_name(username: &str) -> String {
    format!("{}-role", username)
}

pub fn role_binding_name(username: &str) -> String {
    format!("{}-binding", username)
}

/// Labels stamped on a tenant namespace.
pub fn namespace_labels(username: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(OWNER_LABEL.to_string(), username.to_string());
    labels.insert(MANAGED_LABEL.to_string(), MANAGED_VALUE.to_string());
    labels
}

pub fn shared_services_selector() -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(
        SHARED_SERVICES_LABEL.to_string(),
        SHARED_SERVICES_VALUE.to_string(),
    );
    labels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_names() {
        assert_eq!(role_name("alice"), "alice-role");
        assert_eq!(role_binding_name("alice"), "alice-binding");
    }

    #[test]
    fn test_namespace_labels() {
        let labels = namespace_labels("alice");
        assert_eq!(labels.get(OWNER_LABEL).map(String::as_str), Some("alice"));
        assert_eq!(labels.get(MANAGED_LABEL).map(String::as_str), Some("true"));
        assert_eq!(labels.len(), 2);
    }
}
