//! Governance configuration threaded into the governance manager.

use crate::error::{ProvisionError, Result};
use crate::quantity;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

pub const DEFAULT_CPU_LIMIT: &str = "2";
pub const DEFAULT_MEMORY_LIMIT: &str = "2Gi";
pub const DEFAULT_MAX_PODS: u32 = 10;

/// Platform-wide storage ceiling per tenant; not overridable.
pub const STORAGE_LIMIT: &str = "5Gi";

/// Aggregate resource ceilings for one tenant namespace.
///
/// Built with [`GovernanceLimits::new`], which validates every quantity so
/// that malformed input is rejected before anything is written.
#[derive(Debug, Clone, PartialEq)]
pub struct GovernanceLimits {
    cpu_limit: Quantity,
    memory_limit: Quantity,
    max_pods: u32,
    storage_limit: Quantity,
}

impl GovernanceLimits {
    pub fn new(cpu_limit: &str, memory_limit: &str, max_pods: u32) -> Result<Self> {
        if max_pods == 0 {
            return Err(ProvisionError::Validation(
                "max-pods must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            cpu_limit: quantity::parse_limit("cpu", cpu_limit)?,
            memory_limit: quantity::parse_limit("memory", memory_limit)?,
            max_pods,
            storage_limit: Quantity(STORAGE_LIMIT.to_string()),
        })
    }

    pub fn cpu_limit(&self) -> &Quantity {
        &self.cpu_limit
    }

    pub fn memory_limit(&self) -> &Quantity {
        &self.memory_limit
    }

    pub fn max_pods(&self) -> u32 {
        self.max_pods
    }

    pub fn storage_limit(&self) -> &Quantity {
        &self.storage_limit
    }
}

impl Default for GovernanceLimits {
    fn default() -> Self {
        Self {
            cpu_limit: Quantity(DEFAULT_CPU_LIMIT.to_string()),
            memory_limit: Quantity(DEFAULT_MEMORY_LIMIT.to_string()),
            max_pods: DEFAULT_MAX_PODS,
            storage_limit: Quantity(STORAGE_LIMIT.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let limits = GovernanceLimits::default();
        assert_eq!(limits.cpu_limit().0, "2");
        assert_eq!(limits.memory_limit().0, "2Gi");
        assert_eq!(limits.max_pods(), 10);
        assert_eq!(limits.storage_limit().0, "5Gi");
        assert_eq!(
            GovernanceLimits::new(DEFAULT_CPU_LIMIT, DEFAULT_MEMORY_LIMIT, DEFAULT_MAX_PODS)
                .unwrap(),
            limits
        );
    }

    #[test]
    fn test_overrides_keep_storage_fixed() {
        let limits = GovernanceLimits::new("4", "4Gi", 20).unwrap();
        assert_eq!(limits.cpu_limit().0, "4");
        assert_eq!(limits.memory_limit().0, "4Gi");
        assert_eq!(limits.max_pods(), 20);
        assert_eq!(limits.storage_limit().0, "5Gi");
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(matches!(
            GovernanceLimits::new("lots", "2Gi", 10),
            Err(ProvisionError::Validation(_))
        ));
        assert!(matches!(
            GovernanceLimits::new("2", "2GB", 10),
            Err(ProvisionError::Validation(_))
        ));
        assert!(matches!(
            GovernanceLimits::new("2", "2Gi", 0),
            Err(ProvisionError::Validation(_))
        ));
        assert!(matches!(
            GovernanceLimits::new("1e2147483647", "2Gi", 10),
            Err(ProvisionError::Validation(_))
        ));
    }
}
