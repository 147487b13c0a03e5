//! Kernel configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the Kernel.
///
/// Every field has a default, so a partial document deserializes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Anchor every locally created TEL event in the issuer's KEL with an
    /// interaction seal.
    pub anchor_tel_events: bool,
    /// Check signatures when a signed event is applied.
    pub verify_signatures: bool,
    /// Largest number of events accepted by one import.
    pub max_import_events: usize,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            anchor_tel_events: true,
            verify_signatures: true,
            max_import_events: 10_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: KernelConfig = serde_json::from_str(r#"{"verify_signatures": false}"#).unwrap();
        assert!(!config.verify_signatures);
        assert!(config.anchor_tel_events);
        assert_eq!(config.max_import_events, 10_000);
    }

    #[test]
    fn test_empty_config_is_default() {
        let config: KernelConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, KernelConfig::default());
    }
}
