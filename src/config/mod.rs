//! # Restore Engine Configuration
//!
//! Process-wide settings (tool images, execution identities, naming limits)
//! gathered into one immutable value that is threaded into the engine at
//! construction. Nothing in the engine reads global configuration.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use restore_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let tools_image = &manager.config().tools_image;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure mirroring `config/restore-engine.yaml`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RestoreEngineConfig {
    /// Image used by the barrier sidecar and by exec-style post-ready tasks
    pub tools_image: String,

    /// Pull policy applied to the tools image
    pub image_pull_policy: String,

    /// Namespace the controller runs in; exec-style tasks are created here
    pub controller_namespace: Option<String>,

    /// Execution identity for prepare-data and job-style post-ready tasks
    pub worker_service_account: String,

    /// Execution identity for exec-style post-ready tasks
    pub exec_worker_service_account: String,

    /// Registry that replaces the registry host of every task image
    pub image_registry: Option<String>,

    /// Poll interval of the barrier sidecar
    pub barrier_check_interval_seconds: u32,

    /// Task retry budget when the restore request does not set one
    pub default_backoff_limit: i32,

    /// DNS suffix used to build pod host names
    pub cluster_domain: String,

    /// Maximum length of a task name accepted by the execution backend
    pub max_task_name_length: usize,
}

impl Default for RestoreEngineConfig {
    fn default() -> Self {
        Self {
            tools_image: "apecloud/kubeblocks-tools:latest".to_string(),
            image_pull_policy: "IfNotPresent".to_string(),
            controller_namespace: None,
            worker_service_account: "restore-worker".to_string(),
            exec_worker_service_account: "restore-exec-worker".to_string(),
            image_registry: None,
            barrier_check_interval_seconds: 1,
            default_backoff_limit: 3,
            cluster_domain: "cluster.local".to_string(),
            max_task_name_length: 63,
        }
    }
}

impl RestoreEngineConfig {
    /// Validate the configuration, returning the first violation found
    pub fn validate(&self) -> ConfigResult<()> {
        if self.tools_image.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "tools_image",
                "restore engine configuration",
            ));
        }
        if !matches!(
            self.image_pull_policy.as_str(),
            "Always" | "IfNotPresent" | "Never"
        ) {
            return Err(ConfigurationError::invalid_value(
                "image_pull_policy",
                self.image_pull_policy.clone(),
                "must be one of Always, IfNotPresent, Never",
            ));
        }
        // Names are cut to `[..57] + "-" + [len-5..]`, which needs room for both halves.
        if self.max_task_name_length < 16 {
            return Err(ConfigurationError::invalid_value(
                "max_task_name_length",
                self.max_task_name_length.to_string(),
                "must be at least 16",
            ));
        }
        if self.default_backoff_limit < 0 {
            return Err(ConfigurationError::invalid_value(
                "default_backoff_limit",
                self.default_backoff_limit.to_string(),
                "must not be negative",
            ));
        }
        if let Some(namespace) = &self.controller_namespace {
            if namespace.trim().is_empty() {
                return Err(ConfigurationError::invalid_value(
                    "controller_namespace",
                    namespace.clone(),
                    "must not be blank when set",
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(RestoreEngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_unknown_pull_policy() {
        let config = RestoreEngineConfig {
            image_pull_policy: "Sometimes".to_string(),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("image_pull_policy"));
    }

    #[test]
    fn test_rejects_tiny_name_limit() {
        let config = RestoreEngineConfig {
            max_task_name_length: 8,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let config: RestoreEngineConfig =
            serde_yaml::from_str("tools_image: registry.local/tools:1.0\n").unwrap();
        assert_eq!(config.tools_image, "registry.local/tools:1.0");
        assert_eq!(config.max_task_name_length, 63);
        assert_eq!(config.default_backoff_limit, 3);
    }
}
