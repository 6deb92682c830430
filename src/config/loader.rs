//! Configuration Loader
//!
//! Environment-aware configuration loading. Reads `restore-engine.yaml`,
//! deep-merges the section named after the current environment over the base
//! keys, then layers `RESTORE_ENGINE__*` environment variables on top.

use super::error::{ConfigResult, ConfigurationError};
use super::RestoreEngineConfig;
use config::{Config, Environment, File, FileFormat};
use serde_yaml::Value as YamlValue;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const KNOWN_ENVIRONMENTS: [&str; 3] = ["development", "test", "production"];
const CONFIG_FILE_NAMES: [&str; 2] = ["restore-engine.yaml", "restore-engine.yml"];

/// Loaded, validated configuration plus where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: RestoreEngineConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(|| PathBuf::from("config"));

        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_directory.display()
        );

        let config_file = Self::find_config_file(&config_directory)?;
        let yaml_content = std::fs::read_to_string(&config_file)
            .map_err(|e| ConfigurationError::file_read_error(config_file.display().to_string(), e))?;

        let config = Self::parse_with_environment(
            &yaml_content,
            environment,
            &config_file.display().to_string(),
        )?;

        info!(
            environment = environment,
            config_file = %config_file.display(),
            settings = %Self::sanitize_config_for_logging(&config),
            "Restore engine configuration loaded"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Wrap an already-built configuration (tests, embedding callers)
    pub fn from_config(config: RestoreEngineConfig, environment: &str) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            environment: environment.to_string(),
            config_directory: PathBuf::from("config"),
        })
    }

    /// Parse YAML content, apply the environment section and env-var overrides, validate
    pub fn parse_with_environment(
        yaml_content: &str,
        environment: &str,
        source_name: &str,
    ) -> ConfigResult<RestoreEngineConfig> {
        let mut yaml_data: YamlValue = serde_yaml::from_str(yaml_content)
            .map_err(|e| ConfigurationError::invalid_yaml(source_name, e))?;

        let overrides = yaml_data
            .get(YamlValue::String(environment.to_string()))
            .cloned();

        if let YamlValue::Mapping(map) = &mut yaml_data {
            for name in KNOWN_ENVIRONMENTS {
                map.remove(YamlValue::String(name.to_string()));
            }
            map.remove(YamlValue::String(environment.to_string()));
        }

        if let Some(overrides) = overrides {
            debug!(environment = environment, "Applying environment overrides");
            Self::deep_merge(&mut yaml_data, overrides);
        }

        let merged = serde_yaml::to_string(&yaml_data).map_err(|e| ConfigurationError::ConfigMergeError {
            error: e.to_string(),
        })?;

        let settings = Config::builder()
            .add_source(File::from_str(&merged, FileFormat::Yaml))
            .add_source(
                Environment::with_prefix("RESTORE_ENGINE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: RestoreEngineConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &RestoreEngineConfig {
        &self.config
    }

    /// Get the current environment
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Get the configuration directory
    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Sanitized JSON view of the configuration for debugging output
    pub fn debug_config(&self) -> serde_json::Value {
        Self::sanitize_config_for_logging(&self.config)
    }

    fn detect_environment() -> String {
        env::var("RESTORE_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    fn find_config_file(config_directory: &Path) -> ConfigResult<PathBuf> {
        let mut searched_paths = Vec::new();
        for name in CONFIG_FILE_NAMES {
            let config_path = config_directory.join(name);
            searched_paths.push(config_path.clone());
            if config_path.is_file() {
                debug!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }
        Err(ConfigurationError::config_file_not_found(searched_paths))
    }

    fn deep_merge(base: &mut YamlValue, overlay: YamlValue) {
        match (base, overlay) {
            (YamlValue::Mapping(base_map), YamlValue::Mapping(overlay_map)) => {
                for (key, value) in overlay_map {
                    match base_map.get_mut(&key) {
                        Some(existing) => Self::deep_merge(existing, value),
                        None => {
                            base_map.insert(key, value);
                        }
                    }
                }
            }
            (base, overlay) => *base = overlay,
        }
    }

    fn sanitize_config_for_logging(config: &RestoreEngineConfig) -> serde_json::Value {
        let mut config_json = serde_json::json!(config);
        Self::sanitize_json_recursive(&mut config_json, &["password", "secret", "token", "credential"]);
        config_json
    }

    fn sanitize_json_recursive(value: &mut serde_json::Value, sensitive_patterns: &[&str]) {
        match value {
            serde_json::Value::Object(map) => {
                for (key, val) in map.iter_mut() {
                    let key_lower = key.to_lowercase();
                    if sensitive_patterns.iter().any(|p| key_lower.contains(p)) {
                        *val = serde_json::Value::String("[MASKED]".to_string());
                    } else {
                        Self::sanitize_json_recursive(val, sensitive_patterns);
                    }
                }
            }
            serde_json::Value::Array(arr) => {
                for item in arr.iter_mut() {
                    Self::sanitize_json_recursive(item, sensitive_patterns);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
tools_image: apecloud/kubeblocks-tools:0.9.0
worker_service_account: restore-worker
controller_namespace: kb-system
test:
  tools_image: apecloud/kubeblocks-tools:test
  barrier_check_interval_seconds: 5
production:
  image_registry: registry.internal
"#;

    #[test]
    fn test_environment_section_overrides_base_keys() {
        let config = ConfigManager::parse_with_environment(SAMPLE, "test", "inline").unwrap();
        assert_eq!(config.tools_image, "apecloud/kubeblocks-tools:test");
        assert_eq!(config.barrier_check_interval_seconds, 5);
        assert_eq!(config.controller_namespace.as_deref(), Some("kb-system"));
        assert_eq!(config.image_registry, None);
    }

    #[test]
    fn test_production_section_is_isolated() {
        let config = ConfigManager::parse_with_environment(SAMPLE, "production", "inline").unwrap();
        assert_eq!(config.tools_image, "apecloud/kubeblocks-tools:0.9.0");
        assert_eq!(config.image_registry.as_deref(), Some("registry.internal"));
    }

    #[test]
    fn test_invalid_yaml_is_reported() {
        let err = ConfigManager::parse_with_environment("tools_image: [", "test", "inline").unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidYaml { .. }));
    }

    #[test]
    fn test_load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("restore-engine.yaml")).unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let manager =
            ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test")
                .unwrap();
        assert_eq!(manager.environment(), "test");
        assert_eq!(manager.config().barrier_check_interval_seconds, 5);
    }

    #[test]
    fn test_shipped_config_loads_for_every_environment() {
        let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config");
        for environment in ["development", "test", "production"] {
            let manager = ConfigManager::load_from_directory_with_env(Some(dir.clone()), environment).unwrap();
            assert_eq!(manager.config().controller_namespace.as_deref(), Some("kb-system"));
        }
    }

    #[test]
    fn test_missing_file_lists_searched_paths() {
        let dir = tempfile::tempdir().unwrap();
        let err = ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test")
            .unwrap_err();
        match err {
            ConfigurationError::ConfigFileNotFound { searched_paths } => {
                assert_eq!(searched_paths.len(), 2)
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
