//! Configuration types for Agent Hub

use crate::cache::CacheConfig;
use crate::context::AugmenterConfig;
use crate::engine::EngineConfig;
use crate::error::{HubError, Result};
use crate::llm::GeneratorConfig;
use crate::planner::SelectorConfig;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

/// Default configuration file, relative to the working directory
pub const CONFIG_FILE: &str = "agenthub.toml";

/// Environment variable naming an extra configuration file
pub const CONFIG_PATH_ENV: &str = "AGENTHUB_CONFIG_PATH";

/// Prefix of environment overrides (`AGENTHUB_SELECTOR__MAX_TOOLS=5`)
pub const ENV_PREFIX: &str = "AGENTHUB_";

/// Main configuration for the orchestration core
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct HubConfig {
    /// Tool selection
    pub selector: SelectorConfig,

    /// Plan execution
    pub engine: EngineConfig,

    /// Result cache
    pub cache: CacheConfig,

    /// Evidence rendering
    pub augmenter: AugmenterConfig,

    /// OpenAI-compatible generator (optional; a generator can be injected)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generator: Option<GeneratorConfig>,
}

/// Builder for HubConfig
pub struct ConfigBuilder {
    config: HubConfig,
}

impl ConfigBuilder {
    /// Create a new configuration builder
    pub fn new() -> Self {
        Self {
            config: HubConfig::default(),
        }
    }

    /// Set selector configuration
    pub fn selector(mut self, config: SelectorConfig) -> Self {
        self.config.selector = config;
        self
    }

    /// Set engine configuration
    pub fn engine(mut self, config: EngineConfig) -> Self {
        self.config.engine = config;
        self
    }

    /// Set cache configuration
    pub fn cache(mut self, config: CacheConfig) -> Self {
        self.config.cache = config;
        self
    }

    /// Set augmenter configuration
    pub fn augmenter(mut self, config: AugmenterConfig) -> Self {
        self.config.augmenter = config;
        self
    }

    /// Set generator configuration
    pub fn generator(mut self, config: GeneratorConfig) -> Self {
        self.config.generator = Some(config);
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<HubConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HubConfig {
    /// Load configuration from files and environment variables.
    ///
    /// Loads in this order, later sources winning:
    /// 1. Default configuration
    /// 2. `agenthub.toml` in the working directory
    /// 3. The file named by `AGENTHUB_CONFIG_PATH`
    /// 4. `AGENTHUB_` environment variables (`__` separates nesting)
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration source is invalid or the result
    /// fails validation.
    pub fn load() -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(HubConfig::default()))
            .merge(Toml::file(CONFIG_FILE));

        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            figment = figment.merge(Toml::file(path));
        }

        Self::from_figment(figment.merge(Env::prefixed(ENV_PREFIX).ignore(&["CONFIG_PATH"]).split("__")))
    }

    /// Load configuration from a specific file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(HubError::Configuration(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        Self::from_figment(
            Figment::from(Serialized::defaults(HubConfig::default())).merge(Toml::file(path)),
        )
    }

    /// Extract and validate a configuration from any figment
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: HubConfig = figment
            .extract()
            .map_err(|e| HubError::Configuration(format!("Failed to load configuration: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        let threshold = self.selector.threshold;
        if !(0.0..1.0).contains(&threshold) {
            return Err(HubError::Configuration(format!(
                "selector.threshold must be in [0, 1), got {}",
                threshold
            )));
        }
        if self.selector.max_tools == 0 {
            return Err(HubError::Configuration(
                "selector.max_tools must be at least 1".to_string(),
            ));
        }
        if self.engine.acquire_timeout.is_zero() {
            return Err(HubError::Configuration(
                "engine.acquire_timeout must be non-zero".to_string(),
            ));
        }
        if self.cache.shards == 0 {
            return Err(HubError::Configuration(
                "cache.shards must be at least 1".to_string(),
            ));
        }
        if self.cache.max_entries == Some(0) {
            return Err(HubError::Configuration(
                "cache.max_entries must be at least 1 when set".to_string(),
            ));
        }
        if let Some(generator) = &self.generator {
            if !(0.0..=2.0).contains(&generator.temperature) {
                return Err(HubError::Configuration(format!(
                    "generator.temperature must be in [0, 2], got {}",
                    generator.temperature
                )));
            }
            if generator.base_url.is_empty() || generator.model.is_empty() {
                return Err(HubError::Configuration(
                    "generator.base_url and generator.model must be set".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn test_defaults() {
        let config = HubConfig::default();
        assert_eq!(config.selector.threshold, 0.0);
        assert_eq!(config.selector.max_tools, 3);
        assert_eq!(config.engine.acquire_timeout, Duration::from_secs(2));
        assert_eq!(config.cache.default_ttl, Duration::from_secs(300));
        assert_eq!(config.cache.max_entries, Some(1024));
        assert_eq!(config.augmenter.max_evidence_chars, 4000);
        assert!(config.generator.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_partial_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[selector]
max_tools = 5

[engine]
acquire_timeout = "500ms"

[cache]
default_ttl = "1m"
max_entries = 64

[generator]
model = "openai/gpt-4o-mini"
temperature = 0.2
"#
        )
        .unwrap();

        let config = HubConfig::from_file(file.path()).unwrap();
        assert_eq!(config.selector.max_tools, 5);
        assert_eq!(config.selector.threshold, 0.0);
        assert_eq!(config.engine.acquire_timeout, Duration::from_millis(500));
        assert_eq!(config.cache.default_ttl, Duration::from_secs(60));
        assert_eq!(config.cache.max_entries, Some(64));
        assert_eq!(config.cache.shards, 16);

        let generator = config.generator.unwrap();
        assert_eq!(generator.model, "openai/gpt-4o-mini");
        assert_eq!(generator.base_url, "https://openrouter.ai/api/v1");
        assert_eq!(generator.temperature, 0.2);
    }

    #[test]
    fn test_from_file_missing() {
        let result = HubConfig::from_file("/nonexistent/agenthub.toml");
        assert!(matches!(result, Err(HubError::Configuration(_))));
    }

    #[test]
    fn test_from_file_rejects_invalid_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[selector]\nthreshold = 1.5").unwrap();
        assert!(HubConfig::from_file(file.path()).is_err());
    }

    #[test]
    fn test_from_figment_layering() {
        let figment = Figment::from(Serialized::defaults(HubConfig::default()))
            .merge(Toml::string("[selector]\nmax_tools = 2\nthreshold = 0.1"))
            .merge(Toml::string("[selector]\nmax_tools = 4"));

        let config = HubConfig::from_figment(figment).unwrap();
        assert_eq!(config.selector.max_tools, 4);
        assert!((config.selector.threshold - 0.1).abs() < f32::EPSILON);
    }

    #[test]
    fn test_env_overrides() {
        unsafe {
            std::env::set_var("AGENTHUB_SELECTOR__MAX_TOOLS", "7");
            std::env::set_var("AGENTHUB_CACHE__SWEEP_INTERVAL", "90s");
        }

        let config = HubConfig::load().unwrap();
        assert_eq!(config.selector.max_tools, 7);
        assert_eq!(config.cache.sweep_interval, Duration::from_secs(90));

        unsafe {
            std::env::remove_var("AGENTHUB_SELECTOR__MAX_TOOLS");
            std::env::remove_var("AGENTHUB_CACHE__SWEEP_INTERVAL");
        }
    }

    #[test]
    fn test_validation() {
        let mut config = HubConfig::default();
        config.selector.max_tools = 0;
        assert!(config.validate().is_err());

        let mut config = HubConfig::default();
        config.engine.acquire_timeout = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = HubConfig::default();
        config.cache.shards = 0;
        assert!(config.validate().is_err());

        let mut config = HubConfig::default();
        config.generator = Some(GeneratorConfig {
            temperature: 3.0,
            ..Default::default()
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_builder() {
        let config = ConfigBuilder::new()
            .selector(SelectorConfig {
                threshold: 0.2,
                max_tools: 1,
            })
            .generator(GeneratorConfig::default())
            .build()
            .unwrap();
        assert_eq!(config.selector.max_tools, 1);
        assert!(config.generator.is_some());

        let invalid = ConfigBuilder::new()
            .selector(SelectorConfig {
                threshold: -1.0,
                max_tools: 1,
            })
            .build();
        assert!(invalid.is_err());
    }
}
