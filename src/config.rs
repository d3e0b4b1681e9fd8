//! Stack configuration
//!
//! Loaded from YAML; a missing file yields the defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::phy::SataGeneration;
use crate::stream::descriptors::DescriptorSet;
use crate::stream::MAX_FIELD_WIDTH;
use crate::timer::Timeout;
use crate::{Result, SataError};

/// Stack configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SataConfig {
    /// Link generation
    pub generation: SataGeneration,
    /// Data path width in bits
    pub data_width: u32,
    /// Steps without progress before a link timeout
    pub link_timeout: u64,
    /// Endpoints to wrap with a one-unit buffer
    pub buffered_endpoints: Vec<String>,
}

impl Default for SataConfig {
    fn default() -> Self {
        Self {
            generation: SataGeneration::Sata3,
            data_width: 32,
            link_timeout: 1024,
            buffered_endpoints: Vec::new(),
        }
    }
}

impl SataConfig {
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: Self =
            serde_yaml::from_str(content).map_err(|e| SataError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| SataError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.data_width == 0 || self.data_width % 8 != 0 || self.data_width > MAX_FIELD_WIDTH {
            return Err(SataError::Config(format!(
                "data_width must be a non-zero multiple of 8 up to {}, got {}",
                MAX_FIELD_WIDTH, self.data_width
            )));
        }
        if self.link_timeout == 0 {
            return Err(SataError::Config("link_timeout must be non-zero".to_string()));
        }
        Ok(())
    }

    /// Descriptor families for the configured width
    pub fn descriptors(&self) -> Result<DescriptorSet> {
        DescriptorSet::new(self.data_width)
    }

    pub fn link_timeout(&self) -> Timeout {
        Timeout::new(self.link_timeout)
    }

    /// Endpoint selection for `BufferedEndpoints::new`
    pub fn buffered(&self) -> Vec<&str> {
        self.buffered_endpoints.iter().map(String::as_str).collect()
    }
}

/// Load configuration from `path`, falling back to defaults when the file does not exist
pub fn load_config(path: impl AsRef<Path>) -> Result<SataConfig> {
    let path = path.as_ref();
    if !path.exists() {
        log::debug!("no config at {}, using defaults", path.display());
        return Ok(SataConfig::default());
    }
    let content = std::fs::read_to_string(path)?;
    let config = SataConfig::from_yaml_str(&content)?;
    log::info!(
        "loaded config from {}: {:?}, {}-bit",
        path.display(),
        config.generation,
        config.data_width
    );
    Ok(config)
}

/// Save configuration, creating parent directories
pub fn save_config(config: &SataConfig, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    config.validate()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, config.to_yaml_string()?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SataConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.generation.link_frequency_mhz(), 150.0);
        assert_eq!(config.descriptors().unwrap().dw, 32);
        assert_eq!(config.link_timeout().length(), 1024);
    }

    #[test]
    fn test_partial_yaml() {
        let config = SataConfig::from_yaml_str("generation: SATA1\nbuffered_endpoints: [sink]\n").unwrap();
        assert_eq!(config.generation, SataGeneration::Sata1);
        assert_eq!(config.data_width, 32);
        assert_eq!(config.buffered(), vec!["sink"]);
    }

    #[test]
    fn test_invalid() {
        assert!(matches!(
            SataConfig::from_yaml_str("data_width: 12\n"),
            Err(SataError::Config(_))
        ));
        assert!(SataConfig::from_yaml_str("link_timeout: 0\n").is_err());
        assert!(SataConfig::from_yaml_str("generation: SATA9\n").is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config, SataConfig::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("sata.yaml");
        let config = SataConfig {
            generation: SataGeneration::Sata2,
            data_width: 16,
            link_timeout: 64,
            buffered_endpoints: vec!["source".to_string()],
        };
        save_config(&config, &path).unwrap();
        assert_eq!(load_config(&path).unwrap(), config);
    }
}
