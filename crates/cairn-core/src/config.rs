//! Engine configuration

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Limits applied while authorizing, building and verifying
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// How many Darc delegations to follow before treating a reference as
    /// unverified
    pub max_delegation_depth: usize,

    /// Largest accepted client transaction
    pub max_instructions: usize,

    /// Most block headers a proof may chain through to reach the head
    pub max_chain_links: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_delegation_depth: 16,
            max_instructions: 256,
            max_chain_links: 1024,
        }
    }
}

impl EngineConfig {
    /// Parse from TOML; missing keys take their defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_instructions == 0 {
            return Err(Error::Config(
                "max_instructions must be at least 1".to_string(),
            ));
        }
        if self.max_instructions > u32::MAX as usize {
            return Err(Error::Config(
                "max_instructions must fit in a u32".to_string(),
            ));
        }
        Ok(())
    }
}
