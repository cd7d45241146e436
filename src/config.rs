//! Censor rule configuration

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::tokenizer::TokenDefinition;

/// One named censor expression.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CensorRule {
    pub name: String,
    pub pattern: String,
}

/// Rule file contents. Accepted as JSON or YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CensorConfig {
    pub rules: Vec<CensorRule>,
    #[serde(default = "default_draw_boxes")]
    pub draw_boxes: bool,
}

fn default_draw_boxes() -> bool {
    true
}

impl CensorConfig {
    /// Load and validate a rule file, trying JSON first, then YAML.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let config: CensorConfig = match serde_json::from_str(&raw) {
            Ok(config) => config,
            Err(_) => serde_yaml::from_str(&raw)
                .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.rules.is_empty() {
            return Err(Error::Config("rule file contains no rules".into()));
        }
        for rule in &self.rules {
            TokenDefinition::new(&rule.name, &rule.pattern)?;
        }
        Ok(())
    }

    /// The rules as tokenizer definitions, in file order. Order matters:
    /// earlier rules win when several match at the same position.
    pub fn token_definitions(&self) -> Result<Vec<TokenDefinition>> {
        self.rules
            .iter()
            .map(|rule| TokenDefinition::new(&rule.name, &rule.pattern))
            .collect()
    }
}
