use std::fs;
use std::path::Path;

use serde::Deserialize;

use sieve_compiler::TokenPolicy;
use sieve_core::EngineConfig;

/// `--config` file contents. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub tokens: TokenPolicy,
    pub engine: EngineConfig,
}

impl CliConfig {
    pub fn load(path: Option<&Path>) -> Result<Self, String> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config '{}': {}", path.display(), e))?;
        serde_json::from_str(&text).map_err(|e| format!("Invalid config '{}': {}", path.display(), e))
    }
}
