//! Runtime settings and the world configuration blob relayed to clients.

use log::{info, warn};
use serde_json::{json, Value};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read world config: {0}")]
    Io(#[from] std::io::Error),
    #[error("world config is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Knobs the simulation reads at runtime.
#[derive(Debug, Clone, Default)]
pub struct GameSettings {
    /// Clamp reported player positions into the arena instead of trusting
    /// them verbatim.
    pub validate_moves: bool,
    /// Seed for every random roll; `None` seeds from OS entropy.
    pub seed: Option<u64>,
}

/// Opaque visual configuration. The server never interprets it beyond
/// picking out the `lighting` member on request.
#[derive(Debug, Clone, PartialEq)]
pub struct WorldConfig {
    blob: Value,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            blob: json!({
                "lighting": {
                    "ambient": { "color": "#ffffff", "intensity": 0.6 },
                    "directional": {
                        "color": "#ffffff",
                        "intensity": 0.8,
                        "position": { "x": 10.0, "y": 20.0, "z": 10.0 }
                    },
                    "background": "#87ceeb"
                },
                "grid": { "size": 30, "divisions": 30, "color": "#2e7d32" }
            }),
        }
    }
}

impl WorldConfig {
    pub fn from_value(blob: Value) -> Self {
        Self { blob }
    }

    /// Reads a config file, falling back to the built-in blob when `path`
    /// is `None` or names a file that does not exist.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(
                    "World config {} not found, using built-in defaults",
                    path.display()
                );
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        let blob = serde_json::from_str(&text)?;
        info!("Loaded world config from {}", path.display());
        Ok(Self { blob })
    }

    pub fn blob(&self) -> &Value {
        &self.blob
    }

    /// The `lighting` member, or an empty object if absent.
    pub fn lighting(&self) -> Value {
        self.blob
            .get("lighting")
            .cloned()
            .unwrap_or_else(|| json!({}))
    }
}
