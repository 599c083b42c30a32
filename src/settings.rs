//! Server settings, stored as TOML under the user config directory.

use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{BridgeError, Result};

const SETTINGS_FILE: &str = "deckbridge.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Address the WebSocket listener binds.
    pub listen_addr: String,
    pub listen_port: u16,
    /// Override for the mappings directory; the platform config
    /// directory is used when unset.
    pub mappings_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0".to_string(),
            listen_port: 8891,
            mappings_dir: None,
        }
    }
}

impl Settings {
    /// Path of the settings file: `<config_dir>/deckbridge/deckbridge.toml`.
    pub fn path() -> Result<PathBuf> {
        let base = dirs::config_dir().ok_or_else(|| {
            BridgeError::Other("could not determine config directory".to_string())
        })?;
        Ok(base.join("deckbridge").join(SETTINGS_FILE))
    }

    /// Load settings, falling back to defaults when the file is absent.
    /// A present-but-unparseable file is an error, not silently ignored.
    pub fn load() -> Result<Self> {
        let path = Self::path()?;
        if !path.exists() {
            debug!(path = %path.display(), "no settings file, using defaults");
            return Ok(Self::default());
        }
        let text = fs::read_to_string(&path)?;
        toml::from_str(&text)
            .map_err(|e| BridgeError::ConfigParse(format!("{}: {e}", path.display())))
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::path()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(self)
            .map_err(|e| BridgeError::Other(format!("failed to encode settings: {e}")))?;
        fs::write(&path, text)?;
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.listen_addr, self.listen_port)
            .parse()
            .map_err(|e| {
                BridgeError::Validation(format!(
                    "invalid listen address '{}:{}': {e}",
                    self.listen_addr, self.listen_port
                ))
            })
    }

    /// Mappings directory, honoring the override.
    pub fn mappings_dir(&self) -> Result<PathBuf> {
        match &self.mappings_dir {
            Some(dir) => Ok(dir.clone()),
            None => crate::mapping::default_mappings_dir(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.listen_port, 8891);
        assert!(settings.socket_addr().is_ok());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let settings: Settings = toml::from_str("listen_port = 9000").unwrap();
        assert_eq!(settings.listen_port, 9000);
        assert_eq!(settings.listen_addr, "0.0.0.0");
    }

    #[test]
    fn test_round_trip() {
        let settings = Settings {
            listen_addr: "127.0.0.1".to_string(),
            listen_port: 4321,
            mappings_dir: Some(PathBuf::from("/tmp/maps")),
        };
        let text = toml::to_string_pretty(&settings).unwrap();
        let parsed: Settings = toml::from_str(&text).unwrap();
        assert_eq!(parsed.listen_port, 4321);
        assert_eq!(parsed.mappings_dir, Some(PathBuf::from("/tmp/maps")));
    }
}
