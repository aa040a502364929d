use crate::api::TransactionType;
use crate::error::Result;
use directories::ProjectDirs;
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration loaded from JSON file
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct FileConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_type: Option<TransactionType>,
}

impl FileConfig {
    /// Load config from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed
    pub fn load_from_path(path: &Path) -> Result<Self> {
        debug!("Loading config from: {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        let config: FileConfig = serde_json::from_str(&contents)?;
        Ok(config)
    }

    /// Load config with fallback priority:
    /// 1. Explicit path (if provided)
    /// 2. Working directory (./receipts.json or ./.receipts/config.json)
    /// 3. User config directory (~/.config/receipts/config.json)
    ///
    /// # Errors
    ///
    /// Returns an error only if an explicit path is provided but cannot be read
    pub fn load_with_fallback(explicit_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit_path {
            return Self::load_from_path(path);
        }

        let mut candidates = vec![
            PathBuf::from("./receipts.json"),
            PathBuf::from("./.receipts/config.json"),
        ];
        if let Some(proj_dirs) = ProjectDirs::from("", "", "receipts") {
            candidates.push(proj_dirs.config_dir().join("config.json"));
        }

        Ok(Self::load_first(&candidates))
    }

    /// Returns the first candidate that exists and parses, or defaults.
    fn load_first(candidates: &[PathBuf]) -> Self {
        for path in candidates {
            if !path.exists() {
                continue;
            }
            match Self::load_from_path(path) {
                Ok(config) => {
                    debug!("Loaded config from {}", path.display());
                    return config;
                }
                Err(e) => {
                    debug!("Failed to load config from {}: {}", path.display(), e);
                }
            }
        }

        debug!("No config file found, using defaults");
        FileConfig::default()
    }

    /// Merge with another config, preferring values from self
    #[must_use]
    pub fn merge_with(&self, other: &FileConfig) -> Self {
        FileConfig {
            api_url: self.api_url.clone().or_else(|| other.api_url.clone()),
            api_key: self.api_key.clone().or_else(|| other.api_key.clone()),
            transaction_type: self.transaction_type.or(other.transaction_type),
        }
    }
}
