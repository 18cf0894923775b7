use std::path::{Path, PathBuf};

use ksio_serializer::SerializerConfig;
use ksio_store::FsBackend;
use ksio_types::Encoding;
use serde::{Deserialize, Serialize};

use crate::error::{SdkError, SdkResult};

/// Top-level configuration, usually loaded from a TOML file.
///
/// Every field has a default, so an empty file is a valid configuration.
///
/// ```toml
/// [storage]
/// root = "/var/lib/game/saves"
/// atomic_writes = true
///
/// [serializer]
/// read_consistency = "strict-chain"
///
/// [text]
/// default_encoding = "utf-16le"
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub serializer: SerializerConfig,
    pub text: TextConfig,
}

/// Where and how bytes are stored.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Confine keys under this directory. Keys are used as plain paths when
    /// unset.
    pub root: Option<PathBuf>,
    /// Write through a temporary file and rename over the target.
    pub atomic_writes: bool,
}

/// Text conversion defaults.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextConfig {
    /// Encoding used by the shortcut text operations.
    pub default_encoding: Encoding,
}

impl Config {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> SdkResult<Self> {
        toml::from_str(text).map_err(|e| SdkError::Config(e.to_string()))
    }

    /// Load a configuration file.
    pub fn load(path: &Path) -> SdkResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
            .map_err(|e| SdkError::Config(format!("{}: {e}", path.display())))
    }

    /// Render the configuration as TOML.
    pub fn to_toml_string(&self) -> SdkResult<String> {
        toml::to_string(self).map_err(|e| SdkError::Config(e.to_string()))
    }

    /// File-system backend described by the storage section.
    pub fn backend(&self) -> FsBackend {
        let backend = match &self.storage.root {
            Some(root) => FsBackend::with_root(root),
            None => FsBackend::new(),
        };
        backend.atomic_writes(self.storage.atomic_writes)
    }
}
