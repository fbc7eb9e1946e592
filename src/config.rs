use std::{
    io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Builder settings, usually read from an `irscope.toml` file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuilderConfig {
    /// How function names are made unique inside a module.
    pub naming: NamingPolicy,
    /// Separator between a name and its counter under [`NamingPolicy::Suffix`].
    pub suffix_separator: String,
    /// Whether named functions get a `global_symbol` attribute.
    pub global_symbol_attr: bool,
    /// Name prefix of vars emitted in ordinary blocks.
    pub binding_var_prefix: String,
    /// Name prefix of vars emitted in dataflow blocks.
    pub dataflow_var_prefix: String,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            naming: NamingPolicy::default(),
            suffix_separator: "_".to_string(),
            global_symbol_attr: true,
            binding_var_prefix: "gv".to_string(),
            dataflow_var_prefix: "lv".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamingPolicy {
    /// Names are used as given. Re-registering a name replaces its definition.
    Identity,
    /// Taken names get the first free numeric suffix: `f`, `f_1`, `f_2`...
    #[default]
    Suffix,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid builder config: {0}")]
    Parse(#[from] toml::de::Error),
}

impl BuilderConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }
}
