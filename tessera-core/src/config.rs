use std::path::Path;

use serde::Deserialize;

/// What `setup_data` does with a pending local edit of a pushed key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingEditPolicy {
    /// The local edit keeps shadowing the new canonical value.
    #[default]
    KeepLocal,
    /// The local edit is discarded in favor of the pushed value.
    PreferRemote,
}

impl std::str::FromStr for PendingEditPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "keep_local" | "keep-local" => Ok(PendingEditPolicy::KeepLocal),
            "prefer_remote" | "prefer-remote" => Ok(PendingEditPolicy::PreferRemote),
            _ => Err(format!("unknown pending edit policy: {}", s)),
        }
    }
}

impl std::fmt::Display for PendingEditPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PendingEditPolicy::KeepLocal => write!(f, "keep_local"),
            PendingEditPolicy::PreferRemote => write!(f, "prefer_remote"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Store behavior switches. Every key is optional.
///
/// ```toml
/// pending_edit_policy = "prefer_remote"
/// strict_schema = true
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    pub pending_edit_policy: PendingEditPolicy,
    /// Reject local edits of keys the schema does not declare.
    pub strict_schema: bool,
}

impl StoreConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}
