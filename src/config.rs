//! Engine settings, loadable from a JSON file.
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::path_de;

pub const DEFAULT_MAX_UNDOS: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Capacity of each of the undo and redo stacks.
    pub max_undos: usize,
    /// Fail the row on a typecast problem instead of keeping the raw value.
    pub strict_typecast: bool,
    /// `chrono` formats tried before the built-in ones when casting text to dates.
    pub date_formats: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_undos: DEFAULT_MAX_UNDOS,
            strict_typecast: false,
            date_formats: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let config: Self = path_de::from_file_with_path(path.as_ref())?;
        tracing::debug!(path = %path.as_ref().display(), ?config, "loaded engine config");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn missing_keys_take_defaults() {
        let config: EngineConfig = path_de::from_str_with_path(r#"{"strict_typecast": true}"#).unwrap();
        assert_eq!(config.max_undos, DEFAULT_MAX_UNDOS);
        assert!(config.strict_typecast);
        assert!(config.date_formats.is_empty());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = path_de::from_str_with_path::<EngineConfig>(r#"{"max_undo": 3}"#).unwrap_err();
        assert!(matches!(err, Error::JsonPath { .. }));
    }
}
