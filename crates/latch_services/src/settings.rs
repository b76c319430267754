//! Settings management

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// What happens when a script writes to a read-only bridged name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadOnlyWrites {
    /// The write lands in the instance's dynamic store and shadows nothing;
    /// reads still resolve to the bridged value.
    #[default]
    FallThrough,
    /// The write raises a script TypeError.
    Reject,
}

/// Script bridge settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSettings {
    /// Tag printed in front of every console line.
    pub console_tag: String,
    pub read_only_writes: ReadOnlyWrites,
    /// Script file loaded at startup.
    pub script_path: PathBuf,
    /// Number of update passes the runtime drives before teardown.
    pub frames: u32,
    pub gc_on_shutdown: bool,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            console_tag: "script".to_string(),
            read_only_writes: ReadOnlyWrites::default(),
            script_path: PathBuf::from("scripts/main.js"),
            frames: 1,
            gc_on_shutdown: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings: {0}")]
    Parse(#[from] serde_json::Error),
}

impl BridgeSettings {
    /// Parse settings from JSON. Missing keys take their defaults.
    pub fn from_json(text: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::from_json(&text)?;
        debug!(path = %path.display(), ?settings, "loaded bridge settings");
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_keys_use_defaults() {
        let settings = BridgeSettings::from_json(r#"{ "read_only_writes": "reject" }"#).unwrap();
        assert_eq!(settings.read_only_writes, ReadOnlyWrites::Reject);
        assert_eq!(settings.console_tag, "script");
        assert_eq!(settings.frames, 1);
        assert!(settings.gc_on_shutdown);

        assert_eq!(BridgeSettings::from_json("{}").unwrap(), BridgeSettings::default());
    }

    #[test]
    fn unknown_policy_is_rejected() {
        let err = BridgeSettings::from_json(r#"{ "read_only_writes": "maybe" }"#).unwrap_err();
        assert!(matches!(err, SettingsError::Parse(_)));
    }

    #[test]
    fn load_reads_file_and_reports_missing_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "console_tag": "TS", "frames": 3 }}"#).unwrap();

        let settings = BridgeSettings::load(file.path()).unwrap();
        assert_eq!(settings.console_tag, "TS");
        assert_eq!(settings.frames, 3);

        let missing = file.path().with_extension("missing");
        assert!(matches!(
            BridgeSettings::load(&missing),
            Err(SettingsError::Io { path, .. }) if path == missing
        ));
    }
}
