//! Analysis configuration
//!
//! All symbolic names the analyzer keys on (process image, entry point,
//! message-loop anchor, activity labels) come from here rather than being
//! compiled in, so the same classifier works for other UI applications.
//! Defaults target the Visual Studio UI thread.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::ConfigError;

/// Top-level configuration for an analysis run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Image name of the process to analyze. Default: "devenv.exe".
    #[serde(default = "default_process_name")]
    pub process_name: String,

    /// Frame signature identifying the target thread's entry point.
    #[serde(default = "default_entry_signature")]
    pub entry_signature: String,

    /// Frame signature of the message loop; the frame it calls is the activity label.
    #[serde(default = "default_anchor_signature")]
    pub anchor_signature: String,

    /// Activity labels that map blocking time to dedicated buckets.
    #[serde(default)]
    pub activities: ActivityConfig,
}

/// Activity label signatures, matched exactly against the frame just inside the anchor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityConfig {
    /// Labels for waiting inside the message pump.
    #[serde(default = "default_message_pump_wait")]
    pub message_pump_wait: Vec<String>,

    /// Label for dispatching a message to a window procedure.
    #[serde(default = "default_process_message")]
    pub process_message: String,

    /// Label for the idle loop.
    #[serde(default = "default_idle")]
    pub idle: String,
}

fn default_process_name() -> String {
    "devenv.exe".to_string()
}

fn default_entry_signature() -> String {
    "devenv!WinMain".to_string()
}

fn default_anchor_signature() -> String {
    "msenv!MainMessageLoop::Run".to_string()
}

fn default_message_pump_wait() -> Vec<String> {
    vec!["user32!GetMessageW".to_string(), "user32!MsgWaitForMultipleObjectsEx".to_string()]
}

fn default_process_message() -> String {
    "user32!DispatchMessageW".to_string()
}

fn default_idle() -> String {
    "msenv!CMsoComponentManager::FDoIdle".to_string()
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            process_name: default_process_name(),
            entry_signature: default_entry_signature(),
            anchor_signature: default_anchor_signature(),
            activities: ActivityConfig::default(),
        }
    }
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            message_pump_wait: default_message_pump_wait(),
            process_message: default_process_message(),
            idle: default_idle(),
        }
    }
}

impl AnalysisConfig {
    /// Load configuration from a JSON file and validate it.
    ///
    /// Fields missing from the file keep their defaults.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, is not valid JSON, or
    /// leaves a required signature empty.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|error| ConfigError::ReadFailed { path: path.to_path_buf(), error })?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|error| ConfigError::ParseFailed { path: path.to_path_buf(), error })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the analyzer cannot work with.
    ///
    /// # Errors
    /// Returns [`ConfigError::EmptyField`] naming the first empty field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("process_name", self.process_name.as_str()),
            ("entry_signature", self.entry_signature.as_str()),
            ("anchor_signature", self.anchor_signature.as_str()),
            ("activities.process_message", self.activities.process_message.as_str()),
            ("activities.idle", self.activities.idle.as_str()),
        ];
        if let Some((field, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(ConfigError::EmptyField(*field));
        }
        if self.activities.message_pump_wait.iter().any(|s| s.trim().is_empty()) {
            return Err(ConfigError::EmptyField("activities.message_pump_wait"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = AnalysisConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.activities.message_pump_wait.len(), 2);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "process_name": "notepad.exe", "activities": {{ "idle": "app!Idle" }} }}"#)
            .unwrap();

        let config = AnalysisConfig::from_file(file.path()).unwrap();
        assert_eq!(config.process_name, "notepad.exe");
        assert_eq!(config.activities.idle, "app!Idle");
        assert_eq!(config.entry_signature, "devenv!WinMain");
        assert_eq!(config.activities.process_message, "user32!DispatchMessageW");
    }

    #[test]
    fn test_empty_anchor_rejected() {
        let config =
            AnalysisConfig { anchor_signature: "  ".to_string(), ..AnalysisConfig::default() };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("anchor_signature"));
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = AnalysisConfig::from_file("/nonexistent/threadscope.json").unwrap_err();
        assert!(matches!(err, ConfigError::ReadFailed { .. }));
    }
}
