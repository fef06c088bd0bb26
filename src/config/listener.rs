use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::key::validate_identifier;
use crate::Error;
use crate::Result;

/// Change-capture and key-space listener settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ListenerConfig {
    /// Notification channel every change trigger publishes on
    #[serde(default = "default_channel")]
    pub channel: String,

    /// Name of the shared PL/pgSQL trigger function
    #[serde(default = "default_trigger_function")]
    pub trigger_function: String,

    /// Session setting carrying the writer's origin tag into the trigger
    #[serde(default = "default_origin_setting")]
    pub origin_setting: String,

    /// Reserved namespace token prefixing every cache-backed wire key
    #[serde(default = "default_keyspace_prefix")]
    pub keyspace_prefix: String,

    /// Cascade DELETE notifications that carry no origin tag (rows deleted
    /// directly in the database by an external actor)
    #[serde(default = "default_cascade_external_deletes")]
    pub cascade_external_deletes: bool,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            channel: default_channel(),
            trigger_function: default_trigger_function(),
            origin_setting: default_origin_setting(),
            keyspace_prefix: default_keyspace_prefix(),
            cascade_external_deletes: default_cascade_external_deletes(),
        }
    }
}

impl ListenerConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("channel", &self.channel),
            ("trigger_function", &self.trigger_function),
        ] {
            validate_identifier(value).map_err(|e| {
                Error::Config(ConfigError::Message(format!("listener.{name}: {e}")))
            })?;
        }

        // `<namespace>.<name>` custom setting
        let mut parts = self.origin_setting.split('.');
        let valid_setting = matches!(
            (parts.next(), parts.next(), parts.next()),
            (Some(ns), Some(name), None)
                if validate_identifier(ns).is_ok() && validate_identifier(name).is_ok()
        );
        if !valid_setting {
            return Err(Error::Config(ConfigError::Message(format!(
                "listener.origin_setting {:?} must look like namespace.name",
                self.origin_setting
            ))));
        }

        if self.keyspace_prefix.is_empty() || self.keyspace_prefix.contains(':') {
            return Err(Error::Config(ConfigError::Message(
                "listener.keyspace_prefix must be non-empty and contain no ':'".into(),
            )));
        }
        Ok(())
    }
}

fn default_channel() -> String {
    "cellsync_changes".to_string()
}
fn default_trigger_function() -> String {
    "cellsync_notify_change".to_string()
}
fn default_origin_setting() -> String {
    "cellsync.origin".to_string()
}
fn default_keyspace_prefix() -> String {
    "cellsync".to_string()
}
fn default_cascade_external_deletes() -> bool {
    true
}
