//! TOML-based application configuration.
//!
//! Stores host preferences:
//! - How transitions are driven (precise wake-ups or polling)
//! - Whether vibration and status notifications are requested
//! - The default step list used when a session is started without one
//!
//! Configuration is stored at `~/.config/zazen/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::data_dir;
use crate::error::{ConfigError, Result};
use crate::timer::{RawStep, StepType};

/// How a host learns that a transition instant has passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulingMode {
    /// Sleep until each precomputed transition instant.
    Precise,
    /// Re-check elapsed time at a fixed interval. For hosts whose wake-ups
    /// cannot be trusted to arrive on time.
    Polling,
}

/// Scheduling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingConfig {
    #[serde(default = "default_mode")]
    pub mode: SchedulingMode,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

/// Effect configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectsConfig {
    #[serde(default = "default_true")]
    pub vibration: bool,
    #[serde(default = "default_true")]
    pub notifications: bool,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/zazen/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scheduling: SchedulingConfig,
    #[serde(default)]
    pub effects: EffectsConfig,
    /// Steps used by `session start` when none are given.
    #[serde(default = "default_steps")]
    pub default_steps: Vec<RawStep>,
}

fn default_mode() -> SchedulingMode {
    SchedulingMode::Precise
}
fn default_poll_interval_ms() -> u64 {
    1000
}
fn default_true() -> bool {
    true
}
fn default_steps() -> Vec<RawStep> {
    vec![
        RawStep::new(StepType::PreStart, 10),
        RawStep::new(StepType::Zazen, 25 * 60),
        RawStep::new(StepType::Kinhin, 5 * 60),
        RawStep::new(StepType::Zazen, 25 * 60),
    ]
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Default for EffectsConfig {
    fn default() -> Self {
        Self {
            vibration: true,
            notifications: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scheduling: SchedulingConfig::default(),
            effects: EffectsConfig::default(),
            default_steps: default_steps(),
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => serde_json::Value::Number(
                        value
                            .parse::<u64>()
                            .map_err(|_| invalid(format!("cannot parse '{value}' as number")))?
                            .into(),
                    ),
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    fn path() -> Result<PathBuf> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk, writing the defaults on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self> {
        let path = Self::path()?;
        match std::fs::read_to_string(&path) {
            Ok(content) => toml::from_str(&content).map_err(|e| {
                ConfigError::LoadFailed {
                    path: path.clone(),
                    message: e.to_string(),
                }
                .into()
            }),
            Err(_) => {
                let cfg = Self::default();
                cfg.save()?;
                Ok(cfg)
            }
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<()> {
        let path = Self::path()?;
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.clone(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(&path, content).map_err(|e| save_failed(e.to_string()))?;
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key without saving.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value does not fit the
    /// field.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        let mut json = serde_json::to_value(&*self)?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        *self = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// Set a config value by key and persist.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value cannot be parsed,
    /// or the config cannot be saved.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.apply(key, value)?;
        self.save()
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.scheduling.mode, SchedulingMode::Precise);
        assert_eq!(parsed.scheduling.poll_interval_ms, 1000);
        assert_eq!(parsed.default_steps, cfg.default_steps);
    }

    #[test]
    fn missing_sections_use_defaults() {
        let parsed: Config = toml::from_str("[scheduling]\nmode = \"polling\"\n").unwrap();
        assert_eq!(parsed.scheduling.mode, SchedulingMode::Polling);
        assert_eq!(parsed.scheduling.poll_interval_ms, 1000);
        assert!(parsed.effects.vibration);
        assert_eq!(parsed.default_steps.len(), 4);
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("scheduling.mode").as_deref(), Some("precise"));
        assert_eq!(cfg.get("scheduling.poll_interval_ms").as_deref(), Some("1000"));
        assert_eq!(cfg.get("effects.vibration").as_deref(), Some("true"));
        assert!(cfg.get("effects.missing_key").is_none());
        assert!(cfg.get("").is_none());
    }

    #[test]
    fn apply_updates_nested_values() {
        let mut cfg = Config::default();
        cfg.apply("effects.vibration", "false").unwrap();
        cfg.apply("scheduling.poll_interval_ms", "500").unwrap();
        cfg.apply("scheduling.mode", "polling").unwrap();
        assert!(!cfg.effects.vibration);
        assert_eq!(cfg.scheduling.poll_interval_ms, 500);
        assert_eq!(cfg.scheduling.mode, SchedulingMode::Polling);
    }

    #[test]
    fn apply_replaces_default_steps() {
        let mut cfg = Config::default();
        cfg.apply("default_steps", r#"[{"t":"zazen","d":60}]"#).unwrap();
        assert_eq!(cfg.default_steps, vec![RawStep::new(StepType::Zazen, 60)]);
    }

    #[test]
    fn apply_rejects_unknown_key() {
        let mut cfg = Config::default();
        assert!(cfg.apply("effects.nonexistent_key", "true").is_err());
        assert!(cfg.apply("", "true").is_err());
    }

    #[test]
    fn apply_rejects_invalid_values() {
        let mut cfg = Config::default();
        assert!(cfg.apply("effects.vibration", "not_a_bool").is_err());
        assert!(cfg.apply("scheduling.poll_interval_ms", "-5").is_err());
        assert!(cfg.apply("scheduling.mode", "sometimes").is_err());
        assert_eq!(cfg.scheduling.mode, SchedulingMode::Precise);
    }
}
