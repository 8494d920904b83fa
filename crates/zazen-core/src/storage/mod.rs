mod config;
pub mod database;
pub mod session_store;

pub use config::{Config, EffectsConfig, SchedulingConfig, SchedulingMode};
pub use database::Database;
pub use session_store::{KvSessionStore, MemorySessionStore, SessionStore};

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns the data directory, creating it if needed.
///
/// `ZAZEN_DATA_DIR` overrides the location outright. Otherwise it is
/// `~/.config/zazen[-dev]/`, with `ZAZEN_ENV=dev` selecting the development
/// directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("ZAZEN_DATA_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("ZAZEN_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("zazen-dev")
            } else {
                base_dir.join("zazen")
            }
        }
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::DataDir(e.to_string()))?;
    Ok(dir)
}
