//! Settings that shape how `session` behaves: how `watch` wakes up, which
//! effects the terminal plays, and the steps `session start` uses by default.

use clap::Subcommand;
use zazen_core::{Config, ConfigError};

use super::print_json;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print one setting
    Get {
        /// Dot-separated key: "scheduling.mode", "scheduling.poll_interval_ms",
        /// "effects.vibration", "effects.notifications" or "default_steps"
        key: String,
    },
    /// Change one setting and save it
    Set {
        /// Dot-separated key, as for `get`
        key: String,
        /// New value, e.g. "polling", "500", "false", or a JSON step list
        /// for "default_steps"
        value: String,
    },
    /// Print every setting as JSON
    List,
    /// Restore precise scheduling, all effects and the default sitting
    Reset,
}

pub fn run(action: ConfigAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let value = config.get(&key).ok_or(ConfigError::UnknownKey(key))?;
            println!("{value}");
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            // Echo what was stored, which may be normalized.
            let stored = config.get(&key).unwrap_or(value);
            println!("{key} = {stored}");
        }
        ConfigAction::List => {
            print_json(&Config::load()?)?;
        }
        ConfigAction::Reset => {
            let config = Config::default();
            config.save()?;
            println!(
                "settings reset: {} default steps, {} scheduling",
                config.default_steps.len(),
                config.get("scheduling.mode").unwrap_or_default()
            );
        }
    }
    Ok(())
}
