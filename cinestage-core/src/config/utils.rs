//! Environment helpers for configuration defaults
//!
//! Each helper reads one `CINESTAGE_*` variable and falls back to the given
//! default when the variable is unset or does not parse. Invalid values are
//! logged rather than rejected so a typo never prevents a run from starting.

use std::path::PathBuf;
use std::str::FromStr;

fn get_env_parsed<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(val) => match val.trim().parse() {
            Ok(parsed) => parsed,
            Err(_) => {
                log::warn!("Ignoring invalid value '{}' for {}", val, key);
                default
            }
        },
        Err(_) => default,
    }
}

/// Get a string value from an environment variable or use the default
pub fn get_env_string(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

/// Get a path value from an environment variable or use the default
pub fn get_env_path(key: &str, default: PathBuf) -> PathBuf {
    std::env::var(key).map(PathBuf::from).unwrap_or(default)
}

/// Get a boolean value from an environment variable or use the default
///
/// Accepts `true`/`1`/`yes`/`on` and `false`/`0`/`no`/`off`, case-insensitively.
pub fn get_env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => match val.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => true,
            "false" | "0" | "no" | "off" => false,
            _ => {
                log::warn!("Ignoring invalid boolean '{}' for {}", val, key);
                default
            }
        },
        Err(_) => default,
    }
}

/// Get a u32 value from an environment variable or use the default
pub fn get_env_u32(key: &str, default: u32) -> u32 {
    get_env_parsed(key, default)
}

/// Get a usize value from an environment variable or use the default
pub fn get_env_usize(key: &str, default: usize) -> usize {
    get_env_parsed(key, default)
}

/// Get a f64 value from an environment variable or use the default
pub fn get_env_f64(key: &str, default: f64) -> f64 {
    get_env_parsed(key, default)
}
