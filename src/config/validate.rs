// src/config/validate.rs

use std::time::Duration;

use crate::config::model::ConfigFile;
use crate::errors::{IbazelError, Result};

/// Semantic checks on a loaded config:
/// - durations parse and the debounce window is non-zero
/// - hook commands split into at least a program name
pub fn validate_config(cfg: &ConfigFile) -> Result<()> {
    let debounce = parse_duration(&cfg.config.debounce)
        .map_err(|e| IbazelError::Config(format!("invalid [config].debounce: {e}")))?;
    if debounce.is_zero() {
        return Err(IbazelError::Config(
            "[config].debounce must be greater than zero".to_string(),
        ));
    }

    parse_duration(&cfg.config.graceful_termination_wait).map_err(|e| {
        IbazelError::Config(format!("invalid [config].graceful_termination_wait: {e}"))
    })?;

    for (name, value) in [
        ("run_command_before", &cfg.hooks.run_command_before),
        ("run_command_after", &cfg.hooks.run_command_after),
        ("run_command_after_success", &cfg.hooks.run_command_after_success),
    ] {
        if let Some(cmd) = value {
            split_command(cmd).map_err(|e| IbazelError::Config(format!("[hooks].{name}: {e}")))?;
        }
    }

    Ok(())
}

/// Parse `"250ms"`, `"3s"`, `"1m"` or `"2h"`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{num_part}': {e}"))?;

    match unit_part.trim().to_lowercase().as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 60 * 60)),
        unit => Err(format!(
            "unsupported duration unit '{unit}'; expected ms, s, m, or h"
        )),
    }
}

/// Split a hook command line the way a POSIX shell would.
pub fn split_command(cmd: &str) -> std::result::Result<Vec<String>, String> {
    let words = shell_words::split(cmd).map_err(|e| format!("cannot parse `{cmd}`: {e}"))?;
    if words.is_empty() {
        return Err("command is empty".to_string());
    }
    Ok(words)
}
