//! Centralized path resolution for provisio
//!
//! # Environment Variables
//!
//! - `PROVISIO_STATE_DIR` - Override state directory
//!
//! # Path Resolution Priority
//!
//! For state_dir():
//! 1. `PROVISIO_STATE_DIR` environment variable
//! 2. `XDG_STATE_HOME/provisio` (if set)
//! 3. Platform default:
//!    - Windows: `%LOCALAPPDATA%\provisio`
//!    - macOS/Linux: `~/.local/state/provisio`
//!
//! Profiles live in `<state>/profiles`, native touchpoint backups in
//! `<state>/backups`.

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Environment variable for state directory override
pub const ENV_STATE_DIR: &str = "PROVISIO_STATE_DIR";

const APP_DIR: &str = "provisio";

/// Get the provisio state directory path
pub fn state_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_STATE_DIR) {
        let path = expand(&dir);
        log::debug!("Using state dir from {}: {}", ENV_STATE_DIR, path.display());
        return Ok(path);
    }

    if let Ok(xdg_state) = std::env::var("XDG_STATE_HOME") {
        let path = PathBuf::from(xdg_state).join(APP_DIR);
        log::debug!("Using XDG_STATE_HOME: {}", path.display());
        return Ok(path);
    }

    #[cfg(windows)]
    {
        if let Some(local_app_data) = dirs::data_local_dir() {
            let path = local_app_data.join(APP_DIR);
            log::debug!("Using Windows state dir: {}", path.display());
            return Ok(path);
        }
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".local").join("state").join(APP_DIR);
    log::debug!("Using default state dir: {}", path.display());
    Ok(path)
}

/// Directory holding one TOML file per profile
pub fn profiles_dir() -> Result<PathBuf> {
    Ok(state_dir()?.join("profiles"))
}

/// Directory under which each transaction gets its own backup area
pub fn backups_dir() -> Result<PathBuf> {
    Ok(state_dir()?.join("backups"))
}

/// Expand ~ and environment variables in a path string.
///
/// Unknown variables are left as written.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    /// Run `f` with `key` set to `value`, restoring the previous value after
    ///
    /// # Safety
    /// Uses unsafe env::set_var/remove_var; other threads must not read the
    /// same variable concurrently.
    fn with_env_var<F, R>(key: &str, value: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let original = env::var(key).ok();
        // SAFETY: Tests run in isolation and don't read env vars concurrently
        unsafe { env::set_var(key, value) };
        let result = f();
        match original {
            // SAFETY: Tests run in isolation
            Some(v) => unsafe { env::set_var(key, v) },
            None => unsafe { env::remove_var(key) },
        }
        result
    }

    #[test]
    fn test_state_dir_env_override() {
        with_env_var(ENV_STATE_DIR, "/custom/provisio/state", || {
            assert_eq!(state_dir().unwrap(), PathBuf::from("/custom/provisio/state"));
            assert_eq!(
                profiles_dir().unwrap(),
                PathBuf::from("/custom/provisio/state/profiles")
            );
            assert_eq!(
                backups_dir().unwrap(),
                PathBuf::from("/custom/provisio/state/backups")
            );
        });
    }

    #[test]
    fn test_expand_with_tilde() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(expand("~/opt"), home.join("opt"));
    }

    #[test]
    fn test_expand_absolute() {
        assert_eq!(expand("/usr/local"), PathBuf::from("/usr/local"));
    }

    #[test]
    fn test_expand_unknown_env_var_unchanged() {
        let path = expand("$PROVISIO_SURELY_UNSET_VAR/x");
        assert_eq!(path, PathBuf::from("$PROVISIO_SURELY_UNSET_VAR/x"));
    }
}
