//! # Configuration Module
//!
//! Data directory layout for museq. Everything lives under the platform data
//! directory:
//!
//! - Linux: `~/.local/share/museq/`
//! - macOS: `~/Library/Application Support/museq/`
//! - Windows: `%APPDATA%\museq\`
//!
//! Inside it, `signals.db` holds listening signals and `state/` holds the
//! persisted shuffle state and queue. Both locations can be overridden on the
//! command line or through `MUSEQ_DB` / `MUSEQ_STATE_DIR`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

const APP_DIR: &str = "museq";
const DB_FILE: &str = "signals.db";
const STATE_DIR: &str = "state";

/// Returns the museq data directory, creating it if needed.
///
/// # Errors
///
/// This function will return an error if:
/// - The system data directory cannot be determined
/// - The museq subdirectory cannot be created due to permissions
///
/// # Examples
///
/// ```no_run
/// use museq::config::get_data_dir;
///
/// let dir = get_data_dir()?;
/// println!("Data location: {}", dir.display());
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn get_data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().ok_or_else(|| {
        anyhow::anyhow!(
            "Could not determine system data directory. Please ensure your platform supports standard data directories."
        )
    })?;

    let museq_dir = data_dir.join(APP_DIR);
    fs::create_dir_all(&museq_dir).with_context(|| {
        format!(
            "Failed to create museq data directory at {}. Please check file permissions.",
            museq_dir.display()
        )
    })?;

    Ok(museq_dir)
}

/// Returns the path of the signal database, `signals.db` in the data
/// directory.
///
/// # Errors
///
/// Returns an error if the data directory cannot be determined or created.
pub fn get_db_path() -> Result<PathBuf> {
    Ok(get_data_dir()?.join(DB_FILE))
}

/// Returns the directory holding persisted shuffle state and queue.
///
/// # Errors
///
/// Returns an error if the directory cannot be determined or created.
pub fn get_state_dir() -> Result<PathBuf> {
    let dir = get_data_dir()?.join(STATE_DIR);
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create state directory at {}", dir.display()))?;
    Ok(dir)
}

/// Where the binary reads and writes its data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Path to the signal database
    pub db_path: PathBuf,
    /// Directory for `shuffle_state.json` and `queue.json`
    pub state_dir: PathBuf,
}

impl RuntimeConfig {
    /// Configuration with the platform default locations.
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory cannot be determined or created.
    pub fn new() -> Result<Self> {
        Ok(Self {
            db_path: get_db_path()?,
            state_dir: get_state_dir()?,
        })
    }

    /// Defaults with the given overrides applied. Only resolves the platform
    /// directory when an override is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if a default location is needed and cannot be created.
    pub fn resolve(db_path: Option<PathBuf>, state_dir: Option<PathBuf>) -> Result<Self> {
        let db_path = match db_path {
            Some(path) => path,
            None => get_db_path()?,
        };
        let state_dir = match state_dir {
            Some(dir) => dir,
            None => get_state_dir()?,
        };
        Ok(Self { db_path, state_dir })
    }

    /// Create configuration with explicit locations
    #[must_use]
    pub fn with_paths(db_path: PathBuf, state_dir: PathBuf) -> Self {
        Self { db_path, state_dir }
    }
}
