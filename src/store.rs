//! # State Persistence
//!
//! The engine saves its shuffle state and queue through the [`StateStore`]
//! trait after every mutation and reloads them on [`restore`].
//!
//! [`JsonStateStore`] keeps two JSON files in a state directory:
//!
//! - `shuffle_state.json` - personality, custom weights, enabled flag
//! - `queue.json` - original queue, effective queue, current item
//!
//! A missing file loads as `None`. A file that exists but does not decode is
//! an error, which the engine answers with defaults.
//!
//! [`restore`]: crate::queue::QueueEngine::restore

use anyhow::{Context, Result};
use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::queue::PersistedQueue;
use crate::shuffle::ShuffleState;

pub const SHUFFLE_STATE_FILE: &str = "shuffle_state.json";
pub const QUEUE_FILE: &str = "queue.json";

/// Load and save of the engine's persistent state.
pub trait StateStore: Send {
    /// # Errors
    ///
    /// Returns an error when stored state exists but cannot be read or decoded.
    fn load_shuffle_state(&self) -> Result<Option<ShuffleState>>;

    /// # Errors
    ///
    /// Returns an error when the state cannot be written.
    fn save_shuffle_state(&self, state: &ShuffleState) -> Result<()>;

    /// # Errors
    ///
    /// Returns an error when a stored queue exists but cannot be read or decoded.
    fn load_queue(&self) -> Result<Option<PersistedQueue>>;

    /// # Errors
    ///
    /// Returns an error when the queue cannot be written.
    fn save_queue(&self, queue: &PersistedQueue) -> Result<()>;
}

/// JSON files in one directory.
#[derive(Debug, Clone)]
pub struct JsonStateStore {
    dir: PathBuf,
}

impl JsonStateStore {
    /// Opens the store, creating `dir` if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use museq::store::JsonStateStore;
    ///
    /// let store = JsonStateStore::open(museq::config::get_state_dir()?)?;
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create state directory at {}", dir.display()))?;
        Ok(Self { dir })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn read<T: DeserializeOwned>(&self, file: &str) -> Result<Option<T>> {
        let path = self.dir.join(file);
        if !path.exists() {
            debug!("No persisted state at {}", path.display());
            return Ok(None);
        }

        let contents =
            fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
        let value = serde_json::from_str(&contents)
            .with_context(|| format!("Malformed JSON in {}", path.display()))?;
        Ok(Some(value))
    }

    /// Writes through a temporary file so a crash never leaves half a file.
    fn write<T: Serialize>(&self, file: &str, value: &T) -> Result<()> {
        let path = self.dir.join(file);
        let tmp = self.dir.join(format!("{file}.tmp"));

        let json = serde_json::to_string_pretty(value).context("Failed to serialize state")?;
        fs::write(&tmp, json).with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to move {} into place", path.display()))?;
        Ok(())
    }
}

impl StateStore for JsonStateStore {
    fn load_shuffle_state(&self) -> Result<Option<ShuffleState>> {
        self.read(SHUFFLE_STATE_FILE)
    }

    fn save_shuffle_state(&self, state: &ShuffleState) -> Result<()> {
        self.write(SHUFFLE_STATE_FILE, state)
    }

    fn load_queue(&self) -> Result<Option<PersistedQueue>> {
        self.read(QUEUE_FILE)
    }

    fn save_queue(&self, queue: &PersistedQueue) -> Result<()> {
        self.write(QUEUE_FILE, queue)
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    shuffle: Option<ShuffleState>,
    queue: Option<PersistedQueue>,
}

/// In-memory store. Clones share the same state, so a test can hand one
/// clone to an engine and inspect or reuse the other.
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    inner: Arc<Mutex<MemoryState>>,
}

impl MemoryStateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut MemoryState) -> T) -> Result<T> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| anyhow::anyhow!("Memory state store lock poisoned"))?;
        Ok(f(&mut guard))
    }
}

impl StateStore for MemoryStateStore {
    fn load_shuffle_state(&self) -> Result<Option<ShuffleState>> {
        self.with(|s| s.shuffle.clone())
    }

    fn save_shuffle_state(&self, state: &ShuffleState) -> Result<()> {
        self.with(|s| s.shuffle = Some(state.clone()))
    }

    fn load_queue(&self) -> Result<Option<PersistedQueue>> {
        self.with(|s| s.queue.clone())
    }

    fn save_queue(&self, queue: &PersistedQueue) -> Result<()> {
        self.with(|s| s.queue = Some(queue.clone()))
    }
}
