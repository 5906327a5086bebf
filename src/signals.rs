//! # Listening Signals
//!
//! The engine never owns listening statistics. It reads them through the
//! [`SignalStore`] trait and freezes one [`SignalSnapshot`] per computation,
//! so a shuffle sees a consistent picture even if the store changes
//! underneath.
//!
//! ## Degradation
//!
//! A failing store query is logged and treated as "no data" for that signal:
//! a broken history table turns off the recency penalty instead of failing
//! the shuffle.

use anyhow::Result;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::track::{Track, TrackId};

/// Kind of a listening event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Skip,
    Listen,
    Complete,
}

impl EventKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Skip => "skip",
            Self::Listen => "listen",
            Self::Complete => "complete",
        }
    }
}

impl std::str::FromStr for EventKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "listen" => Ok(Self::Listen),
            "complete" => Ok(Self::Complete),
            other => Err(anyhow::anyhow!("Unknown event kind: {other}. Use skip, listen or complete")),
        }
    }
}

/// One entry of the play history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayHistoryEntry {
    pub track_id: TrackId,
    /// Unix seconds.
    pub timestamp: i64,
    /// Fraction of the track that was heard, in `[0, 1]`.
    pub play_ratio: f64,
    pub kind: EventKind,
}

/// Aggregated skip events of one track.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SkipStats {
    pub count: u32,
    pub avg_ratio: f64,
}

/// Read access to the listening statistics.
///
/// Implementations must be `Send` so an engine can sit behind a mutex.
pub trait SignalStore: Send {
    /// Play count per track.
    ///
    /// # Errors
    ///
    /// Returns an error when the backing store cannot be queried.
    fn play_counts(&self) -> Result<HashMap<TrackId, u32>>;

    /// Skip statistics per track.
    ///
    /// # Errors
    ///
    /// Returns an error when the backing store cannot be queried.
    fn skip_stats(&self) -> Result<HashMap<TrackId, SkipStats>>;

    /// The `limit` most recent history entries, most recent first.
    ///
    /// # Errors
    ///
    /// Returns an error when the backing store cannot be queried.
    fn play_history(&self, limit: usize) -> Result<Vec<PlayHistoryEntry>>;

    /// # Errors
    ///
    /// Returns an error when the backing store cannot be queried.
    fn is_favorite(&self, track_id: &str) -> Result<bool>;

    /// # Errors
    ///
    /// Returns an error when the backing store cannot be queried.
    fn is_suggest_less(&self, track_id: &str) -> Result<bool>;

    /// Hidden tracks are never drawn from the library.
    ///
    /// # Errors
    ///
    /// Returns an error when the backing store cannot be queried.
    fn is_hidden(&self, _track_id: &str) -> Result<bool> {
        Ok(false)
    }

    /// Track ids of a user playlist, used by the `consistent` personality.
    ///
    /// # Errors
    ///
    /// Returns an error when the backing store cannot be queried.
    fn playlist_tracks(&self, _playlist_id: &str) -> Result<Vec<TrackId>> {
        Ok(Vec::new())
    }
}

/// Point-in-time copy of every signal the weight calculator needs.
#[derive(Debug, Clone, Default)]
pub struct SignalSnapshot {
    pub play_counts: HashMap<TrackId, u32>,
    pub skip_stats: HashMap<TrackId, SkipStats>,
    /// Most recent first.
    pub history: Vec<PlayHistoryEntry>,
    pub favorites: HashSet<TrackId>,
    pub suggest_less: HashSet<TrackId>,
    pub hidden: HashSet<TrackId>,
    /// Union of the anchor playlists' tracks.
    pub anchored: HashSet<TrackId>,
}

impl SignalSnapshot {
    /// Queries `store` once for everything a computation over `candidates`
    /// needs.
    pub fn capture<'a, I>(
        store: &dyn SignalStore,
        candidates: I,
        history_limit: usize,
        anchor_playlists: &[String],
    ) -> Self
    where
        I: IntoIterator<Item = &'a Track>,
    {
        let play_counts = degrade(store.play_counts(), "play counts");
        let skip_stats = degrade(store.skip_stats(), "skip statistics");
        let history = degrade(store.play_history(history_limit), "play history");

        let mut snapshot = Self {
            play_counts,
            skip_stats,
            history,
            ..Self::default()
        };

        let mut seen = HashSet::new();
        for track in candidates {
            if !seen.insert(track.id.as_str()) {
                continue;
            }
            if degrade(store.is_favorite(&track.id), "favorites") {
                snapshot.favorites.insert(track.id.clone());
            }
            if degrade(store.is_suggest_less(&track.id), "suggest-less") {
                snapshot.suggest_less.insert(track.id.clone());
            }
            if degrade(store.is_hidden(&track.id), "hidden") {
                snapshot.hidden.insert(track.id.clone());
            }
        }

        for playlist in anchor_playlists {
            let tracks = degrade(store.playlist_tracks(playlist), "anchor playlist");
            snapshot.anchored.extend(tracks);
        }

        snapshot
    }

    #[must_use]
    pub fn play_count(&self, track_id: &str) -> u32 {
        self.play_counts.get(track_id).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn skips(&self, track_id: &str) -> SkipStats {
        self.skip_stats.get(track_id).copied().unwrap_or_default()
    }

    #[must_use]
    pub fn is_favorite(&self, track_id: &str) -> bool {
        self.favorites.contains(track_id)
    }

    #[must_use]
    pub fn is_suggest_less(&self, track_id: &str) -> bool {
        self.suggest_less.contains(track_id)
    }

    #[must_use]
    pub fn is_hidden(&self, track_id: &str) -> bool {
        self.hidden.contains(track_id)
    }

    #[must_use]
    pub fn is_anchored(&self, track_id: &str) -> bool {
        self.anchored.contains(track_id)
    }
}

fn degrade<T: Default>(result: Result<T>, signal: &str) -> T {
    result.unwrap_or_else(|e| {
        warn!("Signal store failed to provide {signal}, continuing without it: {e:#}");
        T::default()
    })
}

/// Signal store held entirely in memory.
///
/// Useful for tests and for front ends that keep statistics elsewhere and
/// only hand the engine a copy.
#[derive(Debug, Clone, Default)]
pub struct MemorySignalStore {
    pub play_counts: HashMap<TrackId, u32>,
    pub skip_stats: HashMap<TrackId, SkipStats>,
    /// Most recent first.
    pub history: Vec<PlayHistoryEntry>,
    pub favorites: HashSet<TrackId>,
    pub suggest_less: HashSet<TrackId>,
    pub hidden: HashSet<TrackId>,
    pub playlists: HashMap<String, Vec<TrackId>>,
}

impl MemorySignalStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes an event to the front of the history and updates the
    /// aggregates the same way the SQLite store derives them.
    pub fn record(&mut self, track_id: &str, kind: EventKind, play_ratio: f64, timestamp: i64) {
        let play_ratio = play_ratio.clamp(0.0, 1.0);
        match kind {
            EventKind::Listen | EventKind::Complete => {
                *self.play_counts.entry(track_id.to_string()).or_insert(0) += 1;
            }
            EventKind::Skip => {
                let stats = self.skip_stats.entry(track_id.to_string()).or_default();
                let total = stats.avg_ratio * f64::from(stats.count) + play_ratio;
                stats.count += 1;
                stats.avg_ratio = total / f64::from(stats.count);
            }
        }
        self.history.insert(
            0,
            PlayHistoryEntry {
                track_id: track_id.to_string(),
                timestamp,
                play_ratio,
                kind,
            },
        );
    }
}

impl SignalStore for MemorySignalStore {
    fn play_counts(&self) -> Result<HashMap<TrackId, u32>> {
        Ok(self.play_counts.clone())
    }

    fn skip_stats(&self) -> Result<HashMap<TrackId, SkipStats>> {
        Ok(self.skip_stats.clone())
    }

    fn play_history(&self, limit: usize) -> Result<Vec<PlayHistoryEntry>> {
        Ok(self.history.iter().take(limit).cloned().collect())
    }

    fn is_favorite(&self, track_id: &str) -> Result<bool> {
        Ok(self.favorites.contains(track_id))
    }

    fn is_suggest_less(&self, track_id: &str) -> Result<bool> {
        Ok(self.suggest_less.contains(track_id))
    }

    fn is_hidden(&self, track_id: &str) -> Result<bool> {
        Ok(self.hidden.contains(track_id))
    }

    fn playlist_tracks(&self, playlist_id: &str) -> Result<Vec<TrackId>> {
        Ok(self.playlists.get(playlist_id).cloned().unwrap_or_default())
    }
}
