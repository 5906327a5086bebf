//! # Signal Database
//!
//! SQLite-backed [`SignalStore`]. Raw playback events are stored as they
//! arrive and every aggregate (play counts, skip statistics, history) is
//! derived from them at query time.
//!
//! ## Tables
//!
//! | table             | contents                                      |
//! |-------------------|-----------------------------------------------|
//! | `play_events`     | one row per skip / listen / complete          |
//! | `favorites`       | loved track ids                               |
//! | `suggest_less`    | track ids the user wants to hear less         |
//! | `hidden`          | track ids never drawn from the library        |
//! | `playlist_tracks` | playlist membership, for anchor playlists     |
//! | `merge_groups`    | track id to merge group                       |

use anyhow::{Context, Result};
use log::{debug, trace};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;

use crate::merge::MergeGroups;
use crate::signals::{EventKind, PlayHistoryEntry, SignalStore, SkipStats};
use crate::track::TrackId;

/// A skip this close to the end (in seconds) counts as a complete play.
pub const COMPLETE_THRESHOLD_SECS: f64 = 10.0;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS play_events (
        id         INTEGER PRIMARY KEY,
        track_id   TEXT    NOT NULL,
        kind       TEXT    NOT NULL,
        play_ratio REAL    NOT NULL,
        timestamp  INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_play_events_track ON play_events (track_id);
    CREATE INDEX IF NOT EXISTS idx_play_events_time ON play_events (timestamp);
    CREATE TABLE IF NOT EXISTS favorites    (track_id TEXT PRIMARY KEY);
    CREATE TABLE IF NOT EXISTS suggest_less (track_id TEXT PRIMARY KEY);
    CREATE TABLE IF NOT EXISTS hidden       (track_id TEXT PRIMARY KEY);
    CREATE TABLE IF NOT EXISTS playlist_tracks (
        playlist_id TEXT    NOT NULL,
        track_id    TEXT    NOT NULL,
        position    INTEGER NOT NULL,
        PRIMARY KEY (playlist_id, track_id)
    );
    CREATE TABLE IF NOT EXISTS merge_groups (
        track_id TEXT PRIMARY KEY,
        group_id TEXT NOT NULL
    );
";

/// A finished (or abandoned) playback as reported by the player.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackEvent {
    pub track_id: TrackId,
    pub kind: EventKind,
    /// Seconds heard before the event.
    pub listened: f64,
    /// Track length in seconds, 0.0 when unknown.
    pub duration: f64,
    /// Unix seconds.
    pub timestamp: i64,
}

impl PlaybackEvent {
    /// Kind to store: a skip within the last few seconds is a complete play.
    #[must_use]
    pub fn classify(&self) -> EventKind {
        let remaining = self.duration - self.listened;
        if self.kind == EventKind::Skip && self.duration > 0.0 && remaining <= COMPLETE_THRESHOLD_SECS {
            EventKind::Complete
        } else {
            self.kind
        }
    }

    /// Fraction of the track heard, in `[0, 1]`.
    #[must_use]
    pub fn play_ratio(&self) -> f64 {
        if self.duration > 0.0 {
            (self.listened / self.duration).clamp(0.0, 1.0)
        } else if self.kind == EventKind::Skip {
            0.0
        } else {
            1.0
        }
    }
}

/// Signal store over one SQLite database.
#[derive(Debug)]
pub struct SqliteSignalStore {
    conn: Connection,
}

impl SqliteSignalStore {
    /// Opens (creating if needed) the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the schema cannot be
    /// created.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use museq::db::SqliteSignalStore;
    ///
    /// let store = SqliteSignalStore::open(museq::config::get_db_path()?)?;
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open signal database at {}", path.display()))?;
        Self::init(conn)
    }

    /// In-memory database, gone when dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .context("Failed to create signal tables")?;
        Ok(Self { conn })
    }

    /// Stores one playback event and returns the kind it was stored as.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn record_event(&self, event: &PlaybackEvent) -> Result<EventKind> {
        let kind = event.classify();
        if kind != event.kind {
            debug!("Skip of {} near the end recorded as complete", event.track_id);
        }

        self.conn
            .execute(
                "INSERT INTO play_events (track_id, kind, play_ratio, timestamp) VALUES (?1, ?2, ?3, ?4)",
                params![event.track_id, kind.as_str(), event.play_ratio(), event.timestamp],
            )
            .with_context(|| format!("Failed to record {} event for {}", kind.as_str(), event.track_id))?;

        trace!("Recorded {} for {}", kind.as_str(), event.track_id);
        Ok(kind)
    }

    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn set_favorite(&self, track_id: &str, on: bool) -> Result<()> {
        self.set_flag("favorites", track_id, on)
    }

    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn set_suggest_less(&self, track_id: &str, on: bool) -> Result<()> {
        self.set_flag("suggest_less", track_id, on)
    }

    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn set_hidden(&self, track_id: &str, on: bool) -> Result<()> {
        self.set_flag("hidden", track_id, on)
    }

    fn set_flag(&self, table: &str, track_id: &str, on: bool) -> Result<()> {
        let sql = if on {
            format!("INSERT OR IGNORE INTO {table} (track_id) VALUES (?1)")
        } else {
            format!("DELETE FROM {table} WHERE track_id = ?1")
        };
        self.conn
            .execute(&sql, [track_id])
            .with_context(|| format!("Failed to update {table} for {track_id}"))?;
        Ok(())
    }

    fn has_flag(&self, table: &str, track_id: &str) -> Result<bool> {
        let sql = format!("SELECT 1 FROM {table} WHERE track_id = ?1");
        let found = self
            .conn
            .query_row(&sql, [track_id], |_| Ok(()))
            .optional()
            .with_context(|| format!("Failed to query {table}"))?;
        Ok(found.is_some())
    }

    /// Replaces the contents of a playlist.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails.
    pub fn set_playlist(&mut self, playlist_id: &str, track_ids: &[TrackId]) -> Result<()> {
        let tx = self.conn.transaction()?;

        tx.execute("DELETE FROM playlist_tracks WHERE playlist_id = ?1", [playlist_id])
            .with_context(|| format!("Failed to clear playlist {playlist_id}"))?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO playlist_tracks (playlist_id, track_id, position) VALUES (?1, ?2, ?3)",
            )?;
            for (position, track_id) in track_ids.iter().enumerate() {
                stmt.execute(params![playlist_id, track_id, position as i64])
                    .with_context(|| format!("Failed to add {track_id} to playlist {playlist_id}"))?;
            }
        }

        tx.commit().context("Committing playlist transaction failed")?;
        Ok(())
    }

    /// Puts `track_id` into `group_id`, replacing any previous group.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn assign_group(&self, track_id: &str, group_id: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO merge_groups (track_id, group_id) VALUES (?1, ?2)
                 ON CONFLICT (track_id) DO UPDATE SET group_id = excluded.group_id",
                [track_id, group_id],
            )
            .with_context(|| format!("Failed to assign {track_id} to group {group_id}"))?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn unassign_group(&self, track_id: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM merge_groups WHERE track_id = ?1", [track_id])
            .with_context(|| format!("Failed to remove {track_id} from its group"))?;
        Ok(())
    }

    /// Every track id any table mentions, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn known_tracks(&self) -> Result<Vec<TrackId>> {
        let mut stmt = self.conn.prepare(
            "SELECT track_id FROM play_events
             UNION SELECT track_id FROM favorites
             UNION SELECT track_id FROM suggest_less
             UNION SELECT track_id FROM hidden
             UNION SELECT track_id FROM merge_groups
             ORDER BY 1",
        )?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .context("Cannot query known tracks")?;

        let mut tracks = Vec::new();
        for row in rows {
            tracks.push(row.context("Queried track row failed")?);
        }
        Ok(tracks)
    }

    /// Builds the merge group lookup from the `merge_groups` table.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn load_merge_groups(&self) -> Result<MergeGroups> {
        let mut stmt = self
            .conn
            .prepare("SELECT track_id, group_id FROM merge_groups ORDER BY rowid")
            .context("Invalid SQL statement when SELECTing merge groups")?;

        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
            .context("Cannot query merge groups")?;

        let mut pairs = Vec::new();
        for row in rows {
            pairs.push(row.context("Queried merge group row failed")?);
        }
        Ok(MergeGroups::from_pairs(pairs))
    }
}

impl SignalStore for SqliteSignalStore {
    fn play_counts(&self) -> Result<HashMap<TrackId, u32>> {
        let mut stmt = self.conn.prepare(
            "SELECT track_id, COUNT(*) FROM play_events
             WHERE kind IN ('listen', 'complete') GROUP BY track_id",
        )?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?)))
            .context("Cannot query play counts")?;

        let mut counts = HashMap::new();
        for row in rows {
            let (track_id, count) = row.context("Queried play count row failed")?;
            counts.insert(track_id, count);
        }
        Ok(counts)
    }

    fn skip_stats(&self) -> Result<HashMap<TrackId, SkipStats>> {
        let mut stmt = self.conn.prepare(
            "SELECT track_id, COUNT(*), AVG(play_ratio) FROM play_events
             WHERE kind = 'skip' GROUP BY track_id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    SkipStats {
                        count: row.get(1)?,
                        avg_ratio: row.get(2)?,
                    },
                ))
            })
            .context("Cannot query skip statistics")?;

        let mut stats = HashMap::new();
        for row in rows {
            let (track_id, skip) = row.context("Queried skip row failed")?;
            stats.insert(track_id, skip);
        }
        Ok(stats)
    }

    fn play_history(&self, limit: usize) -> Result<Vec<PlayHistoryEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT track_id, timestamp, play_ratio, kind FROM play_events
             ORDER BY timestamp DESC, id DESC LIMIT ?1",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map([limit], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .context("Cannot query play history")?;

        let mut history = Vec::new();
        for row in rows {
            let (track_id, timestamp, play_ratio, kind) = row.context("Queried history row failed")?;
            history.push(PlayHistoryEntry {
                track_id,
                timestamp,
                play_ratio,
                kind: kind.parse()?,
            });
        }
        Ok(history)
    }

    fn is_favorite(&self, track_id: &str) -> Result<bool> {
        self.has_flag("favorites", track_id)
    }

    fn is_suggest_less(&self, track_id: &str) -> Result<bool> {
        self.has_flag("suggest_less", track_id)
    }

    fn is_hidden(&self, track_id: &str) -> Result<bool> {
        self.has_flag("hidden", track_id)
    }

    fn playlist_tracks(&self, playlist_id: &str) -> Result<Vec<TrackId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT track_id FROM playlist_tracks WHERE playlist_id = ?1 ORDER BY position")?;
        let rows = stmt
            .query_map([playlist_id], |row| row.get::<_, String>(0))
            .with_context(|| format!("Cannot query playlist {playlist_id}"))?;

        let mut tracks = Vec::new();
        for row in rows {
            tracks.push(row.context("Queried playlist row failed")?);
        }
        Ok(tracks)
    }
}
