//! Tracks and queue entries.

use serde::{Deserialize, Serialize};

/// Unique track identifier, the file path of the track.
pub type TrackId = String;

/// Queue-scoped identifier of a [`QueueItem`].
pub type QueueId = u64;

/// Artist sentinel written by the library scanner when no tag exists.
pub const UNKNOWN_ARTIST: &str = "Unknown";

/// Album sentinel written by the library scanner when no tag exists.
pub const UNKNOWN_ALBUM: &str = "Unknown Album";

/// A playable track and the metadata the shuffle weights look at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Path of the file; doubles as the identifier.
    pub id: TrackId,
    pub title: String,
    pub artist: String,
    pub album: String,
    /// Length in seconds, 0.0 when unknown.
    #[serde(default)]
    pub duration: f64,
}

impl Track {
    /// Track with unknown artist and album; the title is the file stem.
    #[must_use]
    pub fn new(id: impl Into<TrackId>) -> Self {
        let id = id.into();
        let title = std::path::Path::new(&id)
            .file_stem()
            .map_or_else(|| id.clone(), |stem| stem.to_string_lossy().into_owned());
        Self {
            id,
            title,
            artist: UNKNOWN_ARTIST.to_string(),
            album: UNKNOWN_ALBUM.to_string(),
            duration: 0.0,
        }
    }

    #[must_use]
    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = artist.into();
        self
    }

    #[must_use]
    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = album.into();
        self
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    #[must_use]
    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration = seconds;
        self
    }

    /// True when both tracks carry the same real artist tag.
    ///
    /// Sentinels and empty tags never match.
    #[must_use]
    pub fn same_artist(&self, other: &Track) -> bool {
        is_known(&self.artist, UNKNOWN_ARTIST)
            && self.artist.trim().eq_ignore_ascii_case(other.artist.trim())
    }

    /// Album counterpart of [`Track::same_artist`].
    #[must_use]
    pub fn same_album(&self, other: &Track) -> bool {
        is_known(&self.album, UNKNOWN_ALBUM)
            && self.album.trim().eq_ignore_ascii_case(other.album.trim())
    }

    /// Parses one playlist line: `path[\tartist[\talbum[\tduration]]]`.
    ///
    /// Blank lines and `#` comments yield `None`.
    #[must_use]
    pub fn from_playlist_line(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(&['\r', '\n'][..]);
        if line.trim().is_empty() || line.trim_start().starts_with('#') {
            return None;
        }

        let mut fields = line.split('\t');
        let mut track = Self::new(fields.next()?.trim());
        if let Some(artist) = fields.next().map(str::trim).filter(|s| !s.is_empty()) {
            track.artist = artist.to_string();
        }
        if let Some(album) = fields.next().map(str::trim).filter(|s| !s.is_empty()) {
            track.album = album.to_string();
        }
        if let Some(duration) = fields.next().and_then(|s| s.trim().parse::<f64>().ok()) {
            track.duration = duration.max(0.0);
        }
        Some(track)
    }
}

fn is_known(tag: &str, sentinel: &str) -> bool {
    let tag = tag.trim();
    !tag.is_empty() && !tag.eq_ignore_ascii_case(sentinel)
}

/// An entry of the effective queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub queue_id: QueueId,
    pub track: Track,
    /// Inserted through "play next"; re-shuffles leave it in place.
    pub is_priority: bool,
    /// Index in the effective queue, kept in sync on every edit.
    pub position: usize,
}
