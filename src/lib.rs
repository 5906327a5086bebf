//! Play queue and weighted shuffle engine that learns from listening habits.
//!
//! Core modules:
//! - [`queue`] - Original and effective queue, shuffle toggling, auto-extension
//! - [`algorithm`] - Per-track shuffle weights
//! - [`sampler`] - Weighted sampling without replacement
//! - [`signals`] - Listening signals (plays, skips, favorites) behind a trait
//! - [`db`] - SQLite signal store
//!
//! ### Supporting Modules
//!
//! - [`track`] - Tracks and queue items
//! - [`merge`] - Merge groups of alternate recordings
//! - [`shuffle`] - Personalities, custom weights and persisted shuffle state
//! - [`store`] - JSON and in-memory persistence of state and queue
//! - [`config`] - Data directory management
//! - [`error`] - Engine error kinds
//!
//! ## Quick Start Example
//!
//! ```no_run
//! use museq::db::SqliteSignalStore;
//! use museq::queue::QueueEngine;
//! use museq::track::Track;
//! use anyhow::Result;
//!
//! let store = SqliteSignalStore::open(museq::config::get_db_path()?)?;
//! store.set_favorite("/music/b.flac", true)?;
//!
//! let playlist = vec![
//!     Track::new("/music/a.flac").with_artist("Low"),
//!     Track::new("/music/b.flac").with_artist("Low"),
//!     Track::new("/music/c.flac").with_artist("Broadcast"),
//! ];
//!
//! let mut engine = QueueEngine::new(Box::new(store));
//! engine.play_now(playlist[0].clone(), Some(playlist));
//! let snapshot = engine.enable_shuffle();
//! for item in snapshot.upcoming() {
//!     println!("{}", item.track.id);
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## Shuffle Weights
//!
//! Every candidate starts at 1.0 and is multiplied through recency, skip,
//! play-count, repetition and preference stages. The shape of the
//! play-count and preference stages depends on the [`shuffle::Personality`]:
//!
//! - **Explorer**: unplayed and rarely played tracks come first
//! - **Consistent**: familiar tracks and anchor playlists, gentler recency
//! - **Default**: mild favorite boost, no play-count shaping
//! - **Custom**: user-chosen weights from -99 to 99
//!
//! ## Error Handling
//!
//! Queue operations return [`error::EngineError`] for caller mistakes (bad
//! index, nothing playing). Store and database functions return
//! `anyhow::Result`. Signal lookups that fail inside the engine are logged
//! and treated as neutral.

pub mod algorithm;
pub mod config;
pub mod db;
pub mod error;
pub mod merge;
pub mod queue;
pub mod sampler;
pub mod shuffle;
pub mod signals;
pub mod store;
pub mod track;
