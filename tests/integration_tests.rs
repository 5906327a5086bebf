//! # Integration Tests for Museq
//!
//! End-to-end tests across the public modules: the SQLite signal store
//! feeding the queue engine, JSON persistence and restore, and the `museq`
//! binary driven from the command line.

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

use museq::db::{PlaybackEvent, SqliteSignalStore};
use museq::signals::EventKind;
use museq::track::Track;

/// Test helper: a playlist of `n` tracks spread over three artists.
fn sample_tracks(n: usize) -> Vec<Track> {
    (0..n)
        .map(|i| {
            Track::new(format!("/music/{i:02}.flac"))
                .with_artist(format!("Artist {}", i % 3))
                .with_album(format!("Album {}", i % 5))
                .with_duration(200.0)
        })
        .collect()
}

/// Test helper: a signal database in a fresh temporary directory.
fn create_test_database() -> Result<(TempDir, PathBuf)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("signals.db");
    SqliteSignalStore::open(&db_path)?;
    Ok((temp_dir, db_path))
}

fn event(track_id: &str, kind: EventKind, listened: f64, timestamp: i64) -> PlaybackEvent {
    PlaybackEvent {
        track_id: track_id.to_string(),
        kind,
        listened,
        duration: 200.0,
        timestamp,
    }
}

fn ids(items: &[museq::track::QueueItem]) -> Vec<String> {
    items.iter().map(|item| item.track.id.clone()).collect()
}

#[cfg(test)]
mod cli_tests {
    use super::*;

    fn museq(dir: &Path, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_museq"))
            .arg("--db")
            .arg(dir.join("signals.db"))
            .arg("--state-dir")
            .arg(dir.join("state"))
            .args(args)
            .env_remove("RUST_LOG")
            .output()
            .expect("Failed to run museq")
    }

    fn write_playlist(dir: &Path) -> PathBuf {
        let path = dir.join("list.tsv");
        let contents = "# road trip\n\
                        /m/a.flac\tLow\tThings We Lost\t200\n\
                        /m/b.flac\tLow\tC'mon\t180\n\
                        \n\
                        /m/c.flac\tBroadcast\tTender Buttons\t150\n\
                        /m/d.flac\tStereolab\tDots and Loops\t320\n";
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_cli_help_displays_correctly() {
        let output = Command::new(env!("CARGO_BIN_EXE_museq"))
            .arg("--help")
            .output()
            .expect("Failed to run help command");

        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("museq"));
        assert!(stdout.contains("record"));
        assert!(stdout.contains("shuffle"));
        assert!(stdout.contains("personality"));
        assert!(!stdout.contains("complete-tracks"));
    }

    #[test]
    fn test_cli_version_flag() {
        let output = Command::new(env!("CARGO_BIN_EXE_museq"))
            .arg("--version")
            .output()
            .expect("Failed to run version command");

        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("museq"));
        assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn test_completion_generation() {
        let output = Command::new(env!("CARGO_BIN_EXE_museq"))
            .args(["completion", "bash"])
            .output()
            .expect("Failed to run completion command");

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("_museq"));
        assert!(stdout.contains("complete"));
    }

    #[test]
    fn test_late_skip_recorded_as_complete() {
        let dir = TempDir::new().unwrap();
        let output = museq(dir.path(), &["record", "/m/a.flac", "skip", "--listened", "235", "--duration", "240"]);

        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "Recorded complete for /m/a.flac");
    }

    #[test]
    fn test_personality_is_persisted() {
        let dir = TempDir::new().unwrap();
        let output = museq(dir.path(), &["personality", "explorer"]);
        assert!(output.status.success());

        let state = fs::read_to_string(dir.path().join("state").join("shuffle_state.json")).unwrap();
        assert!(state.contains("\"explorer\""));
    }

    #[test]
    fn test_restricted_shuffle_prints_every_track_once() {
        let dir = TempDir::new().unwrap();
        let playlist = write_playlist(dir.path());

        let output = museq(dir.path(), &["shuffle", playlist.to_str().unwrap(), "--restricted", "--seed", "7"]);
        assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

        let stdout = String::from_utf8_lossy(&output.stdout);
        let lines: Vec<&str> = stdout.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].contains("(/m/a.flac)"), "Start track comes first: {}", lines[0]);
        for id in ["/m/a.flac", "/m/b.flac", "/m/c.flac", "/m/d.flac"] {
            let needle = format!("({id})");
            assert_eq!(lines.iter().filter(|l| l.contains(&needle)).count(), 1);
        }
    }

    #[test]
    fn test_seeded_shuffle_is_reproducible() {
        let dir = TempDir::new().unwrap();
        let playlist = write_playlist(dir.path());
        let args = ["shuffle", playlist.to_str().unwrap(), "--restricted", "--seed", "42"];

        let first = museq(dir.path(), &args);
        let second = museq(dir.path(), &args);
        assert_eq!(first.stdout, second.stdout);
    }

    #[test]
    fn test_empty_playlist_fails() {
        let dir = TempDir::new().unwrap();
        let playlist = dir.path().join("empty.tsv");
        fs::write(&playlist, "# nothing here\n").unwrap();

        let output = museq(dir.path(), &["shuffle", playlist.to_str().unwrap()]);
        assert!(!output.status.success());
    }
}

#[cfg(test)]
mod database_integration_tests {
    use super::*;
    use museq::signals::SignalSnapshot;

    #[test]
    fn test_recorded_events_reach_the_snapshot() -> Result<()> {
        let (_temp_dir, db_path) = create_test_database()?;
        let store = SqliteSignalStore::open(&db_path)?;

        store.record_event(&event("/m/a.flac", EventKind::Listen, 200.0, 1))?;
        store.record_event(&event("/m/a.flac", EventKind::Skip, 195.0, 2))?;
        store.record_event(&event("/m/b.flac", EventKind::Skip, 10.0, 3))?;
        store.set_favorite("/m/a.flac", true)?;

        let tracks = vec![Track::new("/m/a.flac"), Track::new("/m/b.flac")];
        let snapshot = SignalSnapshot::capture(&store, &tracks, 50, &[]);

        assert_eq!(snapshot.play_count("/m/a.flac"), 2);
        assert_eq!(snapshot.play_count("/m/b.flac"), 0);
        assert_eq!(snapshot.skips("/m/b.flac").count, 1);
        assert!((snapshot.skips("/m/b.flac").avg_ratio - 0.05).abs() < 1e-9);
        assert!(snapshot.is_favorite("/m/a.flac"));
        assert_eq!(snapshot.history.first().map(|e| e.track_id.as_str()), Some("/m/b.flac"));

        Ok(())
    }

    #[test]
    fn test_signals_survive_reopen() -> Result<()> {
        let (_temp_dir, db_path) = create_test_database()?;
        {
            let mut store = SqliteSignalStore::open(&db_path)?;
            store.set_suggest_less("/m/x.flac", true)?;
            store.set_playlist("anchors", &["/m/y.flac".to_string()])?;
            store.assign_group("/m/y.flac", "song")?;
        }

        let store = SqliteSignalStore::open(&db_path)?;
        let tracks = vec![Track::new("/m/x.flac"), Track::new("/m/y.flac")];
        let snapshot = SignalSnapshot::capture(&store, &tracks, 50, &["anchors".to_string()]);

        assert!(snapshot.is_suggest_less("/m/x.flac"));
        assert!(snapshot.is_anchored("/m/y.flac"));
        assert_eq!(store.load_merge_groups()?.group_of("/m/y.flac").map(String::as_str), Some("song"));
        Ok(())
    }
}

#[cfg(test)]
mod queue_integration_tests {
    use super::*;
    use museq::queue::{QueueEngine, QueueMode};
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_shuffled_playlist_is_a_permutation() -> Result<()> {
        let store = SqliteSignalStore::open_in_memory()?;
        let tracks = sample_tracks(12);

        let mut engine = QueueEngine::new(Box::new(store)).with_rng(StdRng::seed_from_u64(3));
        engine.play_now(tracks[0].clone(), Some(tracks.clone()));
        let snapshot = engine.enable_shuffle();

        assert_eq!(snapshot.mode(), QueueMode::Shuffled);
        assert_eq!(snapshot.items[0].track.id, tracks[0].id);

        let mut shuffled = ids(&snapshot.items);
        let mut expected: Vec<String> = tracks.iter().map(|t| t.id.clone()).collect();
        shuffled.sort();
        expected.sort();
        assert_eq!(shuffled, expected);

        let linear = engine.disable_shuffle();
        assert_eq!(ids(&linear.items), tracks.iter().map(|t| t.id.clone()).collect::<Vec<_>>());
        Ok(())
    }

    #[test]
    fn test_merge_group_takes_one_slot() -> Result<()> {
        let store = SqliteSignalStore::open_in_memory()?;
        store.assign_group("/m/live.flac", "song")?;
        store.assign_group("/m/studio.flac", "song")?;
        let groups = store.load_merge_groups()?;

        let mut playlist = sample_tracks(4);
        playlist.push(Track::new("/m/live.flac"));
        playlist.push(Track::new("/m/studio.flac"));

        let mut engine = QueueEngine::new(Box::new(store))
            .with_rng(StdRng::seed_from_u64(11))
            .with_merge_groups(groups);
        engine.enable_shuffle();
        let snapshot = engine.play_now(playlist[0].clone(), Some(playlist));

        let members = snapshot
            .items
            .iter()
            .filter(|item| item.track.id == "/m/live.flac" || item.track.id == "/m/studio.flac")
            .count();
        assert_eq!(members, 1);
        assert_eq!(snapshot.items.len(), 5);
        Ok(())
    }

    #[test]
    fn test_library_extension_skips_hidden_tracks() -> Result<()> {
        let store = SqliteSignalStore::open_in_memory()?;
        let library = sample_tracks(14);
        store.set_hidden(&library[13].id, true)?;

        let mut engine = QueueEngine::new(Box::new(store))
            .with_rng(StdRng::seed_from_u64(5))
            .with_library(library.clone());
        engine.enable_shuffle();
        engine.play_now(library[0].clone(), None);

        for _ in 0..40 {
            engine.advance()?;
        }

        let snapshot = engine.snapshot();
        assert!(snapshot.upcoming().len() >= 2);
        assert!(snapshot.items.iter().all(|item| item.track.id != library[13].id));
        Ok(())
    }

    #[test]
    fn test_play_next_survives_shuffle_toggle() -> Result<()> {
        let store = SqliteSignalStore::open_in_memory()?;
        let tracks = sample_tracks(6);
        let extra = Track::new("/m/requested.flac");

        let mut engine = QueueEngine::new(Box::new(store)).with_rng(StdRng::seed_from_u64(9));
        engine.play_now(tracks[0].clone(), Some(tracks));
        engine.play_next(extra.clone());

        let shuffled = engine.enable_shuffle();
        assert_eq!(shuffled.items[1].track.id, extra.id);
        assert!(shuffled.items[1].is_priority);

        let linear = engine.disable_shuffle();
        assert_eq!(linear.items[1].track.id, extra.id);
        Ok(())
    }
}

#[cfg(test)]
mod persistence_integration_tests {
    use super::*;
    use museq::queue::QueueEngine;
    use museq::shuffle::Personality;
    use museq::signals::MemorySignalStore;
    use museq::store::{JsonStateStore, QUEUE_FILE, SHUFFLE_STATE_FILE};
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_restore_round_trip() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let tracks = sample_tracks(8);

        let mut first = QueueEngine::new(Box::new(SqliteSignalStore::open_in_memory()?))
            .with_rng(StdRng::seed_from_u64(1))
            .with_state_store(Box::new(JsonStateStore::open(temp_dir.path())?));
        let mut config = first.config().clone();
        config.personality = Personality::Explorer;
        first.set_config(config);
        first.play_now(tracks[2].clone(), Some(tracks.clone()));
        first.enable_shuffle();
        first.advance()?;
        let saved = first.snapshot();
        drop(first);

        let mut second = QueueEngine::new(Box::new(MemorySignalStore::new()))
            .with_state_store(Box::new(JsonStateStore::open(temp_dir.path())?));
        let restored = second.restore();

        assert_eq!(restored.items, saved.items);
        assert_eq!(restored.current_index, saved.current_index);
        assert_eq!(restored.current().map(|i| i.track.id.as_str()), saved.items.get(3).map(|i| i.track.id.as_str()));
        assert!(restored.shuffle_enabled);
        assert!(restored.restricted);
        assert_eq!(second.config().personality, Personality::Explorer);
        assert_eq!(second.original_queue(), tracks.as_slice());
        Ok(())
    }

    #[test]
    fn test_malformed_state_falls_back_to_defaults() -> Result<()> {
        let temp_dir = TempDir::new()?;
        fs::write(temp_dir.path().join(SHUFFLE_STATE_FILE), "{ not json")?;
        fs::write(temp_dir.path().join(QUEUE_FILE), "[1, 2,")?;

        let mut engine = QueueEngine::new(Box::new(MemorySignalStore::new()))
            .with_state_store(Box::new(JsonStateStore::open(temp_dir.path())?));
        let restored = engine.restore();

        assert!(restored.items.is_empty());
        assert_eq!(restored.current_index, None);
        assert!(!restored.shuffle_enabled);
        assert_eq!(engine.config().personality, Personality::Default);
        Ok(())
    }

    #[test]
    fn test_missing_state_restores_empty() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let mut engine = QueueEngine::new(Box::new(MemorySignalStore::new()))
            .with_state_store(Box::new(JsonStateStore::open(temp_dir.path().join("fresh"))?));

        let restored = engine.restore();
        assert!(restored.items.is_empty());
        assert!(engine.advance().is_err());
        Ok(())
    }
}

#[cfg(test)]
mod configuration_tests {
    use super::*;
    use museq::config;

    #[test]
    fn test_database_path_generation() -> Result<()> {
        let db_path = config::get_db_path()?;

        assert!(db_path.is_absolute());
        assert!(db_path.to_string_lossy().ends_with("signals.db"));
        assert!(db_path.parent().is_some());

        Ok(())
    }

    #[test]
    fn test_runtime_config_creation() -> Result<()> {
        let config = config::RuntimeConfig::new()?;
        assert!(config.db_path.is_absolute());
        assert!(config.state_dir.is_dir());

        let explicit = config::RuntimeConfig::with_paths(PathBuf::from("/tmp/test.db"), PathBuf::from("/tmp/state"));
        assert_eq!(explicit.db_path, PathBuf::from("/tmp/test.db"));

        Ok(())
    }
}
