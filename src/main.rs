//! # Museq - Play Queue & Weighted Shuffle
//!
//! Command-line front end for the `museq` library. It records listening
//! signals, edits the persisted shuffle configuration and prints shuffled
//! queues for playlist files.
//!
//! ## Usage
//!
//! ```bash
//! # Record what happened to a track
//! museq record /music/a.flac complete
//!
//! # Pick a personality
//! museq personality explorer
//!
//! # Shuffle a playlist file with a fixed seed
//! museq shuffle road-trip.tsv --restricted --seed 7 --explain
//! ```

mod cli;
mod completion;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use log::{debug, info, warn};
use rand::{rngs::StdRng, SeedableRng};
use std::fs;
use std::path::Path;

use museq::algorithm::WeightCalculator;
use museq::config::{get_db_path, RuntimeConfig};
use museq::db::{PlaybackEvent, SqliteSignalStore};
use museq::merge::{MergeGroups, VirtualItem};
use museq::queue::{QueueEngine, QueueSnapshot};
use museq::shuffle::{unix_now, ShuffleConfig, ShuffleState};
use museq::signals::SignalSnapshot;
use museq::store::{JsonStateStore, StateStore};
use museq::track::Track;

/// Main entry point for museq.
///
/// Logging is controlled via `RUST_LOG`:
/// - `RUST_LOG=debug museq shuffle list.tsv` - queue decisions
/// - `RUST_LOG=museq::algorithm=trace museq weights list.tsv` - every weight stage
fn main() -> Result<()> {
    env_logger::init();

    let args = cli::Args::parse();

    match args.command {
        cli::Command::Completion { shell } => {
            let mut cmd = cli::Args::command();
            completion::generate_completions(completion::shell_to_completion_shell(shell), &mut cmd);
            return Ok(());
        }
        cli::Command::CompleteTracks => {
            let db_path = match args.db {
                Some(path) => path,
                None => get_db_path()?,
            };
            completion::print_track_completions(&db_path);
            return Ok(());
        }
        command => {
            let runtime = RuntimeConfig::resolve(args.db, args.state_dir)?;
            debug!("Using database {} and state {}", runtime.db_path.display(), runtime.state_dir.display());
            run(command, &runtime)?;
        }
    }

    Ok(())
}

fn run(command: cli::Command, runtime: &RuntimeConfig) -> Result<()> {
    match command {
        cli::Command::Record { track, kind, listened, duration } => {
            let store = SqliteSignalStore::open(&runtime.db_path)?;
            let event = PlaybackEvent {
                track_id: track.clone(),
                kind: kind.into(),
                listened,
                duration,
                timestamp: unix_now(),
            };
            let stored = store.record_event(&event)?;
            println!("Recorded {} for {track}", stored.as_str());
        }
        cli::Command::Love { track } => {
            SqliteSignalStore::open(&runtime.db_path)?.set_favorite(&track, true)?;
            println!("Loved {track}");
        }
        cli::Command::Unlove { track } => {
            SqliteSignalStore::open(&runtime.db_path)?.set_favorite(&track, false)?;
            println!("Unloved {track}");
        }
        cli::Command::SuggestLess { track, undo } => {
            SqliteSignalStore::open(&runtime.db_path)?.set_suggest_less(&track, !undo)?;
            println!("{} {track}", if undo { "Cleared suggest-less for" } else { "Suggesting less of" });
        }
        cli::Command::Hide { track, undo } => {
            SqliteSignalStore::open(&runtime.db_path)?.set_hidden(&track, !undo)?;
            println!("{} {track}", if undo { "Unhid" } else { "Hid" });
        }
        cli::Command::Group { track, group } => {
            let store = SqliteSignalStore::open(&runtime.db_path)?;
            match group {
                Some(group) => {
                    store.assign_group(&track, &group)?;
                    println!("{track} is now in group {group}");
                }
                None => {
                    store.unassign_group(&track)?;
                    println!("{track} is no longer grouped");
                }
            }
        }
        cli::Command::Playlist { name, file } => {
            let tracks = read_playlist(&file)?;
            let ids: Vec<String> = tracks.into_iter().map(|t| t.id).collect();
            let mut store = SqliteSignalStore::open(&runtime.db_path)?;
            store.set_playlist(&name, &ids)?;
            println!("Stored playlist {name} with {} tracks", ids.len());
        }
        cli::Command::Personality { personality } => {
            let state = update_config(runtime, |config| config.personality = personality.into())?;
            println!("Shuffle personality: {}", state.config.personality);
        }
        cli::Command::Custom {
            least_played,
            most_played,
            favorites,
            suggest_less,
            avoid_artist_repeat,
            avoid_album_repeat,
            avoid_song_repeat,
        } => {
            let state = update_config(runtime, |config| {
                let custom = &mut config.custom;
                if let Some(w) = least_played {
                    custom.least_played = w;
                }
                if let Some(w) = most_played {
                    custom.most_played = w;
                }
                if let Some(w) = favorites {
                    custom.favorites = w;
                }
                if let Some(w) = suggest_less {
                    custom.suggest_less = w;
                }
                if let Some(on) = avoid_artist_repeat {
                    custom.avoid_artist_repeat = on;
                }
                if let Some(on) = avoid_album_repeat {
                    custom.avoid_album_repeat = on;
                }
                if let Some(on) = avoid_song_repeat {
                    custom.avoid_song_repeat = on;
                }
            })?;
            print_json(&state.config.custom)?;
        }
        cli::Command::Config { history_limit, anchors, clear_anchors, enabled } => {
            let state = update_config(runtime, |config| {
                if let Some(limit) = history_limit {
                    config.history_limit = limit;
                }
                if clear_anchors {
                    config.anchor_playlists.clear();
                }
                for anchor in anchors {
                    if !config.anchor_playlists.contains(&anchor) {
                        config.anchor_playlists.push(anchor);
                    }
                }
                if let Some(on) = enabled {
                    config.enabled = on;
                }
            })?;
            print_json(&state.config)?;
        }
        cli::Command::Shuffle { file, restricted, explain, seed, start, length } => {
            shuffle_playlist(runtime, &file, restricted, explain, seed, start, length)?;
        }
        cli::Command::Weights { file, after } => {
            print_weights(runtime, &file, after)?;
        }
        cli::Command::Completion { .. } | cli::Command::CompleteTracks => {}
    }

    Ok(())
}

/// Reads a playlist file; see [`Track::from_playlist_line`] for the format.
fn read_playlist(path: &Path) -> Result<Vec<Track>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read playlist {}", path.display()))?;
    let tracks: Vec<Track> = contents.lines().filter_map(Track::from_playlist_line).collect();
    if tracks.is_empty() {
        anyhow::bail!("Playlist {} contains no tracks", path.display());
    }
    info!("Read {} tracks from {}", tracks.len(), path.display());
    Ok(tracks)
}

/// Persisted shuffle state; unreadable state falls back to defaults.
fn load_state(store: &JsonStateStore) -> ShuffleState {
    store
        .load_shuffle_state()
        .unwrap_or_else(|e| {
            warn!("Ignoring unreadable shuffle state: {e:#}");
            None
        })
        .unwrap_or_default()
}

fn update_config(runtime: &RuntimeConfig, edit: impl FnOnce(&mut ShuffleConfig)) -> Result<ShuffleState> {
    let store = JsonStateStore::open(&runtime.state_dir)?;
    let mut state = load_state(&store);
    let mut config = state.config.clone();
    edit(&mut config);
    state.update(config);
    store.save_shuffle_state(&state).context("Failed to save shuffle state")?;
    Ok(state)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).context("Failed to serialize output")?);
    Ok(())
}

/// Everything a weight computation over a playlist file needs.
struct WeighingContext {
    tracks: Vec<Track>,
    config: ShuffleConfig,
    groups: MergeGroups,
    signals: SignalSnapshot,
    store: SqliteSignalStore,
}

impl WeighingContext {
    fn load(runtime: &RuntimeConfig, file: &Path) -> Result<Self> {
        let tracks = read_playlist(file)?;
        let store = SqliteSignalStore::open(&runtime.db_path)?;
        let groups = store.load_merge_groups()?;
        let config = load_state(&JsonStateStore::open(&runtime.state_dir)?).config;
        let signals = SignalSnapshot::capture(
            &store,
            &groups.with_mates(&tracks),
            config.history_limit,
            &config.anchor_playlists,
        );
        Ok(Self {
            tracks,
            config,
            groups,
            signals,
            store,
        })
    }

    fn find(&self, id: &str) -> Track {
        self.tracks
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .unwrap_or_else(|| Track::new(id))
    }
}

fn shuffle_playlist(
    runtime: &RuntimeConfig,
    file: &Path,
    restricted: bool,
    explain: bool,
    seed: Option<u64>,
    start: Option<String>,
    length: usize,
) -> Result<()> {
    let context = WeighingContext::load(runtime, file)?;
    let start = match start {
        Some(id) => context.find(&id),
        None => context.tracks[0].clone(),
    };
    let rng = seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);

    let WeighingContext { tracks, config, groups, signals, store } = context;
    let mut engine = QueueEngine::new(Box::new(store))
        .with_rng(rng)
        .with_merge_groups(groups.clone())
        .with_config(config.clone());

    engine.enable_shuffle();
    let snapshot = if restricted {
        engine.play_now(start, Some(tracks.clone()))
    } else {
        engine.set_library(tracks.clone());
        let snapshot = engine.play_now(start, None);
        grow(&mut engine, snapshot, length)?
    };

    let pool = groups.partition(tracks);
    let calc = WeightCalculator::new(&config, &signals, &groups, &pool);
    let mut previous: Option<&Track> = None;

    for item in &snapshot.items {
        if explain {
            let unit = pool
                .iter()
                .find(|unit| unit.contains(&item.track.id))
                .cloned()
                .unwrap_or_else(|| VirtualItem::Standalone(item.track.clone()));
            println!("{:>3}. {}  {}", item.position + 1, calc.explain(&unit, previous), item.track.id);
        } else {
            println!("{:>3}. {} - {}  ({})", item.position + 1, item.track.artist, item.track.title, item.track.id);
        }
        previous = Some(&item.track);
    }

    Ok(())
}

/// Advances through a shuffled queue until it holds `length` items or the
/// library runs dry.
fn grow(engine: &mut QueueEngine, mut snapshot: QueueSnapshot, length: usize) -> Result<QueueSnapshot> {
    while snapshot.items.len() < length {
        let next = engine.advance()?;
        let exhausted = next.current_index.map_or(true, |i| i + 1 >= next.items.len());
        snapshot = next;
        if exhausted {
            break;
        }
    }
    Ok(snapshot)
}

fn print_weights(runtime: &RuntimeConfig, file: &Path, after: Option<String>) -> Result<()> {
    let context = WeighingContext::load(runtime, file)?;
    let previous = after.map(|id| context.find(&id));

    let pool = context.groups.partition(context.tracks.clone());
    let calc = WeightCalculator::new(&context.config, &context.signals, &context.groups, &pool);

    let mut rows: Vec<_> = pool
        .iter()
        .map(|unit| (calc.explain(unit, previous.as_ref()), unit))
        .collect();
    rows.sort_by(|a, b| b.0.total.total_cmp(&a.0.total));

    println!("Personality: {}", context.config.personality);
    for (breakdown, unit) in rows {
        let label = match unit.group_id() {
            Some(group) => format!("[{group}] {}", unit.representative().id),
            None => unit.representative().id.clone(),
        };
        println!("{breakdown}  {label}");
    }

    Ok(())
}
