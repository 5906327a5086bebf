//! # Museq Performance Benchmarks
//!
//! Benchmarks for the hot paths of the shuffle engine.
//!
//! ## Benchmark Categories
//!
//! - **Weights**: Single weight and breakdown computation
//! - **Shuffle**: Full weighted shuffle of playlists of growing size
//! - **Queue**: Engine operations that sample (enable shuffle, advance with extension)
//! - **Database**: Signal snapshot capture from SQLite
//!
//! ## Running Benchmarks
//!
//! ```bash
//! # Run all benchmarks
//! cargo bench
//!
//! # Run specific benchmark group
//! cargo bench weights
//! cargo bench shuffle
//! ```

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use rand::{rngs::StdRng, SeedableRng};
use std::hint::black_box;

use museq::algorithm::WeightCalculator;
use museq::db::{PlaybackEvent, SqliteSignalStore};
use museq::merge::MergeGroups;
use museq::queue::QueueEngine;
use museq::sampler::weighted_shuffle;
use museq::shuffle::{Personality, ShuffleConfig};
use museq::signals::{EventKind, MemorySignalStore, SignalSnapshot};
use museq::track::Track;

/// Tracks spread over artists and albums, with every tenth one in a merge
/// group with its neighbour.
fn create_test_tracks(count: usize) -> (Vec<Track>, MergeGroups) {
    let tracks: Vec<Track> = (1..=count)
        .map(|i| {
            Track::new(format!("/music/test/song{i:04}.flac"))
                .with_artist(format!("Artist {}", (i - 1) / 20 + 1))
                .with_album(format!("Album {}", (i - 1) / 10 + 1))
                .with_duration(240.0)
        })
        .collect();

    let mut groups = MergeGroups::new();
    for pair in tracks.chunks(2).step_by(5) {
        if let [a, b] = pair {
            groups.assign(a.id.clone(), format!("group-{}", a.id));
            groups.assign(b.id.clone(), format!("group-{}", a.id));
        }
    }
    (tracks, groups)
}

/// Signal store with a realistic mix of plays, skips and preferences.
fn create_signal_store(tracks: &[Track]) -> MemorySignalStore {
    let mut store = MemorySignalStore::new();
    for (i, track) in tracks.iter().enumerate() {
        for play in 0..(i % 7) {
            store.record(&track.id, EventKind::Complete, 1.0, (i * 10 + play) as i64);
        }
        if i % 4 == 0 {
            store.record(&track.id, EventKind::Skip, 0.1, (i * 10 + 9) as i64);
        }
        if i % 20 == 0 {
            store.favorites.insert(track.id.clone());
        }
        if i % 33 == 0 {
            store.suggest_less.insert(track.id.clone());
        }
    }
    store
}

fn benchmark_weights(c: &mut Criterion) {
    let mut group = c.benchmark_group("weights");
    let (tracks, groups) = create_test_tracks(500);
    let store = create_signal_store(&tracks);

    for personality in [Personality::Default, Personality::Explorer, Personality::Consistent] {
        let config = ShuffleConfig {
            personality,
            ..ShuffleConfig::default()
        };
        let signals = SignalSnapshot::capture(&store, &tracks, config.history_limit, &[]);
        let pool = groups.partition(tracks.clone());
        let calc = WeightCalculator::new(&config, &signals, &groups, &pool);
        let previous = tracks[3].clone();

        group.bench_function(BenchmarkId::new("weight_pool_500", personality.as_str()), |b| {
            b.iter(|| {
                pool.iter()
                    .map(|item| calc.weight(black_box(item), Some(&previous)))
                    .sum::<f64>()
            })
        });
    }

    let config = ShuffleConfig::default();
    let signals = SignalSnapshot::capture(&store, &tracks, config.history_limit, &[]);
    let pool = groups.partition(tracks.clone());
    let calc = WeightCalculator::new(&config, &signals, &groups, &pool);
    group.bench_function("explain_single", |b| {
        b.iter(|| calc.explain(black_box(&pool[42]), Some(&tracks[41])))
    });

    group.finish();
}

fn benchmark_shuffle(c: &mut Criterion) {
    let mut group = c.benchmark_group("shuffle");

    for size in [10, 50, 100, 500] {
        let (tracks, groups) = create_test_tracks(size);
        let store = create_signal_store(&tracks);
        let config = ShuffleConfig::default();
        let signals = SignalSnapshot::capture(&store, &tracks, config.history_limit, &[]);
        let pool = groups.partition(tracks.clone());
        let calc = WeightCalculator::new(&config, &signals, &groups, &pool);
        let mut rng = StdRng::seed_from_u64(7);

        group.bench_with_input(BenchmarkId::new("weighted_shuffle", size), &pool, |b, pool| {
            b.iter_batched(
                || pool.clone(),
                |items| weighted_shuffle(&calc, black_box(items), None, &mut rng),
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn benchmark_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue");
    let (tracks, groups) = create_test_tracks(200);

    group.bench_function("enable_shuffle_200", |b| {
        b.iter_batched(
            || {
                let mut engine = QueueEngine::new(Box::new(create_signal_store(&tracks)))
                    .with_rng(StdRng::seed_from_u64(1))
                    .with_merge_groups(groups.clone());
                engine.play_now(tracks[0].clone(), Some(tracks.clone()));
                engine
            },
            |mut engine| engine.enable_shuffle(),
            BatchSize::SmallInput,
        )
    });

    group.bench_function("advance_with_extension", |b| {
        b.iter_batched(
            || {
                let mut engine = QueueEngine::new(Box::new(create_signal_store(&tracks)))
                    .with_rng(StdRng::seed_from_u64(2))
                    .with_merge_groups(groups.clone())
                    .with_library(tracks.clone());
                engine.enable_shuffle();
                engine.play_now(tracks[0].clone(), None);
                engine
            },
            |mut engine| {
                for _ in 0..10 {
                    let _ = engine.advance();
                }
                engine
            },
            BatchSize::SmallInput,
        )
    });

    group.finish();
}

fn benchmark_database(c: &mut Criterion) {
    let mut group = c.benchmark_group("database");
    let (tracks, _) = create_test_tracks(500);

    let store = SqliteSignalStore::open_in_memory().expect("Failed to open database");
    for (i, track) in tracks.iter().enumerate() {
        let event = PlaybackEvent {
            track_id: track.id.clone(),
            kind: if i % 4 == 0 { EventKind::Skip } else { EventKind::Complete },
            listened: 30.0,
            duration: 240.0,
            timestamp: i as i64,
        };
        store.record_event(&event).expect("Failed to record event");
        if i % 20 == 0 {
            store.set_favorite(&track.id, true).expect("Failed to set favorite");
        }
    }

    group.bench_function("capture_snapshot_500", |b| {
        b.iter(|| SignalSnapshot::capture(&store, black_box(&tracks), 50, &[]))
    });

    group.finish();
}

// Group all benchmarks
criterion_group!(benches, benchmark_weights, benchmark_shuffle, benchmark_queue, benchmark_database);

criterion_main!(benches);
