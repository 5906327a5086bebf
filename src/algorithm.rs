//! Shuffle weight calculation.
//!
//! Every candidate starts at 1.0 and passes through five multiplicative
//! stages, in this order:
//!
//! 1. recency penalty from the play history
//! 2. chronic skip penalty
//! 3. personality-specific play-count shaping
//! 4. artist/album/same-song repetition avoidance against the previous pick
//! 5. favorite and suggest-less preferences
//!
//! Later stages assume earlier ones already discounted recently heard
//! tracks. The final weight never drops below [`MIN_WEIGHT`].
//!
//! The piecewise constants are literal tables rather than fitted curves.

use log::trace;
use std::fmt;

use crate::merge::{MergeGroups, VirtualItem};
use crate::shuffle::{weight_multiplier, Personality, ShuffleConfig};
use crate::signals::{EventKind, SignalSnapshot};
use crate::track::Track;

/// Smallest weight a candidate can end up with.
pub const MIN_WEIGHT: f64 = 1e-4;

/// Recency penalty by history position: `(last position, penalty)`.
static STANDARD_RECENCY: [(usize, f64); 10] = [
    (2, 0.95),
    (5, 0.90),
    (10, 0.80),
    (20, 0.65),
    (35, 0.50),
    (50, 0.38),
    (75, 0.25),
    (100, 0.15),
    (150, 0.07),
    (199, 0.03),
];

/// The `consistent` personality only minds the last few plays.
static GENTLE_RECENCY: [(usize, f64); 3] = [(2, 0.80), (5, 0.60), (10, 0.40)];

/// Scale of the recency penalty by heard fraction: `(max ratio, scale)`.
const PLAY_RATIO_SCALE: [(f64, f64); 4] = [(0.10, 0.2), (0.25, 0.4), (0.50, 0.7), (0.80, 0.9)];

const SKIP_MIN_COUNT: u32 = 3;
const SKIP_MAX_RATIO: f64 = 0.25;
const GROUP_SKIP_PENALTY: f64 = 0.5;

const EXPLORER_UNPLAYED_BOOST: f64 = 4.0;
const EXPLORER_RARE_CEILING: f64 = 0.4;
const EXPLORER_RARE_MAX_BONUS: f64 = 2.0;

const CONSISTENT_THRESHOLD_FRACTION: f64 = 0.5;
const CONSISTENT_THRESHOLD_FLOOR: f64 = 3.0;
const CONSISTENT_FAMILIAR_BOOST: f64 = 2.0;
const CONSISTENT_ANCHOR_BOOST: f64 = 5.0;

const CUSTOM_LEAST_CEILING: f64 = 0.4;
const CUSTOM_MOST_FLOOR: f64 = 0.6;

const SAME_SONG_PENALTY: f64 = 0.01;
const SAME_ARTIST_PENALTY: f64 = 0.5;
const SAME_ALBUM_PENALTY: f64 = 0.7;

const SUGGEST_LESS_PENALTY: f64 = 0.1;

const MEMBER_FAVORITE_BOOST: f64 = 2.0;
const MEMBER_SUGGEST_LESS_PENALTY: f64 = 0.2;

/// Per-stage multipliers of one weight computation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightBreakdown {
    pub recency: f64,
    pub skip: f64,
    pub play_count: f64,
    pub repetition: f64,
    pub preference: f64,
    /// Product of the stages, floored at [`MIN_WEIGHT`].
    pub total: f64,
}

impl fmt::Display for WeightBreakdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:>8.4} (recency x{:.2}, skip x{:.2}, plays x{:.2}, repeat x{:.2}, prefs x{:.2})",
            self.total, self.recency, self.skip, self.play_count, self.repetition, self.preference
        )
    }
}

/// Anything the sampler can draw weights from.
pub trait WeightSource {
    /// Weight of `item` when `previous` was the last pick.
    fn weight(&self, item: &VirtualItem, previous: Option<&Track>) -> f64;

    /// Signals used to choose which member of a drawn group plays.
    fn signals(&self) -> &SignalSnapshot;
}

/// Weighs virtual items against one frozen view of the signals.
///
/// # Examples
///
/// ```
/// use museq::algorithm::WeightCalculator;
/// use museq::merge::MergeGroups;
/// use museq::shuffle::ShuffleConfig;
/// use museq::signals::SignalSnapshot;
/// use museq::track::Track;
///
/// let groups = MergeGroups::new();
/// let pool = groups.partition(vec![Track::new("a.flac"), Track::new("b.flac")]);
/// let config = ShuffleConfig::default();
/// let signals = SignalSnapshot::default();
///
/// let calc = WeightCalculator::new(&config, &signals, &groups, &pool);
/// assert_eq!(calc.weight(&pool[0], None), 1.0);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct WeightCalculator<'a> {
    config: &'a ShuffleConfig,
    signals: &'a SignalSnapshot,
    groups: &'a MergeGroups,
    pool_max_plays: u32,
}

impl<'a> WeightCalculator<'a> {
    /// Calculator for candidates drawn from `pool`; the pool fixes the
    /// play-count scale.
    #[must_use]
    pub fn new(
        config: &'a ShuffleConfig,
        signals: &'a SignalSnapshot,
        groups: &'a MergeGroups,
        pool: &[VirtualItem],
    ) -> Self {
        let mut calc = Self {
            config,
            signals,
            groups,
            pool_max_plays: 0,
        };
        let max = pool.iter().map(|item| calc.play_count_of(item)).max().unwrap_or(0);
        calc.pool_max_plays = max;
        calc
    }

    #[must_use]
    pub const fn pool_max_plays(&self) -> u32 {
        self.pool_max_plays
    }

    #[must_use]
    pub const fn config(&self) -> &ShuffleConfig {
        self.config
    }

    #[must_use]
    pub const fn signals(&self) -> &SignalSnapshot {
        self.signals
    }

    /// Weight of `item` given the previously selected track.
    #[must_use]
    pub fn weight(&self, item: &VirtualItem, previous: Option<&Track>) -> f64 {
        self.explain(item, previous).total
    }

    /// Weight of `item` with every stage exposed.
    #[must_use]
    pub fn explain(&self, item: &VirtualItem, previous: Option<&Track>) -> WeightBreakdown {
        let recency = self.recency_multiplier(item);
        let skip = self.skip_multiplier(item);
        let play_count = self.play_count_multiplier(item);
        let repetition = self.repetition_multiplier(item, previous);
        let preference = self.preference_multiplier(item);

        let raw = recency * skip * play_count * repetition * preference;
        let total = if raw.is_finite() { raw.max(MIN_WEIGHT) } else { MIN_WEIGHT };

        trace!(
            "Weight {total:.4} for `{}' (recency {recency:.3}, skip {skip:.3}, plays {play_count:.3}, repeat {repetition:.3}, prefs {preference:.3})",
            item.representative().id
        );

        WeightBreakdown {
            recency,
            skip,
            play_count,
            repetition,
            preference,
            total,
        }
    }

    /// Stage 1: penalize tracks found in the recent history. A group is
    /// matched through any of its members, present in the pool or not.
    fn recency_multiplier(&self, item: &VirtualItem) -> f64 {
        let Some(curve) = self.recency_curve() else {
            return 1.0;
        };

        let ids = self.groups.signal_ids(item);
        let found = self
            .signals
            .history
            .iter()
            .take(self.config.history_limit)
            .enumerate()
            .find(|(_, entry)| ids.contains(&entry.track_id.as_str()));

        match found {
            Some((position, entry)) => {
                let scale = if entry.kind == EventKind::Complete {
                    1.0
                } else {
                    play_ratio_scale(entry.play_ratio)
                };
                1.0 - recency_penalty(position, curve) * scale
            }
            None => 1.0,
        }
    }

    fn recency_curve(&self) -> Option<&'static [(usize, f64)]> {
        match self.config.personality {
            Personality::Explorer | Personality::Default => Some(&STANDARD_RECENCY[..]),
            Personality::Consistent => Some(&GENTLE_RECENCY[..]),
            Personality::Custom => self
                .config
                .custom
                .avoid_song_repeat
                .then_some(&STANDARD_RECENCY[..]),
        }
    }

    /// Stage 2: chronically skipped tracks lose weight in proportion to how
    /// little of them gets heard.
    fn skip_multiplier(&self, item: &VirtualItem) -> f64 {
        let chronic = |id: &str| {
            let stats = self.signals.skips(id);
            (stats.count >= SKIP_MIN_COUNT && stats.avg_ratio <= SKIP_MAX_RATIO)
                .then_some(stats.avg_ratio.max(0.0))
        };

        match item {
            VirtualItem::Standalone(track) => chronic(&track.id).unwrap_or(1.0),
            VirtualItem::Group { .. } => {
                if self.groups.signal_ids(item).into_iter().any(|id| chronic(id).is_some()) {
                    GROUP_SKIP_PENALTY
                } else {
                    1.0
                }
            }
        }
    }

    /// Stage 3: shape by play count relative to the most played candidate.
    fn play_count_multiplier(&self, item: &VirtualItem) -> f64 {
        let plays = self.play_count_of(item);
        let ratio = if self.pool_max_plays == 0 {
            0.0
        } else {
            f64::from(plays) / f64::from(self.pool_max_plays)
        };

        match self.config.personality {
            Personality::Explorer => {
                if plays == 0 {
                    EXPLORER_UNPLAYED_BOOST
                } else if ratio <= EXPLORER_RARE_CEILING {
                    1.0 + EXPLORER_RARE_MAX_BONUS * (1.0 - ratio / EXPLORER_RARE_CEILING)
                } else {
                    1.0
                }
            }
            Personality::Consistent => {
                let threshold = (f64::from(self.pool_max_plays) * CONSISTENT_THRESHOLD_FRACTION)
                    .max(CONSISTENT_THRESHOLD_FLOOR);
                let mut multiplier = 1.0;
                if f64::from(plays) >= threshold {
                    multiplier *= CONSISTENT_FAMILIAR_BOOST;
                }
                if item.tracks().iter().any(|t| self.signals.is_anchored(&t.id)) {
                    multiplier *= CONSISTENT_ANCHOR_BOOST;
                }
                multiplier
            }
            Personality::Custom => {
                let custom = &self.config.custom;
                let mut multiplier = 1.0;
                if ratio <= CUSTOM_LEAST_CEILING && custom.least_played != 0 {
                    multiplier *= weight_multiplier(custom.least_played);
                }
                if ratio >= CUSTOM_MOST_FLOOR && custom.most_played != 0 {
                    multiplier *= weight_multiplier(custom.most_played);
                }
                multiplier
            }
            Personality::Default => 1.0,
        }
    }

    /// Stage 4: avoid repeating the song, artist or album just picked.
    fn repetition_multiplier(&self, item: &VirtualItem, previous: Option<&Track>) -> f64 {
        let Some(previous) = previous else {
            return 1.0;
        };

        let (song, artist, album) = match self.config.personality {
            Personality::Consistent => return 1.0,
            Personality::Explorer | Personality::Default => (true, true, true),
            Personality::Custom => {
                let custom = &self.config.custom;
                (custom.avoid_song_repeat, custom.avoid_artist_repeat, custom.avoid_album_repeat)
            }
        };

        let same_slot = item
            .tracks()
            .iter()
            .any(|t| t.id == previous.id || self.groups.same_group(&t.id, &previous.id));
        if same_slot && song {
            return SAME_SONG_PENALTY;
        }

        let mut multiplier = 1.0;
        if artist && item.tracks().iter().any(|t| t.same_artist(previous)) {
            multiplier *= SAME_ARTIST_PENALTY;
        }
        if album && item.tracks().iter().any(|t| t.same_album(previous)) {
            multiplier *= SAME_ALBUM_PENALTY;
        }
        multiplier
    }

    /// Stage 5: favorites and suggest-less, from any group member.
    fn preference_multiplier(&self, item: &VirtualItem) -> f64 {
        let ids = self.groups.signal_ids(item);
        let favorite = ids.iter().any(|id| self.signals.is_favorite(id));
        let suggest_less = ids.iter().any(|id| self.signals.is_suggest_less(id));
        let custom = &self.config.custom;

        let mut multiplier = 1.0;
        if favorite {
            multiplier *= match self.config.personality {
                Personality::Consistent => 3.0,
                Personality::Default => 1.5,
                Personality::Explorer => 1.1,
                Personality::Custom if custom.favorites != 0 => weight_multiplier(custom.favorites),
                Personality::Custom => 1.0,
            };
        }
        if suggest_less {
            multiplier *= match self.config.personality {
                Personality::Custom if custom.suggest_less != 0 => weight_multiplier(custom.suggest_less),
                Personality::Custom => 1.0,
                _ => SUGGEST_LESS_PENALTY,
            };
        }
        multiplier
    }

    /// Play count of a unit; a group counts the plays of all its members.
    fn play_count_of(&self, item: &VirtualItem) -> u32 {
        item.tracks()
            .iter()
            .map(|t| self.signals.play_count(&t.id))
            .fold(0u32, u32::saturating_add)
    }
}

impl WeightSource for WeightCalculator<'_> {
    fn weight(&self, item: &VirtualItem, previous: Option<&Track>) -> f64 {
        WeightCalculator::weight(self, item, previous)
    }

    fn signals(&self) -> &SignalSnapshot {
        self.signals
    }
}

/// Weight of a group member when picking which file of a group plays.
#[must_use]
pub fn member_weight(track: &Track, signals: &SignalSnapshot) -> f64 {
    let mut weight = 1.0;
    if signals.is_favorite(&track.id) {
        weight *= MEMBER_FAVORITE_BOOST;
    }
    if signals.is_suggest_less(&track.id) {
        weight *= MEMBER_SUGGEST_LESS_PENALTY;
    }
    weight
}

#[inline]
fn recency_penalty(position: usize, curve: &[(usize, f64)]) -> f64 {
    curve
        .iter()
        .find(|(last, _)| position <= *last)
        .map_or(0.0, |(_, penalty)| *penalty)
}

#[inline]
fn play_ratio_scale(ratio: f64) -> f64 {
    PLAY_RATIO_SCALE
        .iter()
        .find(|(max_ratio, _)| ratio <= *max_ratio)
        .map_or(1.0, |(_, scale)| *scale)
}
