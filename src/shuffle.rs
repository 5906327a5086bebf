//! Shuffle configuration and the persisted shuffle state.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Bounds of every custom weight.
pub const CUSTOM_WEIGHT_RANGE: std::ops::RangeInclusive<i32> = -99..=99;

pub const DEFAULT_HISTORY_LIMIT: usize = 200;

/// Weighting policy of the shuffle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Personality {
    /// Pushes rarely played tracks forward.
    Explorer,
    /// Favors familiar tracks and tolerates replays.
    Consistent,
    #[default]
    Default,
    /// Uses [`CustomWeights`].
    Custom,
}

impl Personality {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Explorer => "explorer",
            Self::Consistent => "consistent",
            Self::Default => "default",
            Self::Custom => "custom",
        }
    }
}

impl std::fmt::Display for Personality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Personality {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "explorer" => Ok(Self::Explorer),
            "consistent" => Ok(Self::Consistent),
            "default" => Ok(Self::Default),
            "custom" => Ok(Self::Custom),
            other => Err(anyhow::anyhow!(
                "Unknown personality: {other}. Use explorer, consistent, default or custom"
            )),
        }
    }
}

/// Signed weights of the `custom` personality, each in `[-99, 99]`.
///
/// A weight `w` becomes the multiplier `1 + w / 100`; zero switches the
/// signal off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomWeights {
    pub least_played: i32,
    pub most_played: i32,
    pub favorites: i32,
    pub suggest_less: i32,
    pub avoid_artist_repeat: bool,
    pub avoid_album_repeat: bool,
    pub avoid_song_repeat: bool,
}

impl Default for CustomWeights {
    fn default() -> Self {
        Self {
            least_played: 0,
            most_played: 0,
            favorites: 50,
            suggest_less: -90,
            avoid_artist_repeat: true,
            avoid_album_repeat: true,
            avoid_song_repeat: true,
        }
    }
}

impl CustomWeights {
    /// Copy with every weight clamped into range.
    #[must_use]
    pub fn clamped(self) -> Self {
        let clamp = |w: i32| w.clamp(*CUSTOM_WEIGHT_RANGE.start(), *CUSTOM_WEIGHT_RANGE.end());
        Self {
            least_played: clamp(self.least_played),
            most_played: clamp(self.most_played),
            favorites: clamp(self.favorites),
            suggest_less: clamp(self.suggest_less),
            ..self
        }
    }
}

/// Converts a signed custom weight into a multiplier.
#[must_use]
pub fn weight_multiplier(weight: i32) -> f64 {
    1.0 + f64::from(weight) / 100.0
}

/// Everything the user can tune about shuffling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShuffleConfig {
    pub enabled: bool,
    pub personality: Personality,
    pub custom: CustomWeights,
    /// How many history entries the recency penalty looks at.
    pub history_limit: usize,
    /// Playlists whose tracks the `consistent` personality boosts.
    pub anchor_playlists: Vec<String>,
}

impl Default for ShuffleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            personality: Personality::Default,
            custom: CustomWeights::default(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            anchor_playlists: Vec::new(),
        }
    }
}

impl ShuffleConfig {
    /// Copy with out-of-range values pulled back in.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.custom = self.custom.clamped();
        self.history_limit = self.history_limit.max(1);
        self
    }
}

/// Persisted shuffle state: the configuration plus bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ShuffleState {
    pub config: ShuffleConfig,
    /// Bumped on every mutation.
    pub revision: u64,
    /// Unix seconds of the last mutation.
    pub updated_at: i64,
}

impl ShuffleState {
    #[must_use]
    pub fn new(config: ShuffleConfig) -> Self {
        Self {
            config: config.normalized(),
            revision: 0,
            updated_at: 0,
        }
    }

    /// Replaces the configuration and stamps the change.
    pub fn update(&mut self, config: ShuffleConfig) {
        self.config = config.normalized();
        self.touch();
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.config.enabled = enabled;
        self.touch();
    }

    fn touch(&mut self) {
        self.revision += 1;
        self.updated_at = unix_now();
    }
}

/// Current Unix time in seconds.
#[must_use]
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
}
