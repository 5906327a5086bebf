//! # Command-Line Interface Module
//!
//! Clap derive definitions for the `museq` binary. The binary is a thin
//! front end over the library: it records listening signals into the SQLite
//! store, edits the persisted shuffle configuration, and prints shuffled
//! queues for playlist files.
//!
//! ## Playlist files
//!
//! One track per line, tab separated: `path[\tartist[\talbum[\tduration]]]`.
//! Blank lines and lines starting with `#` are ignored.
//!
//! ## Examples
//!
//! ```bash
//! museq record /music/a.flac skip --listened 12 --duration 240
//! museq personality explorer
//! museq custom --suggest-less -99 --avoid-album-repeat false
//! museq shuffle road-trip.tsv --restricted --explain --seed 7
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use museq::shuffle::Personality;
use museq::signals::EventKind;

/// Shell types supported for completion generation
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    /// Bash shell
    Bash,
    /// Zsh shell
    Zsh,
    /// Fish shell
    Fish,
    /// PowerShell
    PowerShell,
    /// Elvish shell
    Elvish,
}

/// Listening event kinds accepted by `record`.
#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum EventArg {
    Skip,
    Listen,
    Complete,
}

impl From<EventArg> for EventKind {
    fn from(arg: EventArg) -> Self {
        match arg {
            EventArg::Skip => Self::Skip,
            EventArg::Listen => Self::Listen,
            EventArg::Complete => Self::Complete,
        }
    }
}

/// Shuffle personalities accepted by `personality`.
#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum PersonalityArg {
    /// Push rarely played tracks forward
    Explorer,
    /// Favor familiar tracks and anchor playlists
    Consistent,
    /// Balanced weighting
    Default,
    /// Use the custom weights (see `museq custom`)
    Custom,
}

impl From<PersonalityArg> for Personality {
    fn from(arg: PersonalityArg) -> Self {
        match arg {
            PersonalityArg::Explorer => Self::Explorer,
            PersonalityArg::Consistent => Self::Consistent,
            PersonalityArg::Default => Self::Default,
            PersonalityArg::Custom => Self::Custom,
        }
    }
}

/// Main application arguments structure.
#[derive(Parser, Debug)]
#[command(name = "museq")]
#[command(about = "Museq: play queue and weighted shuffle engine for music libraries")]
#[command(version)]
pub struct Args {
    /// Signal database to use instead of the platform default
    #[arg(long, global = true, env = "MUSEQ_DB", value_hint = clap::ValueHint::FilePath)]
    pub db: Option<PathBuf>,

    /// Directory for persisted shuffle state and queue
    #[arg(long, global = true, env = "MUSEQ_STATE_DIR", value_hint = clap::ValueHint::DirPath)]
    pub state_dir: Option<PathBuf>,

    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Enumeration of all available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Record a playback event for a track
    ///
    /// A skip with ten seconds or less remaining is stored as a complete
    /// play. Without a duration the play ratio is 1.0 for listens and
    /// completes and 0.0 for skips.
    Record {
        /// Track path
        #[arg(value_hint = clap::ValueHint::FilePath)]
        track: String,

        /// What happened
        #[arg(value_enum)]
        kind: EventArg,

        /// Seconds heard before the event
        #[arg(long, default_value_t = 0.0)]
        listened: f64,

        /// Track length in seconds
        #[arg(long, default_value_t = 0.0)]
        duration: f64,
    },

    /// Mark a track as favorite
    Love {
        #[arg(value_hint = clap::ValueHint::FilePath)]
        track: String,
    },

    /// Remove the favorite mark from a track
    Unlove {
        #[arg(value_hint = clap::ValueHint::FilePath)]
        track: String,
    },

    /// Ask for a track to come up less often
    SuggestLess {
        #[arg(value_hint = clap::ValueHint::FilePath)]
        track: String,

        /// Remove the mark instead
        #[arg(long)]
        undo: bool,
    },

    /// Hide a track from library-wide auto-extension
    Hide {
        #[arg(value_hint = clap::ValueHint::FilePath)]
        track: String,

        /// Unhide instead
        #[arg(long)]
        undo: bool,
    },

    /// Put a track into a merge group, or take it out
    ///
    /// Tracks in one group (live and studio versions, duplicates) share a
    /// single shuffle slot.
    Group {
        #[arg(value_hint = clap::ValueHint::FilePath)]
        track: String,

        /// Group name; omit to remove the track from its group
        group: Option<String>,
    },

    /// Store a playlist so it can serve as an anchor playlist
    Playlist {
        /// Playlist name
        name: String,

        /// Playlist file
        #[arg(value_hint = clap::ValueHint::FilePath)]
        file: PathBuf,
    },

    /// Select the shuffle personality
    Personality {
        #[arg(value_enum)]
        personality: PersonalityArg,
    },

    /// Tune the custom personality
    ///
    /// Weights range from -99 to 99 and become a multiplier of
    /// 1 + weight / 100; 0 turns a signal off.
    Custom {
        /// Weight for rarely played tracks
        #[arg(long, allow_hyphen_values = true)]
        least_played: Option<i32>,

        /// Weight for often played tracks
        #[arg(long, allow_hyphen_values = true)]
        most_played: Option<i32>,

        /// Weight for favorites
        #[arg(long, allow_hyphen_values = true)]
        favorites: Option<i32>,

        /// Weight for suggest-less tracks
        #[arg(long, allow_hyphen_values = true)]
        suggest_less: Option<i32>,

        /// Avoid the same artist twice in a row
        #[arg(long)]
        avoid_artist_repeat: Option<bool>,

        /// Avoid the same album twice in a row
        #[arg(long)]
        avoid_album_repeat: Option<bool>,

        /// Avoid recently heard songs and their merge groups
        #[arg(long)]
        avoid_song_repeat: Option<bool>,
    },

    /// Show or change general shuffle settings
    ///
    /// Prints the resulting configuration as JSON.
    Config {
        /// History entries considered by the recency penalty
        #[arg(long)]
        history_limit: Option<usize>,

        /// Add an anchor playlist for the consistent personality
        #[arg(long = "anchor")]
        anchors: Vec<String>,

        /// Remove all anchor playlists
        #[arg(long)]
        clear_anchors: bool,

        /// Turn shuffle on or off
        #[arg(long)]
        enabled: Option<bool>,
    },

    /// Print a shuffled queue for a playlist file
    ///
    /// With --restricted the whole file is the queue and gets shuffled.
    /// Otherwise the file acts as the library and the queue grows by
    /// auto-extension from the start track.
    Shuffle {
        /// Playlist file
        #[arg(value_hint = clap::ValueHint::FilePath)]
        file: PathBuf,

        /// Only ever draw from the playlist itself
        #[arg(long)]
        restricted: bool,

        /// Show each pick's weight breakdown against its predecessor
        #[arg(long)]
        explain: bool,

        /// Seed for a reproducible order
        #[arg(long)]
        seed: Option<u64>,

        /// Track to start with (defaults to the first in the file)
        #[arg(long)]
        start: Option<String>,

        /// Queue length to grow to without --restricted
        #[arg(long, default_value_t = 20)]
        length: usize,
    },

    /// Show the current weight of every track in a playlist file
    Weights {
        /// Playlist file
        #[arg(value_hint = clap::ValueHint::FilePath)]
        file: PathBuf,

        /// Track considered as just played, for repetition avoidance
        #[arg(long)]
        after: Option<String>,
    },

    /// Generate shell completions
    ///
    /// Usage: museq completion bash > ~/.local/share/bash-completion/completions/museq
    Completion {
        /// Shell to generate completions for
        shell: Shell,
    },

    /// List known track ids for completion (hidden command)
    #[command(hide = true)]
    CompleteTracks,
}
