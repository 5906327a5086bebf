//! # Queue Engine
//!
//! [`QueueEngine`] owns two lists:
//!
//! - the **original queue**, the tracks in the order the caller presented
//!   them, plus a `restricted` flag saying whether auto-extension may only
//!   draw from it;
//! - the **effective queue**, the [`QueueItem`]s playback actually consumes,
//!   with the current item tracked by queue id rather than by index.
//!
//! With shuffle disabled the effective queue mirrors the original order.
//! With shuffle enabled everything after the current item (except "play
//! next" items) comes out of the weighted sampler, and the queue keeps
//! extending itself so there are always at least two items ahead.
//!
//! Every mutation renumbers positions, bumps the version, notifies
//! subscribers and persists through the optional [`StateStore`].
//!
//! ## Example
//!
//! ```
//! use museq::queue::QueueEngine;
//! use museq::signals::MemorySignalStore;
//! use museq::track::Track;
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let tracks: Vec<Track> = ["a", "b", "c", "d"].into_iter().map(Track::new).collect();
//! let mut engine = QueueEngine::new(Box::new(MemorySignalStore::new()))
//!     .with_rng(StdRng::seed_from_u64(1));
//!
//! engine.play_now(tracks[0].clone(), Some(tracks.clone()));
//! let snapshot = engine.enable_shuffle();
//! assert_eq!(snapshot.items.len(), 4);
//! assert_eq!(snapshot.items[0].track.id, "a");
//! ```

use log::{debug, error, info, warn};
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::algorithm::WeightCalculator;
use crate::error::{EngineError, Result};
use crate::merge::{GroupId, MergeGroups, VirtualItem};
use crate::sampler::{draw_one, weighted_shuffle, RandomSource};
use crate::shuffle::{ShuffleConfig, ShuffleState};
use crate::signals::{SignalSnapshot, SignalStore};
use crate::store::StateStore;
use crate::track::{QueueId, QueueItem, Track};

/// How many of the latest effective entries auto-extension refuses to repeat.
pub const EXTENSION_LOOKBACK: usize = 10;

/// Derived state of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueMode {
    Empty,
    Linear,
    Shuffled,
}

/// What subscribers and callers get to see after an operation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub items: Vec<QueueItem>,
    pub current_index: Option<usize>,
    pub shuffle_enabled: bool,
    pub restricted: bool,
    /// Bumped on every committed change.
    pub version: u64,
}

impl QueueSnapshot {
    #[must_use]
    pub fn current(&self) -> Option<&QueueItem> {
        self.current_index.and_then(|i| self.items.get(i))
    }

    /// Items after the current one.
    #[must_use]
    pub fn upcoming(&self) -> &[QueueItem] {
        match self.current_index {
            Some(i) => self.items.get(i + 1..).unwrap_or(&[]),
            None => &self.items,
        }
    }

    #[must_use]
    pub fn mode(&self) -> QueueMode {
        if self.items.is_empty() {
            QueueMode::Empty
        } else if self.shuffle_enabled {
            QueueMode::Shuffled
        } else {
            QueueMode::Linear
        }
    }
}

/// Queue as written to the [`StateStore`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedQueue {
    pub original: Vec<Track>,
    pub restricted: bool,
    pub items: Vec<QueueItem>,
    pub current_queue_id: Option<QueueId>,
    pub next_queue_id: QueueId,
    pub version: u64,
}

/// Callback invoked with the new snapshot after every committed change.
pub type Listener = Box<dyn FnMut(&QueueSnapshot) + Send>;

/// The play queue and its shuffle machinery.
///
/// Single owner: every mutation takes `&mut self`. The engine is `Send`, so
/// it can sit behind a mutex shared with a playback thread.
pub struct QueueEngine {
    library: Vec<Track>,
    original: Vec<Track>,
    restricted: bool,
    effective: Vec<QueueItem>,
    current: Option<QueueId>,
    next_queue_id: QueueId,
    version: u64,
    state: ShuffleState,
    signals: Box<dyn SignalStore>,
    groups: MergeGroups,
    rng: Box<dyn RandomSource + Send>,
    state_store: Option<Box<dyn StateStore>>,
    listeners: Vec<Listener>,
}

impl QueueEngine {
    /// Empty engine reading listening signals from `signals`.
    ///
    /// Randomness is seeded from the OS; use [`QueueEngine::with_rng`] for
    /// reproducible orders.
    #[must_use]
    pub fn new(signals: Box<dyn SignalStore>) -> Self {
        Self {
            library: Vec::new(),
            original: Vec::new(),
            restricted: false,
            effective: Vec::new(),
            current: None,
            next_queue_id: 1,
            version: 0,
            state: ShuffleState::default(),
            signals,
            groups: MergeGroups::new(),
            rng: Box::new(StdRng::from_entropy()),
            state_store: None,
            listeners: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_rng<R: RandomSource + Send + 'static>(mut self, rng: R) -> Self {
        self.rng = Box::new(rng);
        self
    }

    #[must_use]
    pub fn with_merge_groups(mut self, groups: MergeGroups) -> Self {
        self.groups = groups;
        self
    }

    /// Tracks eligible for unrestricted auto-extension.
    #[must_use]
    pub fn with_library(mut self, library: Vec<Track>) -> Self {
        self.library = library;
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: ShuffleConfig) -> Self {
        self.state = ShuffleState::new(config);
        self
    }

    #[must_use]
    pub fn with_state_store(mut self, store: Box<dyn StateStore>) -> Self {
        self.state_store = Some(store);
        self
    }

    // ---- Read access ----

    #[must_use]
    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            items: self.effective.clone(),
            current_index: self.current_index(),
            shuffle_enabled: self.state.config.enabled,
            restricted: self.restricted,
            version: self.version,
        }
    }

    #[must_use]
    pub fn current_effective_queue(&self) -> &[QueueItem] {
        &self.effective
    }

    #[must_use]
    pub fn current(&self) -> Option<&QueueItem> {
        self.current_index().map(|i| &self.effective[i])
    }

    #[must_use]
    pub fn current_index(&self) -> Option<usize> {
        let id = self.current?;
        self.effective.iter().position(|item| item.queue_id == id)
    }

    #[must_use]
    pub fn original_queue(&self) -> &[Track] {
        &self.original
    }

    #[must_use]
    pub const fn is_restricted(&self) -> bool {
        self.restricted
    }

    #[must_use]
    pub const fn shuffle_state(&self) -> &ShuffleState {
        &self.state
    }

    #[must_use]
    pub const fn config(&self) -> &ShuffleConfig {
        &self.state.config
    }

    #[must_use]
    pub const fn merge_groups(&self) -> &MergeGroups {
        &self.groups
    }

    #[must_use]
    pub fn mode(&self) -> QueueMode {
        self.snapshot().mode()
    }

    /// Registers a callback run after every committed change.
    pub fn subscribe(&mut self, listener: impl FnMut(&QueueSnapshot) + Send + 'static) {
        self.listeners.push(Box::new(listener));
    }

    // ---- Shuffle mode ----

    /// Turns shuffle on and reorders everything after the current item.
    ///
    /// Items up to and including the current one stay put, pending "play
    /// next" items follow in their order, then the weighted shuffle of the
    /// remaining items.
    pub fn enable_shuffle(&mut self) -> QueueSnapshot {
        info!("Enabling shuffle ({} personality)", self.state.config.personality);
        self.state.set_enabled(true);
        self.persist_state();
        self.reshuffle_upcoming();
        self.extend_if_needed();
        self.commit()
    }

    /// Turns shuffle off and restores the original order around the current
    /// item.
    pub fn disable_shuffle(&mut self) -> QueueSnapshot {
        info!("Disabling shuffle");
        self.state.set_enabled(false);
        self.persist_state();
        self.install_linear();
        self.commit()
    }

    pub fn toggle_shuffle(&mut self) -> QueueSnapshot {
        if self.state.config.enabled {
            self.disable_shuffle()
        } else {
            self.enable_shuffle()
        }
    }

    /// Replaces the shuffle configuration.
    ///
    /// With shuffle enabled afterwards the upcoming items are re-sampled
    /// under the new weights; switching it off restores the original order.
    pub fn set_config(&mut self, config: ShuffleConfig) -> QueueSnapshot {
        let was_enabled = self.state.config.enabled;
        self.state.update(config);
        self.persist_state();
        debug!("Shuffle config updated (revision {})", self.state.revision);

        match (was_enabled, self.state.config.enabled) {
            (_, true) => {
                self.reshuffle_upcoming();
                self.extend_if_needed();
            }
            (true, false) => self.install_linear(),
            (false, false) => {}
        }
        self.commit()
    }

    // ---- Queue edits ----

    /// Starts playing `track`.
    ///
    /// With `context` the list replaces the original queue and restricts
    /// extension to it. Without one the original queue is kept, seeded with
    /// the track when empty. A track missing from the original queue is
    /// inserted right after the previously current track, or appended.
    /// Pending "play next" items carry over behind the new current item.
    pub fn play_now(&mut self, track: Track, context: Option<Vec<Track>>) -> QueueSnapshot {
        debug!("Play now: {}", track.id);
        let priority = self.pending_priority();
        let previous_id = self.current().map(|item| item.track.id.clone());

        match context {
            Some(list) => {
                self.original = list;
                self.restricted = true;
            }
            None if self.original.is_empty() => self.restricted = false,
            None => {}
        }

        if !self.original.iter().any(|t| t.id == track.id) {
            let at = previous_id
                .and_then(|id| self.original.iter().position(|t| t.id == id))
                .map_or(self.original.len(), |i| i + 1);
            self.original.insert(at, track.clone());
        }

        let current = self.allocate(track, false);
        self.current = Some(current.queue_id);
        self.effective = std::iter::once(current).chain(priority).collect();

        if self.state.config.enabled {
            let head = self.effective.drain(..1).collect();
            let priority = std::mem::take(&mut self.effective);
            let pool = self.original.clone();
            self.install_shuffled(head, priority, pool);
            self.extend_if_needed();
        } else {
            self.install_linear();
        }
        self.commit()
    }

    /// Queues `track` directly after the current item.
    ///
    /// On an empty queue the track becomes the current item. Never
    /// re-shuffles and never extends.
    pub fn play_next(&mut self, track: Track) -> QueueSnapshot {
        debug!("Play next: {}", track.id);
        let item = self.allocate(track, true);

        match self.current_index() {
            Some(index) => self.effective.insert(index + 1, item),
            None => {
                self.current = Some(item.queue_id);
                self.effective.insert(0, item);
            }
        }
        self.commit()
    }

    /// Moves the item at `from` to `to`.
    ///
    /// # Errors
    ///
    /// [`EngineError::IndexOutOfRange`] if either index is past the end.
    pub fn reorder(&mut self, from: usize, to: usize) -> Result<QueueSnapshot> {
        self.check_index(from)?;
        self.check_index(to)?;

        let item = self.effective.remove(from);
        self.effective.insert(to, item);
        debug!("Moved queue item {from} -> {to}");

        self.extend_if_needed();
        Ok(self.commit())
    }

    /// Removes the item at `index`.
    ///
    /// Removing the current item makes the item now at `index` current, or
    /// the last item if `index` was the end. The original queue is left
    /// alone.
    ///
    /// # Errors
    ///
    /// [`EngineError::IndexOutOfRange`] if `index` is past the end.
    pub fn remove_at(&mut self, index: usize) -> Result<QueueSnapshot> {
        self.check_index(index)?;

        let removed = self.effective.remove(index);
        debug!("Removed queue item {index} ({})", removed.track.id);
        if self.current == Some(removed.queue_id) {
            self.current = self
                .effective
                .get(index)
                .or_else(|| self.effective.last())
                .map(|item| item.queue_id);
        }

        self.extend_if_needed();
        Ok(self.commit())
    }

    // ---- Playback movement ----

    /// Moves to the next item, extending first when shuffling. At the end
    /// of a linear queue the current item stays.
    ///
    /// # Errors
    ///
    /// [`EngineError::NothingPlaying`] if there is no current item.
    pub fn advance(&mut self) -> Result<QueueSnapshot> {
        let index = self.current_index().ok_or(EngineError::NothingPlaying)?;
        self.extend_if_needed();

        match self.effective.get(index + 1) {
            Some(next) => self.current = Some(next.queue_id),
            None => debug!("End of queue reached"),
        }

        self.extend_if_needed();
        Ok(self.commit())
    }

    /// Moves back one item; stays on the first.
    ///
    /// # Errors
    ///
    /// [`EngineError::NothingPlaying`] if there is no current item.
    pub fn previous(&mut self) -> Result<QueueSnapshot> {
        let index = self.current_index().ok_or(EngineError::NothingPlaying)?;
        if let Some(prev) = index.checked_sub(1) {
            self.current = Some(self.effective[prev].queue_id);
        }
        Ok(self.commit())
    }

    /// Makes the item at `index` current.
    ///
    /// # Errors
    ///
    /// [`EngineError::IndexOutOfRange`] if `index` is past the end.
    pub fn skip_to(&mut self, index: usize) -> Result<QueueSnapshot> {
        self.check_index(index)?;
        self.current = Some(self.effective[index].queue_id);
        self.extend_if_needed();
        Ok(self.commit())
    }

    // ---- Collaborator data ----

    /// Replaces the library used by unrestricted extension.
    pub fn set_library(&mut self, library: Vec<Track>) {
        debug!("Library replaced ({} tracks)", library.len());
        self.library = library;
        if self.extend_if_needed() > 0 {
            self.commit();
        }
    }

    /// Replaces the merge groups; takes effect with the next sampling.
    pub fn set_merge_groups(&mut self, groups: MergeGroups) {
        self.groups = groups;
    }

    /// Reloads shuffle state and queue from the state store.
    ///
    /// Missing or malformed data leaves the default state and an empty
    /// queue; the problem is logged, never returned.
    pub fn restore(&mut self) -> QueueSnapshot {
        let Some(store) = self.state_store.as_ref() else {
            return self.snapshot();
        };

        let state = store.load_shuffle_state();
        let queue = store.load_queue();

        self.state = match state {
            Ok(Some(state)) => ShuffleState {
                config: state.config.normalized(),
                ..state
            },
            Ok(None) => ShuffleState::default(),
            Err(e) => {
                warn!("{}, using defaults", EngineError::MalformedPersistedState(format!("{e:#}")));
                ShuffleState::default()
            }
        };

        let queue = match queue {
            Ok(queue) => queue.unwrap_or_default(),
            Err(e) => {
                warn!("{}, starting empty", EngineError::MalformedPersistedState(format!("{e:#}")));
                PersistedQueue::default()
            }
        };
        self.install_persisted(queue);

        info!(
            "Restored {} queue items (shuffle {})",
            self.effective.len(),
            if self.state.config.enabled { "on" } else { "off" }
        );
        self.commit()
    }

    // ---- Internals ----

    fn install_persisted(&mut self, queue: PersistedQueue) {
        let highest = queue.items.iter().map(|item| item.queue_id).max().unwrap_or(0);

        self.original = queue.original;
        self.restricted = queue.restricted;
        self.effective = queue.items;
        self.version = queue.version;
        self.next_queue_id = queue.next_queue_id.max(highest + 1);
        self.current = queue
            .current_queue_id
            .filter(|id| self.effective.iter().any(|item| item.queue_id == *id))
            .or_else(|| self.effective.first().map(|item| item.queue_id));
    }

    fn allocate(&mut self, track: Track, is_priority: bool) -> QueueItem {
        let queue_id = self.next_queue_id;
        self.next_queue_id += 1;
        QueueItem {
            queue_id,
            track,
            is_priority,
            position: 0,
        }
    }

    fn check_index(&self, index: usize) -> Result<()> {
        let len = self.effective.len();
        if index < len {
            Ok(())
        } else {
            Err(EngineError::IndexOutOfRange { index, len })
        }
    }

    /// "Play next" items after the current one, in queue order.
    fn pending_priority(&self) -> Vec<QueueItem> {
        let start = self.current_index().map_or(0, |i| i + 1);
        self.effective[start..]
            .iter()
            .filter(|item| item.is_priority)
            .cloned()
            .collect()
    }

    /// Signals for `candidates` and their group mates.
    fn capture<'a>(&self, candidates: impl IntoIterator<Item = &'a Track>) -> SignalSnapshot {
        let tracks = self.groups.with_mates(candidates);
        SignalSnapshot::capture(
            self.signals.as_ref(),
            &tracks,
            self.state.config.history_limit,
            &self.state.config.anchor_playlists,
        )
    }

    /// Re-samples the normal items after the current one.
    fn reshuffle_upcoming(&mut self) {
        let Some(index) = self.current_index() else {
            return;
        };

        let upcoming = self.effective.split_off(index + 1);
        let (priority, normal): (Vec<QueueItem>, Vec<QueueItem>) =
            upcoming.into_iter().partition(|item| item.is_priority);
        let head = std::mem::take(&mut self.effective);
        let pool = normal.into_iter().map(|item| item.track).collect();

        self.install_shuffled(head, priority, pool);
    }

    /// Sets the effective queue to `head`, `priority`, then a weighted
    /// shuffle of `pool` minus the current item (the last of `head`), the
    /// priority items and their groups. Already played items in `head` stay
    /// eligible.
    fn install_shuffled(&mut self, head: Vec<QueueItem>, priority: Vec<QueueItem>, pool: Vec<Track>) {
        let occupied: Vec<&Track> = head.last().into_iter().chain(&priority).map(|item| &item.track).collect();
        let pool = self.without(pool, &occupied);
        let previous = head.last().map(|item| item.track.clone());

        let candidates = self.groups.partition(pool);
        let signals = self.capture(candidates.iter().flat_map(VirtualItem::tracks));
        let calc = WeightCalculator::new(&self.state.config, &signals, &self.groups, &candidates);
        let order = weighted_shuffle(&calc, candidates, previous.as_ref(), self.rng.as_mut());

        self.effective = head;
        self.effective.extend(priority);
        for track in order {
            let item = self.allocate(track, false);
            self.effective.push(item);
        }
    }

    /// Rebuilds the original order with the current item at its original
    /// position and pending priority items right behind it.
    fn install_linear(&mut self) {
        let Some(index) = self.current_index() else {
            let tracks = self.original.clone();
            self.effective = tracks.into_iter().map(|t| self.allocate(t, false)).collect();
            self.current = self.effective.first().map(|item| item.queue_id);
            return;
        };

        let current = self.effective[index].clone();
        let priority = self.pending_priority();
        let tracks = self.original.clone();
        let split = tracks.iter().position(|t| t.id == current.track.id);

        let (before, after) = match split {
            Some(at) => (tracks[..at].to_vec(), tracks[at + 1..].to_vec()),
            None => (Vec::new(), tracks),
        };

        let mut effective: Vec<QueueItem> = before.into_iter().map(|t| self.allocate(t, false)).collect();
        effective.push(current);
        effective.extend(priority);
        for track in after {
            let item = self.allocate(track, false);
            effective.push(item);
        }
        self.effective = effective;
    }

    /// Drops from `pool` every track that is, or shares a group with, one of
    /// `occupied`.
    fn without(&self, pool: Vec<Track>, occupied: &[&Track]) -> Vec<Track> {
        let ids: HashSet<&str> = occupied.iter().map(|t| t.id.as_str()).collect();
        let groups: HashSet<&GroupId> = occupied.iter().filter_map(|t| self.groups.group_of(&t.id)).collect();

        pool.into_iter()
            .filter(|t| !ids.contains(t.id.as_str()))
            .filter(|t| self.groups.group_of(&t.id).map_or(true, |g| !groups.contains(g)))
            .collect()
    }

    /// Tracks auto-extension may draw from before the lookback exclusion.
    fn extension_base(&self) -> (Vec<Track>, SignalSnapshot) {
        let base = if self.restricted { &self.original } else { &self.library };
        let signals = self.capture(base.iter());
        let eligible = base
            .iter()
            .filter(|t| self.restricted || !signals.is_hidden(&t.id))
            .cloned()
            .collect();
        (eligible, signals)
    }

    /// Appends weighted draws while shuffling and fewer than two items
    /// follow the current one. Returns how many were added.
    fn extend_if_needed(&mut self) -> usize {
        if !self.state.config.enabled {
            return 0;
        }
        let Some(index) = self.current_index() else {
            return 0;
        };
        if index + 2 < self.effective.len() {
            return 0;
        }

        let (base, signals) = self.extension_base();
        let mut added = 0;

        while index + 2 >= self.effective.len() {
            let recent: Vec<&Track> = self
                .effective
                .iter()
                .rev()
                .take(EXTENSION_LOOKBACK)
                .map(|item| &item.track)
                .collect();
            let pool = self.without(base.clone(), &recent);
            if pool.is_empty() {
                debug!("Stopping extension: {}", EngineError::EmptyCandidatePool);
                break;
            }

            let previous = self.effective.last().map(|item| item.track.clone());
            let candidates = self.groups.partition(pool);
            let calc = WeightCalculator::new(&self.state.config, &signals, &self.groups, &candidates);
            let Some(track) = draw_one(&calc, &candidates, previous.as_ref(), self.rng.as_mut()) else {
                break;
            };

            debug!("Extended queue with {}", track.id);
            let item = self.allocate(track, false);
            self.effective.push(item);
            added += 1;
        }

        added
    }

    fn renumber(&mut self) {
        for (position, item) in self.effective.iter_mut().enumerate() {
            item.position = position;
        }
    }

    /// Finalizes a mutation: positions, version, subscribers, persistence.
    fn commit(&mut self) -> QueueSnapshot {
        self.renumber();
        self.version += 1;

        let snapshot = self.snapshot();
        for listener in &mut self.listeners {
            listener(&snapshot);
        }
        self.persist_queue();
        snapshot
    }

    fn persist_state(&self) {
        if let Some(store) = &self.state_store {
            if let Err(e) = store.save_shuffle_state(&self.state) {
                error!("Failed to persist shuffle state: {e:#}");
            }
        }
    }

    fn persist_queue(&self) {
        let Some(store) = &self.state_store else {
            return;
        };
        let queue = PersistedQueue {
            original: self.original.clone(),
            restricted: self.restricted,
            items: self.effective.clone(),
            current_queue_id: self.current,
            next_queue_id: self.next_queue_id,
            version: self.version,
        };
        if let Err(e) = store.save_queue(&queue) {
            error!("Failed to persist queue: {e:#}");
        }
    }
}
