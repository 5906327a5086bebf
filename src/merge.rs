//! Merge groups: duplicate or alternate recordings that share one shuffle slot.
//!
//! Membership comes from outside (the signal database or the caller) and is
//! a pure lookup here. Sampling works on [`VirtualItem`]s so a group competes
//! as a single candidate; which member actually plays is decided when the
//! group is drawn.

use std::collections::{HashMap, HashSet};

use crate::track::{Track, TrackId};

pub type GroupId = String;

/// Track-to-group mapping with member enumeration.
#[derive(Debug, Clone, Default)]
pub struct MergeGroups {
    by_track: HashMap<TrackId, GroupId>,
    members: HashMap<GroupId, Vec<TrackId>>,
}

impl MergeGroups {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the mapping from `(track, group)` pairs.
    pub fn from_pairs<I, T, G>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (T, G)>,
        T: Into<TrackId>,
        G: Into<GroupId>,
    {
        let mut groups = Self::new();
        for (track, group) in pairs {
            groups.assign(track, group);
        }
        groups
    }

    /// Puts `track` into `group`, moving it out of any previous group.
    pub fn assign(&mut self, track: impl Into<TrackId>, group: impl Into<GroupId>) {
        let track = track.into();
        let group = group.into();
        self.unassign(&track);
        self.members.entry(group.clone()).or_default().push(track.clone());
        self.by_track.insert(track, group);
    }

    /// Removes `track` from its group, if any.
    pub fn unassign(&mut self, track: &str) {
        let Some(old) = self.by_track.remove(track) else {
            return;
        };
        if let Some(list) = self.members.get_mut(&old) {
            list.retain(|t| t != track);
            if list.is_empty() {
                self.members.remove(&old);
            }
        }
    }

    #[must_use]
    pub fn group_of(&self, track: &str) -> Option<&GroupId> {
        self.by_track.get(track)
    }

    /// All known members of `group`, in insertion order.
    #[must_use]
    pub fn members(&self, group: &str) -> &[TrackId] {
        self.members.get(group).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_track.is_empty()
    }

    /// True when both tracks resolve to the same group.
    #[must_use]
    pub fn same_group(&self, a: &str, b: &str) -> bool {
        matches!((self.group_of(a), self.group_of(b)), (Some(x), Some(y)) if x == y)
    }

    /// Ids whose listening signals speak for `item`: its own tracks first,
    /// then every other known member of its group.
    #[must_use]
    pub fn signal_ids<'s>(&'s self, item: &'s VirtualItem) -> Vec<&'s str> {
        let mut ids: Vec<&str> = item.tracks().iter().map(|t| t.id.as_str()).collect();
        if let VirtualItem::Group { id, .. } = item {
            for mate in self.members(id) {
                if !ids.contains(&mate.as_str()) {
                    ids.push(mate);
                }
            }
        }
        ids
    }

    /// `tracks` plus a bare [`Track`] for each group mate missing from them.
    ///
    /// Signal snapshots are captured over this set so that absent mates
    /// still contribute history and preferences.
    #[must_use]
    pub fn with_mates<'t>(&self, tracks: impl IntoIterator<Item = &'t Track>) -> Vec<Track> {
        let mut out: Vec<Track> = tracks.into_iter().cloned().collect();
        let mut seen: HashSet<TrackId> = out.iter().map(|t| t.id.clone()).collect();
        let mut mates = Vec::new();
        for track in &out {
            let Some(group) = self.group_of(&track.id) else {
                continue;
            };
            for mate in self.members(group) {
                if seen.insert(mate.clone()) {
                    mates.push(Track::new(mate.clone()));
                }
            }
        }
        out.extend(mates);
        out
    }

    /// Splits `tracks` into sampling units.
    ///
    /// Duplicate ids collapse to their first occurrence. A group only holds
    /// the members present in `tracks`, so a draw never leaves the candidate
    /// pool. Output order follows the first appearance of each unit.
    #[must_use]
    pub fn partition(&self, tracks: Vec<Track>) -> Vec<VirtualItem> {
        let mut seen: HashSet<TrackId> = HashSet::new();
        let mut slot_of_group: HashMap<GroupId, usize> = HashMap::new();
        let mut items: Vec<VirtualItem> = Vec::new();

        for track in tracks {
            if !seen.insert(track.id.clone()) {
                continue;
            }
            match self.group_of(&track.id) {
                Some(group) => match slot_of_group.get(group) {
                    Some(&slot) => {
                        if let VirtualItem::Group { members, .. } = &mut items[slot] {
                            members.push(track);
                        }
                    }
                    None => {
                        slot_of_group.insert(group.clone(), items.len());
                        items.push(VirtualItem::Group {
                            id: group.clone(),
                            members: vec![track],
                        });
                    }
                },
                None => items.push(VirtualItem::Standalone(track)),
            }
        }

        items
    }
}

/// One sampling unit.
#[derive(Debug, Clone, PartialEq)]
pub enum VirtualItem {
    Standalone(Track),
    /// Never empty.
    Group { id: GroupId, members: Vec<Track> },
}

impl VirtualItem {
    /// The concrete tracks this unit stands for.
    #[must_use]
    pub fn tracks(&self) -> &[Track] {
        match self {
            Self::Standalone(track) => std::slice::from_ref(track),
            Self::Group { members, .. } => members,
        }
    }

    /// Track whose metadata represents the unit (first member of a group).
    #[must_use]
    pub fn representative(&self) -> &Track {
        &self.tracks()[0]
    }

    #[must_use]
    pub fn group_id(&self) -> Option<&GroupId> {
        match self {
            Self::Standalone(_) => None,
            Self::Group { id, .. } => Some(id),
        }
    }

    #[must_use]
    pub fn contains(&self, track_id: &str) -> bool {
        self.tracks().iter().any(|t| t.id == track_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracks(ids: &[&str]) -> Vec<Track> {
        ids.iter().map(|id| Track::new(*id)).collect()
    }

    #[test]
    fn test_partition_collapses_group_members() {
        let groups = MergeGroups::from_pairs([("a", "g1"), ("b", "g1")]);
        let items = groups.partition(tracks(&["a", "c", "b"]));

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].group_id().map(String::as_str), Some("g1"));
        assert_eq!(items[0].tracks().len(), 2);
        assert!(matches!(&items[1], VirtualItem::Standalone(t) if t.id == "c"));
    }

    #[test]
    fn test_partition_only_keeps_present_members() {
        let groups = MergeGroups::from_pairs([("a", "g1"), ("b", "g1"), ("x", "g1")]);
        let items = groups.partition(tracks(&["b"]));

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].tracks().len(), 1);
        assert!(items[0].contains("b"));
        assert!(!items[0].contains("a"));
    }

    #[test]
    fn test_signal_ids_reach_absent_mates() {
        let groups = MergeGroups::from_pairs([("a", "g1"), ("b", "g1"), ("x", "g2")]);
        let items = groups.partition(tracks(&["a", "c"]));

        assert_eq!(groups.signal_ids(&items[0]), ["a", "b"]);
        assert_eq!(groups.signal_ids(&items[1]), ["c"]);
    }

    #[test]
    fn test_with_mates_adds_each_missing_member_once() {
        let groups = MergeGroups::from_pairs([("a", "g1"), ("b", "g1"), ("d", "g1")]);
        let list = tracks(&["a", "c", "b"]);
        let ids: Vec<String> = groups.with_mates(&list).into_iter().map(|t| t.id).collect();

        assert_eq!(ids, ["a", "c", "b", "d"]);
    }

    #[test]
    fn test_partition_drops_duplicate_ids() {
        let groups = MergeGroups::new();
        let items = groups.partition(tracks(&["a", "b", "a"]));
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn test_reassign_moves_track_between_groups() {
        let mut groups = MergeGroups::from_pairs([("a", "g1"), ("b", "g1")]);
        groups.assign("a", "g2");

        assert_eq!(groups.group_of("a").map(String::as_str), Some("g2"));
        assert_eq!(groups.members("g1"), ["b".to_string()]);
        assert!(!groups.same_group("a", "b"));

        groups.unassign("b");
        assert!(groups.members("g1").is_empty());
        assert!(groups.group_of("b").is_none());
    }
}
