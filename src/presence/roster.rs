//! Identity roster with multi-source deduplication
//!
//! Many physical sources (duplicate tabs, reconnects) can carry the same
//! logical identity. The roster keeps exactly one canonical state per
//! identity plus a per-source record of the last state each source
//! reported, so that when a source disappears the identity can fall back
//! to whatever another live source last said.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use crate::presence::records::{Facing, StateRecord};

/// Handle distinguishing one physical connection from another
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceKey {
    Local,
    Remote(String),
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKey::Local => write!(f, "local"),
            SourceKey::Remote(path) => write!(f, "remote:{}", path),
        }
    }
}

/// Canonical per-identity state
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerState {
    pub identity: String,
    pub x: f32,
    pub y: f32,
    pub facing: Facing,
    pub rooms: BTreeSet<String>,
    pub speaking_level: f32,
    pub updated_at: f64,
}

impl PlayerState {
    fn from_record(record: &StateRecord) -> Self {
        Self {
            identity: record.identity.clone(),
            x: record.x,
            y: record.y,
            facing: record.facing,
            rooms: record.rooms.clone().unwrap_or_default(),
            speaking_level: 0.0,
            updated_at: record.ts,
        }
    }

    fn apply_record(&mut self, record: &StateRecord) {
        self.x = record.x;
        self.y = record.y;
        self.facing = record.facing;
        if let Some(rooms) = &record.rooms {
            self.rooms = rooms.clone();
        }
        self.updated_at = record.ts;
    }
}

/// Change notifications produced by roster mutations
#[derive(Debug, Clone, PartialEq)]
pub enum RosterEvent {
    Updated(PlayerState),
    /// Last source for the identity removed; emitted exactly once.
    Removed { identity: String },
    Speaking { identity: String, level: f32 },
    Rooms {
        identity: String,
        rooms: BTreeSet<String>,
    },
}

/// All identity/source maps, owned by one presence session
#[derive(Default)]
pub struct Roster {
    /// identity -> canonical state
    canonical: HashMap<String, PlayerState>,
    /// identity -> live source keys
    sources: HashMap<String, HashSet<SourceKey>>,
    /// source -> the identity it is bound to
    source_identity: HashMap<SourceKey, String>,
    /// source -> last full state that source reported
    source_states: HashMap<SourceKey, PlayerState>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a state record arriving from `source`. The reporting source
    /// becomes the identity's most-recent writer; its state is canonical.
    pub fn apply_state(&mut self, source: SourceKey, record: &StateRecord) -> Vec<RosterEvent> {
        let identity = record.identity.clone();

        // A source never migrates between identities; a rebind of the same
        // physical source means the old identity lost this source.
        let mut events = Vec::new();
        if let Some(previous) = self.source_identity.get(&source) {
            if *previous != identity {
                events.extend(self.remove_source(&source));
            }
        }

        self.sources
            .entry(identity.clone())
            .or_default()
            .insert(source.clone());
        self.source_identity.insert(source.clone(), identity.clone());

        let per_source = self
            .source_states
            .entry(source)
            .or_insert_with(|| PlayerState::from_record(record));
        per_source.apply_record(record);
        let snapshot = per_source.clone();

        // Speaking level outlives individual state updates
        let canonical = self.canonical.entry(identity).or_insert(snapshot);
        canonical.apply_record(record);

        events.push(RosterEvent::Updated(canonical.clone()));
        events
    }

    /// Update the speaking level for a bound identity.
    pub fn apply_speaking(&mut self, identity: &str, level: f32) -> Vec<RosterEvent> {
        let level = level.clamp(0.0, 1.0);
        let Some(state) = self.canonical.get_mut(identity) else {
            return Vec::new();
        };
        state.speaking_level = level;
        vec![RosterEvent::Speaking {
            identity: identity.to_string(),
            level,
        }]
    }

    /// Replace the room set for a bound identity.
    pub fn apply_rooms(&mut self, identity: &str, rooms: BTreeSet<String>) -> Vec<RosterEvent> {
        let Some(state) = self.canonical.get_mut(identity) else {
            return Vec::new();
        };
        state.rooms = rooms.clone();
        vec![RosterEvent::Rooms {
            identity: identity.to_string(),
            rooms,
        }]
    }

    /// Remove one physical source. If other sources remain for the same
    /// identity, canonical state falls back to one of them (selection is
    /// deliberately arbitrary); if it was the last, the identity and all
    /// its records are torn down with a single `Removed` event.
    pub fn remove_source(&mut self, source: &SourceKey) -> Vec<RosterEvent> {
        let Some(identity) = self.source_identity.remove(source) else {
            return Vec::new();
        };
        self.source_states.remove(source);

        let remaining = match self.sources.get_mut(&identity) {
            Some(set) => {
                set.remove(source);
                !set.is_empty()
            }
            None => false,
        };

        if !remaining {
            self.sources.remove(&identity);
            self.canonical.remove(&identity);
            return vec![RosterEvent::Removed { identity }];
        }

        // Fall back to any remaining source's last reported state
        let fallback = self
            .sources
            .get(&identity)
            .and_then(|set| set.iter().next())
            .and_then(|key| self.source_states.get(key))
            .cloned();

        if let Some(mut state) = fallback {
            if let Some(current) = self.canonical.get(&identity) {
                state.speaking_level = current.speaking_level;
            }
            self.canonical.insert(identity.clone(), state.clone());
            vec![RosterEvent::Updated(state)]
        } else {
            Vec::new()
        }
    }

    pub fn get(&self, identity: &str) -> Option<&PlayerState> {
        self.canonical.get(identity)
    }

    pub fn identity_of(&self, source: &SourceKey) -> Option<&str> {
        self.source_identity.get(source).map(String::as_str)
    }

    pub fn source_count(&self, identity: &str) -> usize {
        self.sources.get(identity).map(HashSet::len).unwrap_or(0)
    }

    pub fn identities(&self) -> impl Iterator<Item = &str> {
        self.canonical.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.canonical.len()
    }

    pub fn is_empty(&self) -> bool {
        self.canonical.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(identity: &str, x: f32, ts: f64) -> StateRecord {
        StateRecord {
            identity: identity.into(),
            x,
            y: 0.0,
            facing: Facing::Down,
            rooms: None,
            ts,
        }
    }

    fn remote(path: &str) -> SourceKey {
        SourceKey::Remote(path.into())
    }

    #[test]
    fn test_single_source_lifecycle() {
        let mut roster = Roster::new();

        let events = roster.apply_state(remote("a"), &record("ada", 1.0, 1.0));
        assert!(matches!(events[0], RosterEvent::Updated(ref s) if s.x == 1.0));
        assert_eq!(roster.len(), 1);

        let events = roster.remove_source(&remote("a"));
        assert_eq!(
            events,
            vec![RosterEvent::Removed {
                identity: "ada".into()
            }]
        );
        assert!(roster.is_empty());
    }

    #[test]
    fn test_dedup_fallback_to_remaining_source() {
        let mut roster = Roster::new();

        roster.apply_state(SourceKey::Local, &record("ada", 1.0, 1.0));
        roster.apply_state(remote("tab2"), &record("ada", 2.0, 2.0));
        assert_eq!(roster.source_count("ada"), 2);
        // Most recent writer is canonical
        assert_eq!(roster.get("ada").unwrap().x, 2.0);

        // Removing the canonical writer falls back to the other source
        let events = roster.remove_source(&remote("tab2"));
        assert!(matches!(events[0], RosterEvent::Updated(ref s) if s.x == 1.0));
        assert_eq!(roster.source_count("ada"), 1);

        // Removing the last source deletes the identity with one event
        let events = roster.remove_source(&SourceKey::Local);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], RosterEvent::Removed { .. }));
        assert!(roster.get("ada").is_none());
    }

    #[test]
    fn test_fallback_preserves_speaking_level() {
        let mut roster = Roster::new();
        roster.apply_state(SourceKey::Local, &record("ada", 1.0, 1.0));
        roster.apply_state(remote("b"), &record("ada", 2.0, 2.0));
        roster.apply_speaking("ada", 0.7);

        let events = roster.remove_source(&remote("b"));
        match &events[0] {
            RosterEvent::Updated(state) => assert_eq!(state.speaking_level, 0.7),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_remove_unknown_source_is_noop() {
        let mut roster = Roster::new();
        assert!(roster.remove_source(&remote("ghost")).is_empty());
    }

    #[test]
    fn test_speaking_and_rooms_need_bound_identity() {
        let mut roster = Roster::new();
        assert!(roster.apply_speaking("ada", 0.5).is_empty());
        assert!(roster.apply_rooms("ada", BTreeSet::new()).is_empty());

        roster.apply_state(remote("a"), &record("ada", 0.0, 1.0));
        assert_eq!(roster.apply_speaking("ada", 0.5).len(), 1);
        assert_eq!(roster.get("ada").unwrap().speaking_level, 0.5);
    }

    #[test]
    fn test_source_rebinding_identity_releases_old_one() {
        let mut roster = Roster::new();
        roster.apply_state(remote("a"), &record("ada", 0.0, 1.0));

        let events = roster.apply_state(remote("a"), &record("bob", 0.0, 2.0));
        assert!(events
            .iter()
            .any(|e| matches!(e, RosterEvent::Removed { identity } if identity == "ada")));
        assert!(roster.get("ada").is_none());
        assert!(roster.get("bob").is_some());
    }

    #[test]
    fn test_rooms_carried_by_state_record() {
        let mut roster = Roster::new();
        let mut r = record("ada", 0.0, 1.0);
        r.rooms = Some(["lobby".to_string()].into());
        roster.apply_state(remote("a"), &r);
        assert!(roster.get("ada").unwrap().rooms.contains("lobby"));

        // A later record without rooms keeps the known set
        roster.apply_state(remote("a"), &record("ada", 1.0, 2.0));
        assert!(roster.get("ada").unwrap().rooms.contains("lobby"));
    }
}
