//! Presence synchronization protocol
//!
//! Tracks the local player and every announced remote peer, deduplicates
//! multiple physical sources per identity, prunes stale subscriptions, and
//! throttles local re-broadcast. One [`PresenceSync`] instance owns all
//! protocol state; nothing here is ambient or global.

pub mod backoff;
pub mod records;
pub mod roster;
pub mod session;

pub use backoff::Backoff;
pub use records::{Facing, RoomsRecord, SpeakingRecord, StateRecord};
pub use roster::{PlayerState, Roster, RosterEvent, SourceKey};
pub use session::{PresenceEvent, PresenceHandle, PresenceSession, PresenceSync, SessionOptions};

/// Track names within one peer's broadcast
pub const TRACK_STATE: &str = "state";
pub const TRACK_AUDIO: &str = "audio";
pub const TRACK_SPEAKING: &str = "speaking";
pub const TRACK_ROOMS: &str = "rooms";
