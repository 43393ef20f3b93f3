//! Structured presence records
//!
//! Small JSON records exchanged on the state, rooms and speaking tracks.
//! Parsing is defensive throughout: a record missing required numeric
//! fields, carrying non-finite values, or using an out-of-range facing is
//! dropped ([`None`]) and the stream continues.

use serde_json::{json, Value};
use std::collections::BTreeSet;

/// One of four discrete movement directions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facing {
    Up,
    Down,
    Left,
    Right,
}

impl Facing {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Facing::Up),
            1 => Some(Facing::Down),
            2 => Some(Facing::Left),
            3 => Some(Facing::Right),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Facing::Up => 0,
            Facing::Down => 1,
            Facing::Left => 2,
            Facing::Right => 3,
        }
    }
}

/// Current timestamp for outgoing records, unix milliseconds
pub fn now_ts() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64
}

fn finite_f32(value: &Value) -> Option<f32> {
    let f = value.as_f64()?;
    if !f.is_finite() {
        return None;
    }
    Some(f as f32)
}

fn string_set(value: &Value) -> Option<BTreeSet<String>> {
    let array = value.as_array()?;
    let mut set = BTreeSet::new();
    for item in array {
        set.insert(item.as_str()?.to_string());
    }
    Some(set)
}

/// Position/facing/rooms record on the state track
#[derive(Debug, Clone, PartialEq)]
pub struct StateRecord {
    pub identity: String,
    pub x: f32,
    pub y: f32,
    pub facing: Facing,
    /// Room membership, when the record carries it
    pub rooms: Option<BTreeSet<String>>,
    pub ts: f64,
}

impl StateRecord {
    pub fn parse(value: &Value) -> Option<Self> {
        let identity = value.get("identity")?.as_str()?;
        if identity.is_empty() {
            return None;
        }
        let x = finite_f32(value.get("x")?)?;
        let y = finite_f32(value.get("y")?)?;
        let facing_raw = value.get("facing")?.as_u64()?;
        let facing = Facing::from_u8(u8::try_from(facing_raw).ok()?)?;
        let ts = value.get("ts")?.as_f64()?;

        // Either a single room or a room list; both optional
        let rooms = match (value.get("rooms"), value.get("room")) {
            (Some(list), _) => Some(string_set(list)?),
            (None, Some(single)) => {
                let mut set = BTreeSet::new();
                set.insert(single.as_str()?.to_string());
                Some(set)
            }
            (None, None) => None,
        };

        Some(Self {
            identity: identity.to_string(),
            x,
            y,
            facing,
            rooms,
            ts,
        })
    }

    pub fn to_value(&self) -> Value {
        let mut value = json!({
            "identity": self.identity,
            "x": self.x,
            "y": self.y,
            "facing": self.facing.as_u8(),
            "ts": self.ts,
        });
        if let Some(rooms) = &self.rooms {
            value["rooms"] = json!(rooms.iter().collect::<Vec<_>>());
        }
        value
    }
}

/// Room membership record
#[derive(Debug, Clone, PartialEq)]
pub struct RoomsRecord {
    pub rooms: BTreeSet<String>,
    pub ts: f64,
}

impl RoomsRecord {
    pub fn parse(value: &Value) -> Option<Self> {
        Some(Self {
            rooms: string_set(value.get("rooms")?)?,
            ts: value.get("ts")?.as_f64()?,
        })
    }

    pub fn to_value(&self) -> Value {
        json!({
            "rooms": self.rooms.iter().collect::<Vec<_>>(),
            "ts": self.ts,
        })
    }
}

/// Speaking level record, level in 0..=1
#[derive(Debug, Clone, PartialEq)]
pub struct SpeakingRecord {
    pub level: f32,
    pub ts: f64,
}

impl SpeakingRecord {
    pub fn parse(value: &Value) -> Option<Self> {
        let level = finite_f32(value.get("level")?)?;
        if !(0.0..=1.0).contains(&level) {
            return None;
        }
        Some(Self {
            level,
            ts: value.get("ts")?.as_f64()?,
        })
    }

    pub fn to_value(&self) -> Value {
        json!({ "level": self.level, "ts": self.ts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_roundtrip() {
        let record = StateRecord {
            identity: "ada".into(),
            x: 3.5,
            y: -1.0,
            facing: Facing::Left,
            rooms: Some(["lobby".to_string()].into()),
            ts: 1000.0,
        };
        let parsed = StateRecord::parse(&record.to_value()).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_state_accepts_single_room_field() {
        let value = json!({
            "identity": "ada", "x": 0.0, "y": 0.0, "facing": 1,
            "room": "lobby", "ts": 1.0
        });
        let parsed = StateRecord::parse(&value).unwrap();
        assert!(parsed.rooms.unwrap().contains("lobby"));
    }

    #[test]
    fn test_state_rejects_malformed() {
        // Missing x
        assert!(StateRecord::parse(&json!({
            "identity": "ada", "y": 0.0, "facing": 0, "ts": 1.0
        }))
        .is_none());
        // Out-of-range facing
        assert!(StateRecord::parse(&json!({
            "identity": "ada", "x": 0.0, "y": 0.0, "facing": 4, "ts": 1.0
        }))
        .is_none());
        // Non-finite position
        assert!(StateRecord::parse(&json!({
            "identity": "ada", "x": "nope", "y": 0.0, "facing": 0, "ts": 1.0
        }))
        .is_none());
        // Empty identity
        assert!(StateRecord::parse(&json!({
            "identity": "", "x": 0.0, "y": 0.0, "facing": 0, "ts": 1.0
        }))
        .is_none());
    }

    #[test]
    fn test_speaking_range() {
        assert!(SpeakingRecord::parse(&json!({"level": 0.5, "ts": 1.0})).is_some());
        assert!(SpeakingRecord::parse(&json!({"level": 1.5, "ts": 1.0})).is_none());
        assert!(SpeakingRecord::parse(&json!({"level": -0.1, "ts": 1.0})).is_none());
        assert!(SpeakingRecord::parse(&json!({"ts": 1.0})).is_none());
    }

    #[test]
    fn test_rooms_rejects_non_string_entries() {
        assert!(RoomsRecord::parse(&json!({"rooms": ["a", 3], "ts": 1.0})).is_none());
        let parsed = RoomsRecord::parse(&json!({"rooms": ["a", "b"], "ts": 1.0})).unwrap();
        assert_eq!(parsed.rooms.len(), 2);
    }
}
