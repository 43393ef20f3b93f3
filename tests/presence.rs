//! Presence protocol integration tests
//!
//! Full sessions wired over the in-memory relay, driven on tokio's
//! paused clock so heartbeats, sweeps and backoff run in virtual time.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use voicegrid::audio::playback::{JitterPlayback, ManualClock, NullSink};
use voicegrid::config::{PresenceConfig, RetryConfig};
use voicegrid::presence::{Facing, PresenceEvent, PresenceSession, PresenceSync, SessionOptions};
use voicegrid::transport::{MemoryRelay, Relay};

const PREFIX: &str = "voicegrid/test/";

fn test_config() -> PresenceConfig {
    PresenceConfig {
        heartbeat_ms: 1000,
        speaking_interval_ms: 150,
        sweep_interval_ms: 1000,
        stale_timeout_ms: 5000,
        position_epsilon: 0.25,
        retry: RetryConfig {
            base_ms: 50,
            cap_ms: 200,
            jitter: 0.4,
            max_attempts: 3,
        },
    }
}

fn playback() -> Arc<JitterPlayback> {
    Arc::new(JitterPlayback::new(
        Arc::new(ManualClock::new()),
        Arc::new(NullSink),
        0.12,
    ))
}

async fn start_session(relay: &Arc<dyn Relay>, identity: &str) -> PresenceSession {
    PresenceSync::start(
        relay.clone(),
        SessionOptions {
            identity: identity.into(),
            prefix: PREFIX.into(),
            config: test_config(),
        },
        playback(),
    )
    .await
    .expect("session starts")
}

/// Drain events until one matches, failing after `secs` of virtual time.
async fn wait_for(
    session: &mut PresenceSession,
    secs: u64,
    pred: impl Fn(&PresenceEvent) -> bool,
) -> PresenceEvent {
    tokio::time::timeout(Duration::from_secs(secs), async {
        loop {
            let event = session.next_event().await.expect("session alive");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("event within deadline")
}

/// Drain events for `secs` of virtual time, failing if one matches.
async fn expect_none(
    session: &mut PresenceSession,
    secs: u64,
    pred: impl Fn(&PresenceEvent) -> bool,
) {
    let result = tokio::time::timeout(Duration::from_secs(secs), async {
        loop {
            let event = session.next_event().await.expect("session alive");
            if pred(&event) {
                return event;
            }
        }
    })
    .await;
    if let Ok(event) = result {
        panic!("unexpected event: {event:?}");
    }
}

fn is_update_for(event: &PresenceEvent, identity: &str) -> bool {
    matches!(event, PresenceEvent::PlayerUpdated(state) if state.identity == identity)
}

fn is_removal_of(event: &PresenceEvent, identity: &str) -> bool {
    matches!(event, PresenceEvent::PlayerRemoved { identity: id } if id == identity)
}

#[tokio::test(start_paused = true)]
async fn test_peers_discover_each_other() {
    let relay: Arc<dyn Relay> = Arc::new(MemoryRelay::new());
    let ada = start_session(&relay, "ada").await;
    let mut bela = start_session(&relay, "bela").await;

    ada.handle().set_position(3.0, -2.0, Facing::Left).unwrap();

    let event = wait_for(&mut bela, 10, |e| is_update_for(e, "ada")).await;
    match event {
        PresenceEvent::PlayerUpdated(state) => {
            assert_eq!(state.identity, "ada");
        }
        other => panic!("expected update, got {other:?}"),
    }

    // Heartbeats keep flowing; eventually the position lands too
    wait_for(&mut bela, 10, |e| {
        matches!(e, PresenceEvent::PlayerUpdated(s)
            if s.identity == "ada" && s.x == 3.0 && s.y == -2.0)
    })
    .await;

    let players = bela.players();
    assert!(players.contains_key("ada"));
    assert!(players.contains_key("bela"), "local player is tracked too");

    ada.shutdown().await;
    bela.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_same_identity_from_two_sources_is_one_player() {
    let relay: Arc<dyn Relay> = Arc::new(MemoryRelay::new());
    let ada_desk = start_session(&relay, "ada").await;
    let ada_phone = start_session(&relay, "ada").await;
    let mut observer = start_session(&relay, "olo").await;

    wait_for(&mut observer, 10, |e| is_update_for(e, "ada")).await;
    assert_eq!(
        observer.players().keys().filter(|k| *k == "ada").count(),
        1,
        "two sources, one player entry"
    );

    // One source leaving falls back to the other; the player survives
    ada_desk.shutdown().await;
    expect_none(&mut observer, 3, |e| is_removal_of(e, "ada")).await;
    assert!(observer.players().contains_key("ada"));

    // The last source leaving removes the player, exactly once
    ada_phone.shutdown().await;
    wait_for(&mut observer, 10, |e| is_removal_of(e, "ada")).await;
    assert!(!observer.players().contains_key("ada"));
    expect_none(&mut observer, 3, |e| is_removal_of(e, "ada")).await;

    observer.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_silent_peer_is_pruned() {
    let relay = MemoryRelay::new();
    let dyn_relay: Arc<dyn Relay> = Arc::new(relay.clone());
    let mut observer = start_session(&dyn_relay, "olo").await;

    // A peer that says hello once and then goes silent
    let path = format!("{PREFIX}ghost-1");
    let publisher = dyn_relay.publish(&path).await.unwrap();
    let state = publisher.open_track("state").unwrap();
    let write_hello = |ts: f64| {
        state
            .write_json(&json!({
                "identity": "ghost", "x": 0.0, "y": 0.0, "facing": 0, "ts": ts,
            }))
            .unwrap()
    };

    // The observer subscribes after the announce; repeat the record until
    // it lands
    let seen = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            write_hello(1.0);
            tokio::time::sleep(Duration::from_millis(200)).await;
            if observer.players().contains_key("ghost") {
                return;
            }
        }
    })
    .await;
    assert!(seen.is_ok(), "ghost never appeared");

    // Silence for longer than the stale timeout prunes the player even
    // though its announce is still active
    wait_for(&mut observer, 10, |e| is_removal_of(e, "ghost")).await;
    assert!(relay.active_paths().contains(&path));
    assert!(!observer.players().contains_key("ghost"));

    observer.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_reset_storm_exhausts_retries() {
    let relay = MemoryRelay::new();
    let dyn_relay: Arc<dyn Relay> = Arc::new(relay.clone());
    let mut observer = start_session(&dyn_relay, "olo").await;

    let path = format!("{PREFIX}flaky-1");
    let _publisher = dyn_relay.publish(&path).await.unwrap();

    // Reset every read attempt until the retry budget (3) runs out
    let reset_relay = relay.clone();
    let reset_path = path.clone();
    let storm = tokio::spawn(async move {
        loop {
            reset_relay.inject_reset(&reset_path);
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    });

    let event = wait_for(&mut observer, 30, |e| {
        matches!(e, PresenceEvent::SubscriptionClosed { .. })
    })
    .await;
    assert_eq!(
        event,
        PresenceEvent::SubscriptionClosed { path: path.clone() }
    );
    storm.abort();

    // The path stays abandoned: a well-behaved speaker at the same path
    // is never heard again
    let state = _publisher.open_track("state").unwrap();
    let probe = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let _ = state.write_json(&json!({
                "identity": "flaky", "x": 0.0, "y": 0.0, "facing": 0, "ts": 1.0,
            }));
            tokio::time::sleep(Duration::from_millis(200)).await;
            if observer.players().contains_key("flaky") {
                return;
            }
        }
    })
    .await;
    assert!(probe.is_err(), "abandoned subscription came back");

    observer.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_backoff_longer_than_stale_timeout_still_exhausts() {
    let relay = MemoryRelay::new();
    let dyn_relay: Arc<dyn Relay> = Arc::new(relay.clone());

    // Every retry sleep outlasts the staleness window
    let mut config = test_config();
    config.stale_timeout_ms = 300;
    config.sweep_interval_ms = 100;
    config.retry = RetryConfig {
        base_ms: 500,
        cap_ms: 500,
        jitter: 0.0,
        max_attempts: 3,
    };
    let mut observer = PresenceSync::start(
        dyn_relay.clone(),
        SessionOptions {
            identity: "olo".into(),
            prefix: PREFIX.into(),
            config,
        },
        playback(),
    )
    .await
    .expect("session starts");

    let path = format!("{PREFIX}flaky-2");
    let _publisher = dyn_relay.publish(&path).await.unwrap();

    let reset_relay = relay.clone();
    let reset_path = path.clone();
    let storm = tokio::spawn(async move {
        loop {
            reset_relay.inject_reset(&reset_path);
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    });

    // A sub waiting out its backoff must not be swept as stale; the
    // retry sequence runs to exhaustion and reports the closure.
    let event = wait_for(&mut observer, 30, |e| {
        matches!(e, PresenceEvent::SubscriptionClosed { .. })
    })
    .await;
    assert_eq!(event, PresenceEvent::SubscriptionClosed { path });
    storm.abort();

    observer.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_rooms_before_identity_are_buffered() {
    let relay: Arc<dyn Relay> = Arc::new(MemoryRelay::new());
    let mut observer = start_session(&relay, "olo").await;

    let path = format!("{PREFIX}ghost-2");
    let publisher = relay.publish(&path).await.unwrap();
    let rooms = publisher.open_track("rooms").unwrap();
    let state = publisher.open_track("state").unwrap();

    // Rooms arrive before any state record names the identity
    let fed = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let _ = rooms.write_json(&json!({ "rooms": ["den"], "ts": 1.0 }));
            tokio::time::sleep(Duration::from_millis(100)).await;
            let _ = state.write_json(&json!({
                "identity": "ghost", "x": 1.0, "y": 1.0, "facing": 2, "ts": 2.0,
            }));
            tokio::time::sleep(Duration::from_millis(100)).await;
            let players = observer.players();
            if let Some(ghost) = players.get("ghost") {
                if ghost.rooms.contains("den") {
                    return;
                }
            }
        }
    })
    .await;
    assert!(fed.is_ok(), "buffered rooms never applied after binding");

    let expected: BTreeSet<String> = ["den".to_string()].into();
    assert_eq!(observer.players()["ghost"].rooms, expected);

    observer.shutdown().await;
}
