//! The presence session loop
//!
//! One task owns every presence map. Subscription readers, retry timers
//! and the local publish throttles all funnel into this loop through
//! channels, so map mutation never needs a lock. Audio frames bypass the
//! loop: each subscription reader decodes and enqueues into its own
//! playback lane, preserving per-source arrival order.

use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::audio::playback::JitterPlayback;
use crate::codec::DecodePipeline;
use crate::config::PresenceConfig;
use crate::error::{Error, PresenceError, TransportError};
use crate::presence::backoff::Backoff;
use crate::presence::records::{now_ts, Facing, RoomsRecord, SpeakingRecord, StateRecord};
use crate::presence::roster::{PlayerState, Roster, RosterEvent, SourceKey};
use crate::presence::{TRACK_AUDIO, TRACK_ROOMS, TRACK_SPEAKING, TRACK_STATE};
use crate::transport::{AnnounceStream, BroadcastPublisher, Relay, TrackWriter};

/// Session construction parameters
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Logical participant id this session speaks for
    pub identity: String,
    /// Namespace prefix all peers of this space announce under
    pub prefix: String,
    pub config: PresenceConfig,
}

/// Notifications delivered to the embedding application
#[derive(Debug, Clone, PartialEq)]
pub enum PresenceEvent {
    PlayerUpdated(PlayerState),
    PlayerRemoved { identity: String },
    SpeakingChanged { identity: String, level: f32 },
    RoomsChanged {
        identity: String,
        rooms: BTreeSet<String>,
    },
    /// A subscription exhausted its retry budget and will not return.
    SubscriptionClosed { path: String },
}

enum Command {
    SetPosition { x: f32, y: f32, facing: Facing },
    SetRooms(BTreeSet<String>),
    SetSpeaking(f32),
    Shutdown,
}

/// Cheap clonable handle for feeding local state into the session
#[derive(Clone)]
pub struct PresenceHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl PresenceHandle {
    pub fn set_position(&self, x: f32, y: f32, facing: Facing) -> Result<(), PresenceError> {
        self.send(Command::SetPosition { x, y, facing })
    }

    pub fn set_rooms(&self, rooms: BTreeSet<String>) -> Result<(), PresenceError> {
        self.send(Command::SetRooms(rooms))
    }

    pub fn set_speaking(&self, level: f32) -> Result<(), PresenceError> {
        self.send(Command::SetSpeaking(level))
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(Command::Shutdown);
    }

    fn send(&self, command: Command) -> Result<(), PresenceError> {
        self.tx
            .send(command)
            .map_err(|_| PresenceError::SessionClosed)
    }
}

enum SubEvent {
    State { path: String, record: StateRecord },
    Rooms { path: String, record: RoomsRecord },
    Speaking { path: String, record: SpeakingRecord },
    /// Activity with no record payload (audio frames)
    Seen { path: String },
    Ended {
        path: String,
        error: Option<TransportError>,
    },
    RetryDue { path: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubPhase {
    Subscribing,
    Active,
    Retrying,
}

struct Sub {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    last_seen: Instant,
    bound: Option<String>,
    /// Rooms seen before the identity was known
    pending_rooms: Option<BTreeSet<String>>,
    attempts: u32,
    phase: SubPhase,
}

struct LocalState {
    x: f32,
    y: f32,
    facing: Facing,
    rooms: BTreeSet<String>,
    speaking: f32,
}

/// A running presence session
pub struct PresenceSession {
    handle: PresenceHandle,
    events: mpsc::UnboundedReceiver<PresenceEvent>,
    players: Arc<RwLock<HashMap<String, PlayerState>>>,
    audio_writer: Arc<dyn TrackWriter>,
    own_path: String,
    cancel: CancellationToken,
    task: JoinHandle<()>,
    // Keeps the broadcast announced; dropping it unannounces.
    _publisher: Box<dyn BroadcastPublisher>,
}

impl PresenceSession {
    pub fn handle(&self) -> PresenceHandle {
        self.handle.clone()
    }

    /// Next presence event; `None` after shutdown.
    pub async fn next_event(&mut self) -> Option<PresenceEvent> {
        self.events.recv().await
    }

    /// Snapshot of every tracked player's canonical state.
    pub fn players(&self) -> HashMap<String, PlayerState> {
        self.players.read().clone()
    }

    /// Writer for the local audio track.
    pub fn audio_writer(&self) -> Arc<dyn TrackWriter> {
        self.audio_writer.clone()
    }

    /// Broadcast path this session publishes at.
    pub fn own_path(&self) -> &str {
        &self.own_path
    }

    /// Intentional teardown: cancels every task, closes every
    /// subscription, and unannounces the local broadcast. No reconnects.
    pub async fn shutdown(self) {
        self.handle.shutdown();
        self.cancel.cancel();
        let _ = self.task.await;
    }
}

/// The protocol core; owns every presence map for one session
pub struct PresenceSync {
    relay: Arc<dyn Relay>,
    options: SessionOptions,
    own_path: String,
    backoff: Backoff,
    roster: Roster,
    subs: HashMap<String, Sub>,
    /// Paths abandoned after retry exhaustion; never resubscribed.
    closed: HashSet<String>,
    announced_active: HashSet<String>,
    playback: Arc<JitterPlayback>,
    players: Arc<RwLock<HashMap<String, PlayerState>>>,
    event_tx: mpsc::UnboundedSender<PresenceEvent>,
    sub_tx: mpsc::UnboundedSender<SubEvent>,
    sub_rx: mpsc::UnboundedReceiver<SubEvent>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    cancel: CancellationToken,
    state_writer: Arc<dyn TrackWriter>,
    speaking_writer: Arc<dyn TrackWriter>,
    rooms_writer: Arc<dyn TrackWriter>,
    local: LocalState,
    last_sent_state: Option<StateRecord>,
    last_sent_level: Option<f32>,
    shutting_down: bool,
}

impl PresenceSync {
    /// Publish the local broadcast, start watching announcements, and
    /// spawn the session loop.
    pub async fn start(
        relay: Arc<dyn Relay>,
        options: SessionOptions,
        playback: Arc<JitterPlayback>,
    ) -> Result<PresenceSession, Error> {
        let session_id = uuid::Uuid::new_v4().simple().to_string();
        let own_path = format!("{}{}-{}", options.prefix, options.identity, &session_id[..8]);

        let publisher = relay.publish(&own_path).await.map_err(Error::Transport)?;
        let state_writer: Arc<dyn TrackWriter> =
            Arc::from(publisher.open_track(TRACK_STATE).map_err(Error::Transport)?);
        let speaking_writer: Arc<dyn TrackWriter> =
            Arc::from(publisher.open_track(TRACK_SPEAKING).map_err(Error::Transport)?);
        let rooms_writer: Arc<dyn TrackWriter> =
            Arc::from(publisher.open_track(TRACK_ROOMS).map_err(Error::Transport)?);
        let audio_writer: Arc<dyn TrackWriter> =
            Arc::from(publisher.open_track(TRACK_AUDIO).map_err(Error::Transport)?);

        let announced = relay
            .announced(&options.prefix)
            .await
            .map_err(Error::Transport)?;

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (sub_tx, sub_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let players = Arc::new(RwLock::new(HashMap::new()));

        let sync = PresenceSync {
            relay,
            backoff: Backoff::new(options.config.retry.clone()),
            own_path: own_path.clone(),
            options,
            roster: Roster::new(),
            subs: HashMap::new(),
            closed: HashSet::new(),
            announced_active: HashSet::new(),
            playback,
            players: players.clone(),
            event_tx,
            sub_tx,
            sub_rx,
            cmd_rx,
            cancel: cancel.clone(),
            state_writer,
            speaking_writer,
            rooms_writer,
            local: LocalState {
                x: 0.0,
                y: 0.0,
                facing: Facing::Down,
                rooms: BTreeSet::new(),
                speaking: 0.0,
            },
            last_sent_state: None,
            last_sent_level: None,
            shutting_down: false,
        };

        let task = tokio::spawn(sync.run(announced));

        Ok(PresenceSession {
            handle: PresenceHandle { tx: cmd_tx },
            events: event_rx,
            players,
            audio_writer,
            own_path,
            cancel,
            task,
            _publisher: publisher,
        })
    }

    async fn run(mut self, mut announced: Box<dyn AnnounceStream>) {
        let config = self.options.config.clone();
        let mut sweep = tokio::time::interval(Duration::from_millis(config.sweep_interval_ms));
        let mut heartbeat = tokio::time::interval(Duration::from_millis(config.heartbeat_ms));
        let mut speaking = tokio::time::interval(Duration::from_millis(config.speaking_interval_ms));
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        speaking.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        // The local session is a source like any other
        let initial = self.local_record();
        let events = self.roster.apply_state(SourceKey::Local, &initial);
        self.emit_all(events);

        let mut announce_open = true;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    self.teardown();
                    break;
                }
                event = announced.next(), if announce_open => {
                    match event {
                        Some(event) => self.on_announce(event.path, event.active),
                        None => {
                            tracing::warn!("Announce stream ended; no new peers will appear");
                            announce_open = false;
                        }
                    }
                }
                Some(event) = self.sub_rx.recv() => self.on_sub_event(event),
                Some(command) = self.cmd_rx.recv() => {
                    if self.on_command(command) {
                        self.teardown();
                        break;
                    }
                }
                _ = sweep.tick() => self.sweep(),
                _ = heartbeat.tick() => self.send_state(true),
                _ = speaking.tick() => self.send_speaking(),
            }
        }
    }

    fn on_announce(&mut self, path: String, active: bool) {
        if path == self.own_path {
            return;
        }

        if active {
            self.announced_active.insert(path.clone());
            if self.closed.contains(&path) {
                tracing::debug!(%path, "ignoring announce for abandoned subscription");
                return;
            }
            if self.subs.contains_key(&path) {
                return;
            }
            tracing::info!(%path, "peer announced, subscribing");
            self.spawn_subscription(path);
        } else {
            self.announced_active.remove(&path);
            if self.subs.contains_key(&path) {
                tracing::info!(%path, "peer unannounced");
                self.remove_subscription(&path);
            }
        }
    }

    fn spawn_subscription(&mut self, path: String) {
        let cancel = self.cancel.child_token();
        let task = tokio::spawn(run_subscription(
            self.relay.clone(),
            path.clone(),
            self.sub_tx.clone(),
            self.playback.clone(),
            cancel.clone(),
        ));
        self.subs.insert(
            path,
            Sub {
                cancel,
                task,
                last_seen: Instant::now(),
                bound: None,
                pending_rooms: None,
                attempts: 0,
                phase: SubPhase::Subscribing,
            },
        );
    }

    /// Tear one subscription down as if its announce had gone inactive.
    fn remove_subscription(&mut self, path: &str) {
        if let Some(sub) = self.subs.remove(path) {
            sub.cancel.cancel();
            sub.task.abort();
        }
        let key = SourceKey::Remote(path.to_string());
        self.playback.close(&key.to_string());
        let events = self.roster.remove_source(&key);
        self.emit_all(events);
    }

    fn on_sub_event(&mut self, event: SubEvent) {
        match event {
            SubEvent::State { path, record } => {
                let Some(sub) = self.subs.get_mut(&path) else { return };
                sub.last_seen = Instant::now();
                sub.attempts = 0;
                sub.phase = SubPhase::Active;

                // Identity binding happens at the first valid state record
                let identity = record.identity.clone();
                let rebound = sub.bound.as_deref() != Some(identity.as_str());
                sub.bound = Some(identity.clone());
                let pending = if rebound { sub.pending_rooms.take() } else { None };

                let events = self
                    .roster
                    .apply_state(SourceKey::Remote(path), &record);
                self.emit_all(events);

                if let Some(rooms) = pending {
                    let events = self.roster.apply_rooms(&identity, rooms);
                    self.emit_all(events);
                }
            }
            SubEvent::Rooms { path, record } => {
                let Some(sub) = self.subs.get_mut(&path) else { return };
                sub.last_seen = Instant::now();
                sub.attempts = 0;
                match sub.bound.clone() {
                    Some(identity) => {
                        let events = self.roster.apply_rooms(&identity, record.rooms);
                        self.emit_all(events);
                    }
                    // Buffered until the identity is known
                    None => sub.pending_rooms = Some(record.rooms),
                }
            }
            SubEvent::Speaking { path, record } => {
                let Some(sub) = self.subs.get_mut(&path) else { return };
                sub.last_seen = Instant::now();
                sub.attempts = 0;
                if let Some(identity) = sub.bound.clone() {
                    let events = self.roster.apply_speaking(&identity, record.level);
                    self.emit_all(events);
                }
            }
            SubEvent::Seen { path } => {
                if let Some(sub) = self.subs.get_mut(&path) {
                    sub.last_seen = Instant::now();
                }
            }
            SubEvent::Ended { path, error } => self.on_sub_ended(path, error),
            SubEvent::RetryDue { path } => self.on_retry_due(path),
        }
    }

    fn on_sub_ended(&mut self, path: String, error: Option<TransportError>) {
        if self.shutting_down {
            return;
        }

        let transient = error.as_ref().map(|e| e.is_transient()).unwrap_or(false);
        if !transient {
            // Clean close: the publisher went away
            if self.subs.contains_key(&path) {
                tracing::debug!(%path, "subscription ended");
                self.remove_subscription(&path);
            }
            return;
        }

        let Some(sub) = self.subs.get_mut(&path) else { return };
        sub.attempts += 1;
        if self.backoff.exhausted(sub.attempts) {
            let error = PresenceError::RetriesExhausted {
                path: path.clone(),
                attempts: sub.attempts,
            };
            tracing::warn!("Abandoning subscription: {}", error);
            self.closed.insert(path.clone());
            self.remove_subscription(&path);
            let _ = self
                .event_tx
                .send(PresenceEvent::SubscriptionClosed { path });
            return;
        }

        sub.phase = SubPhase::Retrying;
        let delay = self.backoff.delay(sub.attempts - 1);
        tracing::debug!(%path, attempt = sub.attempts, ?delay, "scheduling resubscribe");

        let sub_tx = self.sub_tx.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = sub_tx.send(SubEvent::RetryDue { path });
                }
            }
        });
    }

    fn on_retry_due(&mut self, path: String) {
        if self.shutting_down || self.closed.contains(&path) {
            return;
        }
        let Some(sub) = self.subs.get_mut(&path) else { return };
        if sub.phase != SubPhase::Retrying {
            return;
        }
        if !self.announced_active.contains(&path) {
            // Announce went inactive while we were waiting
            self.remove_subscription(&path);
            return;
        }

        let cancel = self.cancel.child_token();
        sub.cancel = cancel.clone();
        sub.task = tokio::spawn(run_subscription(
            self.relay.clone(),
            path.clone(),
            self.sub_tx.clone(),
            self.playback.clone(),
            cancel,
        ));
        // The reconnect attempt counts as activity for the staleness timer
        sub.last_seen = Instant::now();
        sub.phase = SubPhase::Subscribing;
    }

    fn sweep(&mut self) {
        let timeout = Duration::from_millis(self.options.config.stale_timeout_ms);
        let now = Instant::now();
        let stale: Vec<String> = self
            .subs
            .iter()
            // A sub mid-backoff has no reader refreshing last_seen; retry
            // exhaustion abandons it, not the staleness timer.
            .filter(|(_, sub)| {
                sub.phase != SubPhase::Retrying
                    && now.duration_since(sub.last_seen) > timeout
            })
            .map(|(path, _)| path.clone())
            .collect();
        for path in stale {
            tracing::info!(%path, "pruning stale subscription");
            self.remove_subscription(&path);
        }
    }

    fn on_command(&mut self, command: Command) -> bool {
        match command {
            Command::SetPosition { x, y, facing } => {
                self.local.x = x;
                self.local.y = y;
                self.local.facing = facing;
                let record = self.local_record();
                let events = self.roster.apply_state(SourceKey::Local, &record);
                self.emit_all(events);
                self.send_state(false);
                false
            }
            Command::SetRooms(rooms) => {
                self.local.rooms = rooms.clone();
                let identity = self.options.identity.clone();
                let events = self.roster.apply_rooms(&identity, rooms.clone());
                self.emit_all(events);
                let record = RoomsRecord { rooms, ts: now_ts() };
                if let Err(e) = self.rooms_writer.write_json(&record.to_value()) {
                    tracing::warn!("Failed to publish rooms: {}", e);
                }
                self.send_state(false);
                false
            }
            Command::SetSpeaking(level) => {
                self.local.speaking = level.clamp(0.0, 1.0);
                let identity = self.options.identity.clone();
                let events = self.roster.apply_speaking(&identity, self.local.speaking);
                self.emit_all(events);
                false
            }
            Command::Shutdown => true,
        }
    }

    fn local_record(&self) -> StateRecord {
        StateRecord {
            identity: self.options.identity.clone(),
            x: self.local.x,
            y: self.local.y,
            facing: self.local.facing,
            rooms: Some(self.local.rooms.clone()),
            ts: now_ts(),
        }
    }

    /// Publish the local state record. When `heartbeat` is false the send
    /// is suppressed unless the state moved past the epsilon/equality
    /// thresholds since the last send.
    fn send_state(&mut self, heartbeat: bool) {
        let record = self.local_record();
        if !heartbeat {
            if let Some(last) = &self.last_sent_state {
                if !state_changed(last, &record, self.options.config.position_epsilon) {
                    return;
                }
            }
        }
        if let Err(e) = self.state_writer.write_json(&record.to_value()) {
            tracing::warn!("Failed to publish state: {}", e);
            return;
        }
        self.last_sent_state = Some(record);
    }

    /// Publish the speaking level if it changed since the last send.
    fn send_speaking(&mut self) {
        if self.last_sent_level == Some(self.local.speaking) {
            return;
        }
        let record = SpeakingRecord {
            level: self.local.speaking,
            ts: now_ts(),
        };
        if let Err(e) = self.speaking_writer.write_json(&record.to_value()) {
            tracing::warn!("Failed to publish speaking level: {}", e);
            return;
        }
        self.last_sent_level = Some(self.local.speaking);
    }

    fn emit_all(&mut self, events: Vec<RosterEvent>) {
        for event in events {
            let event = match event {
                RosterEvent::Updated(state) => {
                    self.players
                        .write()
                        .insert(state.identity.clone(), state.clone());
                    PresenceEvent::PlayerUpdated(state)
                }
                RosterEvent::Removed { identity } => {
                    self.players.write().remove(&identity);
                    PresenceEvent::PlayerRemoved { identity }
                }
                RosterEvent::Speaking { identity, level } => {
                    if let Some(state) = self.players.write().get_mut(&identity) {
                        state.speaking_level = level;
                    }
                    PresenceEvent::SpeakingChanged { identity, level }
                }
                RosterEvent::Rooms { identity, rooms } => {
                    if let Some(state) = self.players.write().get_mut(&identity) {
                        state.rooms = rooms.clone();
                    }
                    PresenceEvent::RoomsChanged { identity, rooms }
                }
            };
            let _ = self.event_tx.send(event);
        }
    }

    fn teardown(&mut self) {
        self.shutting_down = true;
        for (_, sub) in self.subs.drain() {
            sub.cancel.cancel();
            sub.task.abort();
        }
        for source in self.playback.sources() {
            self.playback.close(&source);
        }
        tracing::info!(path = %self.own_path, "presence session closed");
    }
}

/// Epsilon comparison on position, exact on facing and room set
fn state_changed(last: &StateRecord, next: &StateRecord, epsilon: f32) -> bool {
    (last.x - next.x).abs() > epsilon
        || (last.y - next.y).abs() > epsilon
        || last.facing != next.facing
        || last.rooms != next.rooms
}

/// Reader task for one remote subscription. Forwards records to the
/// session loop; decodes audio straight into this source's playback lane.
async fn run_subscription(
    relay: Arc<dyn Relay>,
    path: String,
    sub_tx: mpsc::UnboundedSender<SubEvent>,
    playback: Arc<JitterPlayback>,
    cancel: CancellationToken,
) {
    let result = subscription_loop(&relay, &path, &sub_tx, &playback, &cancel).await;
    let error = match result {
        Ok(()) => None,
        Err(e) => Some(e),
    };
    let _ = sub_tx.send(SubEvent::Ended { path, error });
}

async fn subscription_loop(
    relay: &Arc<dyn Relay>,
    path: &str,
    sub_tx: &mpsc::UnboundedSender<SubEvent>,
    playback: &Arc<JitterPlayback>,
    cancel: &CancellationToken,
) -> Result<(), TransportError> {
    let consumer = relay.consume(path).await?;
    let mut state = consumer.subscribe(TRACK_STATE, 2).await?;
    let mut rooms = consumer.subscribe(TRACK_ROOMS, 1).await?;
    let mut speaking = consumer.subscribe(TRACK_SPEAKING, 1).await?;
    let mut audio = consumer.subscribe(TRACK_AUDIO, 3).await?;

    let source = SourceKey::Remote(path.to_string()).to_string();
    let mut decode = DecodePipeline::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            value = state.read_json() => match value? {
                None => return Ok(()),
                Some(value) => match StateRecord::parse(&value) {
                    Some(record) => {
                        let _ = sub_tx.send(SubEvent::State {
                            path: path.to_string(),
                            record,
                        });
                    }
                    None => tracing::debug!(%path, "dropping malformed state record"),
                },
            },
            value = rooms.read_json() => match value? {
                None => return Ok(()),
                Some(value) => match RoomsRecord::parse(&value) {
                    Some(record) => {
                        let _ = sub_tx.send(SubEvent::Rooms {
                            path: path.to_string(),
                            record,
                        });
                    }
                    None => tracing::debug!(%path, "dropping malformed rooms record"),
                },
            },
            value = speaking.read_json() => match value? {
                None => return Ok(()),
                Some(value) => match SpeakingRecord::parse(&value) {
                    Some(record) => {
                        let _ = sub_tx.send(SubEvent::Speaking {
                            path: path.to_string(),
                            record,
                        });
                    }
                    None => tracing::debug!(%path, "dropping malformed speaking record"),
                },
            },
            frame = audio.read_frame() => match frame? {
                None => return Ok(()),
                Some(bytes) => {
                    if let Some(decoded) = decode.decode(&bytes).await {
                        playback.enqueue(&source, &decoded);
                    }
                    let _ = sub_tx.send(SubEvent::Seen {
                        path: path.to_string(),
                    });
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(x: f32, y: f32, facing: Facing, rooms: &[&str]) -> StateRecord {
        StateRecord {
            identity: "me".into(),
            x,
            y,
            facing,
            rooms: Some(rooms.iter().map(|r| r.to_string()).collect()),
            ts: 0.0,
        }
    }

    #[test]
    fn test_state_changed_epsilon() {
        let last = record(0.0, 0.0, Facing::Down, &[]);
        // Within epsilon: no send
        assert!(!state_changed(&last, &record(0.2, 0.0, Facing::Down, &[]), 0.25));
        assert!(!state_changed(&last, &record(0.0, -0.25, Facing::Down, &[]), 0.25));
        // Past epsilon
        assert!(state_changed(&last, &record(0.3, 0.0, Facing::Down, &[]), 0.25));
    }

    #[test]
    fn test_state_changed_exact_on_facing_and_rooms() {
        let last = record(0.0, 0.0, Facing::Down, &["lobby"]);
        assert!(state_changed(&last, &record(0.0, 0.0, Facing::Up, &["lobby"]), 0.25));
        assert!(state_changed(&last, &record(0.0, 0.0, Facing::Down, &[]), 0.25));
        assert!(!state_changed(&last, &record(0.0, 0.0, Facing::Down, &["lobby"]), 0.25));
    }
}
