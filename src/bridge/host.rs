//! Host-side dispatcher for one mounted game iframe
//!
//! Lifecycle per frame: `Unmounted -> Loading -> Ready -> (Error <-> Ready) -> Unmounted`.
//! `Ready` is entered only on `GAME_READY`; `GAME_ERROR` moves to `Error`
//! until the next `GAME_READY`. Dropping or unmounting the host detaches its
//! listener; `Unmounted` is terminal.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::frame::{FrameId, MessageEvent, MessageHub, SandboxFrame, GAME_TARGET_ORIGIN};
use super::message::{GameToHost, HostToGame};
use crate::sandbox::{SandboxConfig, SandboxDocument};
use crate::storage::{state_key, StateStore};

/// Lifecycle of a game iframe as seen by its host view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Unmounted,
    Loading,
    Ready,
    Error,
}

/// An uncaught exception reported by the game
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameRuntimeError {
    pub message: String,
    pub stack: Option<String>,
}

/// Result of asking the game for its state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateRequestOutcome {
    /// The game answered with a serialized state
    Snapshot(String),
    /// The game answered but has nothing saved, or the frame went away
    NoState,
    /// No answer within the configured timeout
    TimedOut,
}

impl StateRequestOutcome {
    pub fn into_state(self) -> Option<String> {
        match self {
            StateRequestOutcome::Snapshot(state) => Some(state),
            StateRequestOutcome::NoState | StateRequestOutcome::TimedOut => None,
        }
    }
}

/// Callbacks for game-to-host messages. All methods default to no-ops.
pub trait GameEvents: Send + Sync {
    fn on_ready(&self, _version: Option<&str>) {}
    fn on_state(&self, _state: &str) {}
    fn on_error(&self, _error: &GameRuntimeError) {}
    fn on_log(&self, _message: &str) {}
    fn on_score(&self, _score: f64, _level: Option<f64>) {}
    fn on_complete(&self, _score: f64, _time: Option<f64>) {}
}

/// Host with no callbacks
pub struct NoopEvents;

impl GameEvents for NoopEvents {}

type PendingRequests = HashMap<u64, oneshot::Sender<Option<String>>>;

struct HostShared {
    frame: SandboxFrame,
    events: Arc<dyn GameEvents>,
    status: watch::Sender<FrameStatus>,
    last_error: Mutex<Option<GameRuntimeError>>,
    pending: Mutex<PendingRequests>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl HostShared {
    fn handle_event(&self, event: MessageEvent) {
        if event.source != self.frame.id() {
            return;
        }
        if *self.status.borrow() == FrameStatus::Unmounted {
            return;
        }

        let message = match GameToHost::from_value(&event.data) {
            Ok(message) => message,
            Err(e) => {
                debug!("Ignoring message from {}: {}", event.source, e);
                return;
            }
        };

        match message {
            GameToHost::GameReady { version, .. } => {
                *lock(&self.last_error) = None;
                self.status.send_replace(FrameStatus::Ready);
                info!("Game in {} is ready", event.source);
                self.events.on_ready(version.as_deref());
            }
            GameToHost::GameState {
                state, request_id, ..
            } => {
                if let Some(request_id) = request_id {
                    match lock(&self.pending).remove(&request_id) {
                        Some(reply) => {
                            // The requester may have timed out already
                            let _ = reply.send(state.clone());
                        }
                        None => debug!("No pending state request {}", request_id),
                    }
                }
                if let Some(state) = state.as_deref() {
                    self.events.on_state(state);
                }
            }
            GameToHost::GameError { error, stack, .. } => {
                let error = GameRuntimeError {
                    message: error,
                    stack,
                };
                warn!("Game in {} reported error: {}", event.source, error.message);
                *lock(&self.last_error) = Some(error.clone());
                self.status.send_replace(FrameStatus::Error);
                self.events.on_error(&error);
            }
            GameToHost::GameLog { message, .. } => self.events.on_log(&message),
            GameToHost::GameScore { score, level, .. } => self.events.on_score(score, level),
            GameToHost::GameComplete { score, time, .. } => self.events.on_complete(score, time),
        }
    }
}

async fn listen(shared: Arc<HostShared>, mut receiver: mpsc::UnboundedReceiver<MessageEvent>) {
    while let Some(event) = receiver.recv().await {
        shared.handle_event(event);
    }
    debug!("Message hub closed, host for {} stops", shared.frame.id());
}

/// Host view for a single sandboxed game iframe
pub struct GameHost {
    shared: Arc<HostShared>,
    listener: JoinHandle<()>,
    request_timeout: Duration,
    next_request_id: AtomicU64,
}

impl GameHost {
    /// Subscribe to the hub for `frame`. Must be called within a Tokio runtime.
    pub fn mount(
        hub: &MessageHub,
        frame: SandboxFrame,
        events: Arc<dyn GameEvents>,
        config: &SandboxConfig,
    ) -> Self {
        let (status, _) = watch::channel(FrameStatus::Loading);
        let frame_id = frame.id();
        let shared = Arc::new(HostShared {
            frame,
            events,
            status,
            last_error: Mutex::new(None),
            pending: Mutex::new(HashMap::new()),
        });

        let receiver = hub.subscribe_frame(frame_id);
        let listener = tokio::spawn(listen(shared.clone(), receiver));
        info!("Mounted game host for {}", frame_id);

        Self {
            shared,
            listener,
            request_timeout: config.state_request_timeout(),
            next_request_id: AtomicU64::new(1),
        }
    }

    pub fn frame_id(&self) -> FrameId {
        self.shared.frame.id()
    }

    pub fn status(&self) -> FrameStatus {
        *self.shared.status.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.status() == FrameStatus::Ready
    }

    /// Watch lifecycle changes
    pub fn subscribe_status(&self) -> watch::Receiver<FrameStatus> {
        self.shared.status.subscribe()
    }

    /// Wait until the game reports ready, up to `timeout`
    pub async fn wait_ready(&self, timeout: Duration) -> bool {
        let mut status = self.subscribe_status();
        let outcome =
            tokio::time::timeout(timeout, status.wait_for(|s| *s == FrameStatus::Ready)).await;
        matches!(outcome, Ok(Ok(_)))
    }

    pub fn last_error(&self) -> Option<GameRuntimeError> {
        lock(&self.shared.last_error).clone()
    }

    /// Post a command into the game frame
    pub fn send(&self, message: HostToGame) -> Result<()> {
        let tag = message.tag();
        self.shared
            .frame
            .window()
            .post_message(message.to_value(), GAME_TARGET_ORIGIN)
            .with_context(|| format!("Failed to post {} to {}", tag, self.frame_id()))
    }

    pub fn load_state(&self, state: impl Into<String>) -> Result<()> {
        self.send(HostToGame::load_state(state))
    }

    pub fn reset_game(&self) -> Result<()> {
        *lock(&self.shared.last_error) = None;
        self.send(HostToGame::reset())
    }

    pub fn pause_game(&self) -> Result<()> {
        self.send(HostToGame::pause())
    }

    pub fn resume_game(&self) -> Result<()> {
        self.send(HostToGame::resume())
    }

    /// Load a new document into the frame. Everything the old document held
    /// is gone; pending state requests run out their timeout.
    pub fn run(&self, document: &SandboxDocument) -> Result<()> {
        *lock(&self.shared.last_error) = None;
        self.shared.status.send_replace(FrameStatus::Loading);
        info!(
            "Loading {} byte document into {}",
            document.len(),
            self.frame_id()
        );
        self.shared
            .frame
            .window()
            .load_document(document.as_str())
            .with_context(|| format!("Failed to load document into {}", self.frame_id()))
    }

    /// Ask the game for its state. Never fails: a silent or broken frame
    /// yields `TimedOut` / `NoState`.
    pub async fn request_state(&self) -> StateRequestOutcome {
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let (reply, response) = oneshot::channel();
        lock(&self.shared.pending).insert(request_id, reply);

        if let Err(e) = self.send(HostToGame::request_state(request_id)) {
            warn!("State request {} not sent: {:#}", request_id, e);
            lock(&self.shared.pending).remove(&request_id);
            return StateRequestOutcome::NoState;
        }

        match tokio::time::timeout(self.request_timeout, response).await {
            Ok(Ok(Some(state))) => StateRequestOutcome::Snapshot(state),
            Ok(Ok(None)) | Ok(Err(_)) => StateRequestOutcome::NoState,
            Err(_) => {
                lock(&self.shared.pending).remove(&request_id);
                warn!(
                    "State request {} to {} timed out after {:?}",
                    request_id,
                    self.frame_id(),
                    self.request_timeout
                );
                StateRequestOutcome::TimedOut
            }
        }
    }

    /// Request the game state and persist it as `player_id`'s save of `game_id`.
    /// Returns whether anything was saved.
    pub async fn save_state_to(
        &self,
        store: &dyn StateStore,
        game_id: &str,
        player_id: &str,
    ) -> Result<bool> {
        let key = state_key(game_id, player_id);
        match self.request_state().await.into_state() {
            Some(state) => {
                store.save(&key, &state).await?;
                debug!("Saved {} bytes of game state to {}", state.len(), key);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Load `player_id`'s saved state of `game_id` into the game. Returns whether anything was found.
    pub async fn restore_state_from(
        &self,
        store: &dyn StateStore,
        game_id: &str,
        player_id: &str,
    ) -> Result<bool> {
        let key = state_key(game_id, player_id);
        match store.load(&key).await? {
            Some(state) => {
                self.load_state(state)?;
                debug!("Restored game state from {}", key);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Detach from the hub. The host cannot be used afterwards.
    pub fn unmount(self) {
        info!("Unmounting game host for {}", self.frame_id());
    }
}

impl Drop for GameHost {
    fn drop(&mut self) {
        self.listener.abort();
        self.shared.status.send_replace(FrameStatus::Unmounted);
        // Dropping the senders resolves in-flight requests as NoState
        lock(&self.shared.pending).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::frame::ContentWindow;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use tokio::sync::mpsc;

    /// Stand-in for the bootstrap script running inside the iframe
    struct FakeGame {
        hub: MessageHub,
        id: Mutex<Option<FrameId>>,
        answers_requests: bool,
        state: Mutex<Option<String>>,
        received: Mutex<Vec<Value>>,
        documents: Mutex<Vec<String>>,
    }

    impl FakeGame {
        fn new(hub: &MessageHub, answers_requests: bool) -> Arc<Self> {
            Arc::new(Self {
                hub: hub.clone(),
                id: Mutex::new(None),
                answers_requests,
                state: Mutex::new(None),
                received: Mutex::new(Vec::new()),
                documents: Mutex::new(Vec::new()),
            })
        }

        fn id(&self) -> FrameId {
            lock(&self.id).unwrap()
        }

        fn post(&self, data: Value) {
            self.hub.post(self.id(), data);
        }

        /// `vibelab.saveState(value)`
        fn save_state(&self, value: &Value) {
            let state = serde_json::to_string(value).unwrap();
            *lock(&self.state) = Some(state.clone());
            self.post(json!({"type": "GAME_STATE", "timestamp": 1, "state": state}));
        }

        fn received(&self) -> Vec<Value> {
            lock(&self.received).clone()
        }
    }

    impl ContentWindow for FakeGame {
        fn post_message(&self, message: Value, target_origin: &str) -> Result<()> {
            assert_eq!(target_origin, "*");
            if message["type"] == "REQUEST_STATE" && self.answers_requests {
                let state = lock(&self.state).clone();
                self.post(json!({
                    "type": "GAME_STATE",
                    "timestamp": 2,
                    "state": state,
                    "requestId": message["requestId"],
                }));
            }
            lock(&self.received).push(message);
            Ok(())
        }

        fn load_document(&self, html: &str) -> Result<()> {
            lock(&self.documents).push(html.to_string());
            Ok(())
        }
    }

    #[derive(Debug, PartialEq)]
    enum Seen {
        Ready(Option<String>),
        State(String),
        Error(GameRuntimeError),
        Log(String),
        Score(f64, Option<f64>),
        Complete(f64, Option<f64>),
    }

    struct Recorder(mpsc::UnboundedSender<Seen>);

    impl GameEvents for Recorder {
        fn on_ready(&self, version: Option<&str>) {
            let _ = self.0.send(Seen::Ready(version.map(str::to_string)));
        }
        fn on_state(&self, state: &str) {
            let _ = self.0.send(Seen::State(state.to_string()));
        }
        fn on_error(&self, error: &GameRuntimeError) {
            let _ = self.0.send(Seen::Error(error.clone()));
        }
        fn on_log(&self, message: &str) {
            let _ = self.0.send(Seen::Log(message.to_string()));
        }
        fn on_score(&self, score: f64, level: Option<f64>) {
            let _ = self.0.send(Seen::Score(score, level));
        }
        fn on_complete(&self, score: f64, time: Option<f64>) {
            let _ = self.0.send(Seen::Complete(score, time));
        }
    }

    fn test_config() -> SandboxConfig {
        SandboxConfig {
            state_request_timeout_ms: 100,
            ..SandboxConfig::default()
        }
    }

    fn setup(answers_requests: bool) -> (MessageHub, Arc<FakeGame>, GameHost, mpsc::UnboundedReceiver<Seen>) {
        let config = test_config();
        let hub = MessageHub::new();
        let game = FakeGame::new(&hub, answers_requests);
        let frame = SandboxFrame::new(game.clone());
        *lock(&game.id) = Some(frame.id());
        let (tx, rx) = mpsc::unbounded_channel();
        let host = GameHost::mount(&hub, frame, Arc::new(Recorder(tx)), &config);
        (hub, game, host, rx)
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<Seen>) -> Seen {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for callback")
            .expect("recorder closed")
    }

    #[tokio::test]
    async fn test_ready_transitions_from_loading() {
        let (_hub, game, host, mut rx) = setup(true);
        assert_eq!(host.status(), FrameStatus::Loading);

        game.post(json!({"type": "GAME_READY", "timestamp": 1, "version": "0.1.0"}));
        assert_eq!(next(&mut rx).await, Seen::Ready(Some("0.1.0".into())));
        assert_eq!(host.status(), FrameStatus::Ready);
        assert!(host.wait_ready(Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn test_error_is_isolated_and_recoverable() {
        let (_hub, game, host, mut rx) = setup(true);

        game.post(json!({"type": "GAME_READY", "timestamp": 1}));
        assert_eq!(next(&mut rx).await, Seen::Ready(None));

        game.post(json!({
            "type": "GAME_ERROR", "timestamp": 2,
            "error": "Uncaught TypeError: x is undefined at line 7",
            "stack": "at tick (about:srcdoc:7)"
        }));
        let expected = GameRuntimeError {
            message: "Uncaught TypeError: x is undefined at line 7".into(),
            stack: Some("at tick (about:srcdoc:7)".into()),
        };
        assert_eq!(next(&mut rx).await, Seen::Error(expected.clone()));
        assert_eq!(host.status(), FrameStatus::Error);
        assert_eq!(host.last_error(), Some(expected));

        // Exactly one error callback
        game.post(json!({"type": "GAME_LOG", "timestamp": 3, "message": "marker"}));
        assert_eq!(next(&mut rx).await, Seen::Log("marker".into()));

        game.post(json!({"type": "GAME_READY", "timestamp": 4}));
        assert_eq!(next(&mut rx).await, Seen::Ready(None));
        assert_eq!(host.status(), FrameStatus::Ready);
        assert_eq!(host.last_error(), None);
    }

    #[tokio::test]
    async fn test_ignores_other_frames_and_malformed_messages() {
        let (hub, game, host, mut rx) = setup(true);

        hub.post(FrameId::next(), json!({"type": "GAME_ERROR", "error": "spoofed"}));
        game.post(json!({"type": "NOT_A_REAL_TYPE", "timestamp": 1}));
        game.post(json!("GAME_READY"));
        game.post(json!({"type": "GAME_SCORE", "score": "lots"}));
        game.post(json!({"type": "GAME_SCORE", "timestamp": 2, "score": 40, "level": 3}));

        assert_eq!(next(&mut rx).await, Seen::Score(40.0, Some(3.0)));
        assert_eq!(host.status(), FrameStatus::Loading);
        assert_eq!(host.last_error(), None);
    }

    #[tokio::test]
    async fn test_burst_of_messages_is_not_dropped() {
        let (hub, game, host, mut rx) = setup(true);
        let noisy = FrameId::next();

        game.post(json!({"type": "GAME_READY", "timestamp": 1}));
        for i in 0..500 {
            hub.post(noisy, json!({"type": "GAME_LOG", "timestamp": i, "message": "noise"}));
            game.post(json!({"type": "GAME_LOG", "timestamp": i, "message": format!("log {}", i)}));
        }

        assert!(host.wait_ready(Duration::from_millis(500)).await);
        assert_eq!(next(&mut rx).await, Seen::Ready(None));
        for i in 0..500 {
            assert_eq!(next(&mut rx).await, Seen::Log(format!("log {}", i)));
        }
    }

    #[tokio::test]
    async fn test_fractional_numbers_are_dispatched() {
        let (_hub, game, host, mut rx) = setup(true);

        game.post(json!({"type": "GAME_READY", "timestamp": 1_700_000_000_000.5}));
        game.post(json!({"type": "GAME_SCORE", "timestamp": 2, "score": 10, "level": 1.5}));
        game.post(json!({"type": "GAME_SCORE", "timestamp": 3, "score": 0, "level": -1}));

        assert_eq!(next(&mut rx).await, Seen::Ready(None));
        assert_eq!(next(&mut rx).await, Seen::Score(10.0, Some(1.5)));
        assert_eq!(next(&mut rx).await, Seen::Score(0.0, Some(-1.0)));
        assert_eq!(host.status(), FrameStatus::Ready);
    }

    #[tokio::test]
    async fn test_complete_and_log_dispatch() {
        let (_hub, game, _host, mut rx) = setup(true);

        game.post(json!({"type": "GAME_COMPLETE", "timestamp": 1, "score": 100, "time": 42.5}));
        game.post(json!({"type": "GAME_LOG", "timestamp": 2, "message": "level 2"}));

        assert_eq!(next(&mut rx).await, Seen::Complete(100.0, Some(42.5)));
        assert_eq!(next(&mut rx).await, Seen::Log("level 2".into()));
    }

    #[tokio::test]
    async fn test_state_round_trip() {
        let (_hub, game, host, mut rx) = setup(true);
        let original = json!({"player": {"x": 3, "y": -1}, "inventory": ["key", "gem"], "hp": 9.5});

        game.save_state(&original);
        let state = match next(&mut rx).await {
            Seen::State(state) => state,
            other => panic!("expected state, got {:?}", other),
        };

        host.load_state(state).unwrap();
        let sent = game.received().pop().unwrap();
        assert_eq!(sent["type"], "LOAD_STATE");
        let restored: Value = serde_json::from_str(sent["state"].as_str().unwrap()).unwrap();
        assert_eq!(restored, original);
    }

    #[tokio::test]
    async fn test_request_state_answered() {
        let (_hub, game, host, _rx) = setup(true);
        assert_eq!(host.request_state().await, StateRequestOutcome::NoState);

        game.save_state(&json!({"level": 4}));
        assert_eq!(
            host.request_state().await,
            StateRequestOutcome::Snapshot(r#"{"level":4}"#.into())
        );

        let requests: Vec<Value> = game
            .received()
            .into_iter()
            .filter(|m| m["type"] == "REQUEST_STATE")
            .collect();
        assert_eq!(requests.len(), 2);
        assert_ne!(requests[0]["requestId"], requests[1]["requestId"]);
    }

    #[tokio::test]
    async fn test_request_state_times_out() {
        let (_hub, _game, host, _rx) = setup(false);

        let started = std::time::Instant::now();
        assert_eq!(host.request_state().await, StateRequestOutcome::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_spontaneous_save_does_not_answer_request() {
        let (_hub, game, host, _rx) = setup(false);
        let request = host.request_state();
        game.save_state(&json!(1));
        assert_eq!(request.await, StateRequestOutcome::TimedOut);
    }

    #[tokio::test]
    async fn test_commands_and_run() {
        let (_hub, game, host, mut rx) = setup(true);
        game.post(json!({"type": "GAME_READY", "timestamp": 1}));
        next(&mut rx).await;

        host.pause_game().unwrap();
        host.resume_game().unwrap();
        host.reset_game().unwrap();
        let types: Vec<Value> = game.received().iter().map(|m| m["type"].clone()).collect();
        assert_eq!(types, vec![json!("PAUSE_GAME"), json!("RESUME_GAME"), json!("RESET_GAME")]);

        let document = crate::sandbox::wrap_for_sandbox("<p>again</p>").unwrap();
        host.run(&document).unwrap();
        assert_eq!(host.status(), FrameStatus::Loading);
        assert_eq!(lock(&game.documents).as_slice(), [document.into_string()]);
    }

    #[tokio::test]
    async fn test_single_subscription_detached_on_unmount() {
        let (hub, _game, host, _rx) = setup(true);
        assert_eq!(hub.listener_count(), 1);

        let mut status = host.subscribe_status();
        host.unmount();
        assert_eq!(*status.borrow_and_update(), FrameStatus::Unmounted);

        tokio::time::timeout(Duration::from_secs(2), async {
            while hub.listener_count() > 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("listener was not detached");
    }

    struct MemoryStore(Mutex<HashMap<String, String>>);

    #[async_trait]
    impl StateStore for MemoryStore {
        async fn load(&self, key: &str) -> Result<Option<String>> {
            Ok(lock(&self.0).get(key).cloned())
        }
        async fn save(&self, key: &str, value: &str) -> Result<()> {
            lock(&self.0).insert(key.to_string(), value.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_save_and_restore_through_store() {
        let (_hub, game, host, _rx) = setup(true);
        let store = MemoryStore(Mutex::new(HashMap::new()));

        assert!(!host.save_state_to(&store, "g1", "p7").await.unwrap());
        assert!(!host.restore_state_from(&store, "g1", "p7").await.unwrap());

        game.save_state(&json!({"coins": 12}));
        assert!(host.save_state_to(&store, "g1", "p7").await.unwrap());
        assert_eq!(
            lock(&store.0).get("games/g1/state/p7.json").map(String::as_str),
            Some(r#"{"coins":12}"#)
        );
        assert!(!host.restore_state_from(&store, "g1", "someone-else").await.unwrap());
        assert!(host.restore_state_from(&store, "g1", "p7").await.unwrap());

        let sent = game.received().pop().unwrap();
        assert_eq!(sent["type"], "LOAD_STATE");
        assert_eq!(sent["state"], r#"{"coins":12}"#);
    }
}
