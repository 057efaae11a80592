//! Frame identity and the host window's message channel
//!
//! The host page sees every `message` event posted to its window, from any
//! frame. `MessageHub` is that event stream; each event carries the
//! `FrameId` of the window that posted it so a host view can ignore
//! everything not coming from its own iframe.
//!
//! Delivery is lossless: each subscriber has its own unbounded queue, and a
//! frame subscription only ever queues that frame's events, so a noisy frame
//! cannot push another frame's messages out.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

/// `targetOrigin` for messages into the game. A `srcdoc` iframe without
/// `allow-same-origin` has an opaque origin, so nothing narrower works.
pub const GAME_TARGET_ORIGIN: &str = "*";

/// Identity of one iframe's content window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(u64);

impl FrameId {
    /// Allocate a fresh, process-unique id
    pub fn next() -> Self {
        static NEXT_FRAME_ID: AtomicU64 = AtomicU64::new(1);
        FrameId(NEXT_FRAME_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame-{}", self.0)
    }
}

/// The iframe's content window as seen from the host
pub trait ContentWindow: Send + Sync {
    /// `contentWindow.postMessage(message, targetOrigin)`
    fn post_message(&self, message: Value, target_origin: &str) -> Result<()>;

    /// Replace the iframe's `srcdoc`, discarding the running document
    fn load_document(&self, html: &str) -> Result<()>;
}

/// A mounted game iframe
#[derive(Clone)]
pub struct SandboxFrame {
    id: FrameId,
    window: Arc<dyn ContentWindow>,
}

impl SandboxFrame {
    pub fn new(window: Arc<dyn ContentWindow>) -> Self {
        Self {
            id: FrameId::next(),
            window,
        }
    }

    pub fn id(&self) -> FrameId {
        self.id
    }

    pub fn window(&self) -> &dyn ContentWindow {
        self.window.as_ref()
    }
}

impl fmt::Debug for SandboxFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SandboxFrame").field("id", &self.id).finish()
    }
}

/// A `message` event delivered to the host window
#[derive(Debug, Clone)]
pub struct MessageEvent {
    /// Window that posted the message
    pub source: FrameId,
    pub data: Value,
}

struct Subscriber {
    /// `None` receives events from every frame
    frame: Option<FrameId>,
    sender: mpsc::UnboundedSender<MessageEvent>,
}

/// The host window's `message` event stream
#[derive(Clone, Default)]
pub struct MessageHub {
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
}

impl MessageHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn subscribers(&self) -> MutexGuard<'_, Vec<Subscriber>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn add(&self, frame: Option<FrameId>) -> mpsc::UnboundedReceiver<MessageEvent> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.subscribers().push(Subscriber { frame, sender });
        receiver
    }

    /// Deliver an event to every subscription interested in `source`
    pub fn post(&self, source: FrameId, data: Value) {
        let mut subscribers = self.subscribers();
        subscribers.retain(|s| !s.sender.is_closed());

        let mut delivered = 0;
        for subscriber in subscribers
            .iter()
            .filter(|s| s.frame.map_or(true, |frame| frame == source))
        {
            let event = MessageEvent {
                source,
                data: data.clone(),
            };
            if subscriber.sender.send(event).is_ok() {
                delivered += 1;
            }
        }

        // Nobody listening: dropped like in a browser
        if delivered == 0 {
            debug!("Dropped message from {}: no listeners", source);
        }
    }

    /// Every event posted to the window, from any frame
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<MessageEvent> {
        self.add(None)
    }

    /// Events posted by one frame only
    pub fn subscribe_frame(&self, frame: FrameId) -> mpsc::UnboundedReceiver<MessageEvent> {
        self.add(Some(frame))
    }

    /// Number of live subscriptions
    pub fn listener_count(&self) -> usize {
        self.subscribers()
            .iter()
            .filter(|s| !s.sender.is_closed())
            .count()
    }
}

impl fmt::Debug for MessageHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageHub")
            .field("listeners", &self.listener_count())
            .finish()
    }
}
