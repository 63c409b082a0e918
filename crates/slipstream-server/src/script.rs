//! Callback bridge for the optional embedded script engine.
//!
//! The engine itself is an external collaborator; this module owns the
//! callback registry and the contract the core honors: six lifecycle hooks,
//! a broadcast-decision override for chat and stream registration, a timer
//! worker for periodic stepping, and an asynchronous HTTP-GET facility.
//!
//! The registry has its own lock. The sequencer never invokes a hook while
//! holding the clients lock, and handlers must not register or replace
//! callbacks from inside a callback.

use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use slipstream_proto::payloads::StreamRegistration;

/// How a frame should be fanned out, as decided by a script hook.
///
/// `Auto` defers to the core's default policy for the frame; any explicit
/// value is authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BroadcastDecision {
    /// Leave the default policy unchanged.
    #[default]
    Auto,
    /// Every flowing client including the sender.
    All,
    /// Every flowing client except the sender.
    Normal,
    /// Flowing clients with the ADMIN flag, except the sender.
    Authed,
    /// Do not broadcast.
    Block,
}

/// Progress report for an asynchronous HTTP GET.
#[derive(Debug, Clone)]
pub enum HttpStatus {
    /// Transfer is underway.
    Progress {
        /// Bytes received so far.
        received: u64,
        /// Total bytes expected, 0 if unknown.
        total: u64,
    },
    /// Transfer finished.
    Success {
        /// HTTP status code.
        http_code: u32,
        /// Response body.
        body: String,
    },
    /// Transfer failed.
    Failure {
        /// HTTP status code, 0 if the request never completed.
        http_code: u32,
        /// Error description.
        error: String,
    },
}

/// Blocking HTTP fetch collaborator handed in by the embedder.
pub trait HttpFetcher: Send + Sync {
    /// Perform a GET. `Ok((code, body))` on success, `Err((code, error))`
    /// otherwise.
    fn get(&self, url: &str) -> Result<(u32, String), (u32, String)>;
}

type StepHook = Box<dyn Fn(f32) + Send + Sync>;
type PlayerHook = Box<dyn Fn(u32) + Send + Sync>;
type DeleteHook = Box<dyn Fn(u32, bool) + Send + Sync>;
type ChatHook = Box<dyn Fn(u32, &str) -> BroadcastDecision + Send + Sync>;
type StreamHook = Box<dyn Fn(u32, &StreamRegistration) -> BroadcastDecision + Send + Sync>;
type CmdHook = Box<dyn Fn(u32, &str) + Send + Sync>;
type HttpHook = Box<dyn Fn(&str, HttpStatus) + Send + Sync>;

#[derive(Default)]
struct Callbacks {
    frame_step: Vec<StepHook>,
    player_added: Vec<PlayerHook>,
    player_deleted: Vec<DeleteHook>,
    stream_added: Option<StreamHook>,
    player_chat: Option<ChatHook>,
    game_cmd: Option<CmdHook>,
    http_status: Option<HttpHook>,
}

/// Host side of the script bridge.
pub struct ScriptHost {
    callbacks: Mutex<Callbacks>,
    fetcher: Option<Arc<dyn HttpFetcher>>,
}

impl ScriptHost {
    /// Bridge with no HTTP facility.
    #[must_use]
    pub fn new() -> Self {
        Self { callbacks: Mutex::new(Callbacks::default()), fetcher: None }
    }

    /// Bridge with an HTTP fetch collaborator.
    #[must_use]
    pub fn with_fetcher(fetcher: Arc<dyn HttpFetcher>) -> Self {
        Self { callbacks: Mutex::new(Callbacks::default()), fetcher: Some(fetcher) }
    }

    /// Add a periodic step handler. Multiple handlers allowed.
    pub fn add_frame_step(&self, hook: impl Fn(f32) + Send + Sync + 'static) {
        self.callbacks.lock().frame_step.push(Box::new(hook));
    }

    /// Add a player-added handler. Multiple handlers allowed.
    pub fn add_player_added(&self, hook: impl Fn(u32) + Send + Sync + 'static) {
        self.callbacks.lock().player_added.push(Box::new(hook));
    }

    /// Add a player-deleted handler. Multiple handlers allowed.
    pub fn add_player_deleted(&self, hook: impl Fn(u32, bool) + Send + Sync + 'static) {
        self.callbacks.lock().player_deleted.push(Box::new(hook));
    }

    /// Set the stream-registration handler, replacing any prior one.
    pub fn set_stream_added(
        &self,
        hook: impl Fn(u32, &StreamRegistration) -> BroadcastDecision + Send + Sync + 'static,
    ) {
        self.callbacks.lock().stream_added = Some(Box::new(hook));
    }

    /// Set the chat handler, replacing any prior one.
    pub fn set_player_chat(
        &self,
        hook: impl Fn(u32, &str) -> BroadcastDecision + Send + Sync + 'static,
    ) {
        self.callbacks.lock().player_chat = Some(Box::new(hook));
    }

    /// Set the custom-command handler, replacing any prior one.
    pub fn set_game_cmd(&self, hook: impl Fn(u32, &str) + Send + Sync + 'static) {
        self.callbacks.lock().game_cmd = Some(Box::new(hook));
    }

    /// Set the HTTP status handler, replacing any prior one.
    pub fn set_http_status(&self, hook: impl Fn(&str, HttpStatus) + Send + Sync + 'static) {
        self.callbacks.lock().http_status = Some(Box::new(hook));
    }

    /// Invoke the periodic step handlers.
    pub fn frame_step(&self, dt_ms: f32) {
        let callbacks = self.callbacks.lock();
        for hook in &callbacks.frame_step {
            contain("frame_step", || hook(dt_ms));
        }
    }

    /// Invoke the player-added handlers.
    pub fn player_added(&self, uid: u32) {
        let callbacks = self.callbacks.lock();
        for hook in &callbacks.player_added {
            contain("player_added", || hook(uid));
        }
    }

    /// Invoke the player-deleted handlers.
    pub fn player_deleted(&self, uid: u32, crashed: bool) {
        let callbacks = self.callbacks.lock();
        for hook in &callbacks.player_deleted {
            contain("player_deleted", || hook(uid, crashed));
        }
    }

    /// Ask the stream-registration handler for a broadcast decision.
    #[must_use]
    pub fn stream_added(&self, uid: u32, registration: &StreamRegistration) -> BroadcastDecision {
        let callbacks = self.callbacks.lock();
        match &callbacks.stream_added {
            Some(hook) => {
                contain("stream_added", || hook(uid, registration)).unwrap_or_default()
            },
            None => BroadcastDecision::Auto,
        }
    }

    /// Ask the chat handler for a broadcast decision.
    #[must_use]
    pub fn player_chat(&self, uid: u32, text: &str) -> BroadcastDecision {
        let callbacks = self.callbacks.lock();
        match &callbacks.player_chat {
            Some(hook) => contain("player_chat", || hook(uid, text)).unwrap_or_default(),
            None => BroadcastDecision::Auto,
        }
    }

    /// Forward a custom game command from a client.
    pub fn game_cmd(&self, uid: u32, text: &str) {
        let callbacks = self.callbacks.lock();
        if let Some(hook) = &callbacks.game_cmd {
            contain("game_cmd", || hook(uid, text));
        }
    }

    /// Start an asynchronous HTTP GET.
    ///
    /// Runs on a blocking task outside every critical section; the outcome is
    /// delivered to the HTTP status handler tagged with `displayname`.
    pub fn http_get_async(self: &Arc<Self>, url: String, displayname: String) {
        let Some(fetcher) = self.fetcher.clone() else {
            tracing::warn!(url, "http request ignored: no fetcher configured");
            return;
        };
        let host = Arc::clone(self);

        tokio::task::spawn_blocking(move || {
            let status = match fetcher.get(&url) {
                Ok((http_code, body)) => HttpStatus::Success { http_code, body },
                Err((http_code, error)) => HttpStatus::Failure { http_code, error },
            };

            let callbacks = host.callbacks.lock();
            if let Some(hook) = &callbacks.http_status {
                contain("http_status", || hook(&displayname, status.clone()));
            }
        });
    }

    /// Start the periodic step worker at the cadence the bridge chose.
    pub fn start_timer(self: &Arc<Self>, period: Duration) -> tokio::task::JoinHandle<()> {
        let host = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut last = Instant::now();
            loop {
                ticker.tick().await;
                let now = Instant::now();
                host.frame_step(now.duration_since(last).as_secs_f32() * 1000.0);
                last = now;
            }
        })
    }
}

impl Default for ScriptHost {
    fn default() -> Self {
        Self::new()
    }
}

/// Run a handler, containing panics. A failing script must never take a
/// client or the server down with it.
fn contain<T>(hook: &str, f: impl FnOnce() -> T) -> Option<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::error!(hook, "script callback panicked; continuing");
            None
        },
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use slipstream_proto::payloads::StreamKind;

    use super::*;

    #[test]
    fn multiple_step_handlers_all_run() {
        let host = ScriptHost::new();
        let counter = Arc::new(AtomicU32::new(0));

        for _ in 0..3 {
            let counter = Arc::clone(&counter);
            host.add_frame_step(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        host.frame_step(20.0);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn chat_handler_is_single_and_replaceable() {
        let host = ScriptHost::new();

        host.set_player_chat(|_, _| BroadcastDecision::Block);
        assert_eq!(host.player_chat(1, "hi"), BroadcastDecision::Block);

        host.set_player_chat(|_, _| BroadcastDecision::Authed);
        assert_eq!(host.player_chat(1, "hi"), BroadcastDecision::Authed);
    }

    #[test]
    fn missing_handlers_default_to_auto() {
        let host = ScriptHost::new();
        let reg = StreamRegistration::new(StreamKind::Truck, 0, "car");

        assert_eq!(host.player_chat(1, "hi"), BroadcastDecision::Auto);
        assert_eq!(host.stream_added(1, &reg), BroadcastDecision::Auto);
    }

    #[test]
    fn panicking_handler_is_contained() {
        let host = ScriptHost::new();
        host.set_player_chat(|_, _| panic!("script exploded"));

        // Panic is swallowed; the decision falls back to Auto.
        assert_eq!(host.player_chat(1, "hi"), BroadcastDecision::Auto);
    }
}
