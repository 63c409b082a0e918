//! Relay sequencer for slipstream multiplayer sessions.
//!
//! Clients connect over TCP, authenticate, get a slot, and from then on the
//! server forwards their game-state frames to the other participants. The
//! server is a pure relay: it orders and distributes, it never simulates.
//!
//! # Architecture
//!
//! Per client socket there is one receiver task (ingress) and one
//! broadcaster task (egress, behind a bounded queue). All shared mutation
//! funnels through the [`Sequencer`], which owns the client table and
//! applies the fan-out policy for every frame. Entry destruction is deferred
//! to a single [`reaper`] worker via the kill queue so that no task ever
//! frees the entry it is running inside of.
//!
//! # Components
//!
//! - [`Sequencer`]: client table, admission, dispatch, moderation, shutdown
//! - [`Broadcaster`]/[`Receiver`]: the per-client socket workers
//! - [`reaper`]: ordered teardown (broadcaster → receiver → socket → entry)
//! - [`listener`]: accept loop and handshake
//! - [`ScriptHost`]: callback bridge for an optional embedded script engine
//! - [`MasterListClient`]: interface to the external listing client

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod bans;
pub mod broadcaster;
pub mod chat;
pub mod client;
pub mod config;
pub mod error;
pub mod listener;
pub mod listing;
pub mod reaper;
pub mod receiver;
pub mod registry;
pub mod script;
pub mod sequencer;
pub mod stats;
pub mod wire;

pub use auth::{AuthFlags, UserAuth, UserEventKind};
pub use bans::{BanList, BanRecord};
pub use broadcaster::Broadcaster;
pub use chat::{CHAT_HISTORY_LIMIT, ChatCommand, ChatHistory, ChatRecord};
pub use client::{ClientEntry, MAX_STREAMS};
pub use config::{ServerConfig, ServerMode};
pub use error::ServerError;
pub use listing::{HeartbeatRow, MasterListClient};
pub use receiver::Receiver;
pub use registry::ClientTable;
pub use script::{BroadcastDecision, HttpFetcher, HttpStatus, ScriptHost};
pub use sequencer::{ClientView, SERVER_VERSION, SayKind, Sequencer};
pub use stats::{ServerStats, StreamTraffic};
