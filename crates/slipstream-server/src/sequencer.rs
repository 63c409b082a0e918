//! The sequencer: owner of the client table and the dispatch pipeline.
//!
//! Everything that mutates the roster goes through here: admission, frame
//! dispatch with its fan-out policies, moderation commands, disconnects, and
//! the orderly shutdown. The sequencer never destroys a client entry itself;
//! teardown is deferred to the reaper through the kill queue, because
//! `disconnect` is callable from tasks that are themselves being torn down.
//!
//! # Locks
//!
//! Two locks, acquired only in this order and released in reverse:
//!
//! 1. `kill_queue` — the reaper handoff
//! 2. `state` — client table, ban list, chat history
//!
//! Dispatch is fully synchronous while holding the state lock; everything it
//! does to other tasks is a non-blocking `try_send`. Script hooks are never
//! invoked with either lock held.

use std::{collections::VecDeque, sync::Arc, time::Duration};

use bytes::Bytes;
use parking_lot::Mutex;
use slipstream_proto::{
    Command, Frame, SERVER_STREAM, SERVER_UID,
    payloads::{self, StreamKind, StreamRegistration, UserCredentials, UserJoinInfo},
};
use tokio::{io::AsyncWriteExt, net::TcpStream, sync::Notify};

use crate::{
    auth::{AuthFlags, UserAuth, UserEventKind},
    bans::{BanList, BanRecord},
    broadcaster::Broadcaster,
    chat::{ChatCommand, ChatHistory, parse_command},
    client::{ClientEntry, MAX_STREAMS},
    config::ServerConfig,
    error::ServerError,
    listing::{HeartbeatRow, MasterListClient, format_heartbeat},
    receiver::Receiver,
    registry::ClientTable,
    script::{BroadcastDecision, ScriptHost},
    stats::ServerStats,
    wire,
};

/// Version string reported by `!version`.
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Notice broadcast to every client on shutdown.
const SHUTDOWN_NOTICE: &str = "server shutting down (try to reconnect later!)";

/// Timeout on rejection writes so a slow client cannot hold an admission
/// slot.
const REJECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Who receives one relayed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BroadcastScope {
    /// Every flowing client except the sender.
    Normal,
    /// Every flowing client including the sender.
    All,
    /// Flowing clients holding the ADMIN flag, except the sender. The flag
    /// check is exactly ADMIN — this scope exists for bot relays.
    Authed,
}

/// Server-origin chat flavors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SayKind {
    /// Prefixed with `SERVER: `.
    Server,
    /// Sent verbatim (message-of-the-day lines).
    Raw,
}

/// Read-only snapshot of one live client, for listings, tools and tests.
#[derive(Debug, Clone)]
pub struct ClientView {
    /// Server-assigned uid.
    pub uid: u32,
    /// Current table position.
    pub slot: usize,
    /// Nickname.
    pub nickname: String,
    /// Color number.
    pub color: u32,
    /// Auth flags.
    pub auth: AuthFlags,
    /// Whether the client is admitted into broadcasts.
    pub flow: bool,
    /// Whether the announce burst has been sent.
    pub initialized: bool,
    /// Vehicle name from the first truck stream.
    pub vehicle_name: String,
    /// Number of registered streams.
    pub stream_count: usize,
    /// Last known position.
    pub position: Option<[f32; 3]>,
}

/// Everything guarded by the state lock.
struct SequencerState {
    table: ClientTable,
    bans: BanList,
    chat: ChatHistory,
}

/// What dispatch decided while holding the state lock.
enum Classified {
    Drop,
    Broadcast(BroadcastScope),
    Chat(String),
    StreamRegistered(StreamRegistration),
}

/// The relay core. One per listening endpoint, shared behind an `Arc`.
pub struct Sequencer {
    config: ServerConfig,
    state: Mutex<SequencerState>,
    kill_queue: Mutex<VecDeque<ClientEntry>>,
    kill_notify: Notify,
    stats: ServerStats,
    auth: Option<UserAuth>,
    listing: Option<Arc<dyn MasterListClient>>,
    script: Option<Arc<ScriptHost>>,
    /// Serializes admissions across concurrent handshake tasks. Held across
    /// the welcome write, so it is an async mutex; never taken while holding
    /// either sync lock.
    admission: tokio::sync::Mutex<()>,
}

impl Sequencer {
    /// Build the sequencer with its collaborators.
    #[must_use]
    pub fn new(
        config: ServerConfig,
        auth: Option<UserAuth>,
        listing: Option<Arc<dyn MasterListClient>>,
        script: Option<Arc<ScriptHost>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            state: Mutex::new(SequencerState {
                table: ClientTable::new(),
                bans: BanList::new(),
                chat: ChatHistory::new(),
            }),
            kill_queue: Mutex::new(VecDeque::new()),
            kill_notify: Notify::new(),
            stats: ServerStats::new(),
            auth,
            listing,
            script,
            admission: tokio::sync::Mutex::new(()),
        })
    }

    /// Server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Process-wide counters.
    #[must_use]
    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    // ------------------------------------------------------------------
    // Admission
    // ------------------------------------------------------------------

    /// Admit a client whose handshake produced `creds`.
    ///
    /// Admissions are serialized by the admission mutex, which is what lets
    /// identity reservation and entry insertion use separate critical
    /// sections around the welcome write: removals in between can only free
    /// capacity, never invalidate a reserved nickname or color.
    ///
    /// On success the socket is split, both workers are running, and every
    /// live client (the newcomer included) has a UserJoin frame queued.
    pub async fn create_client(
        self: &Arc<Self>,
        mut socket: TcpStream,
        creds: &UserCredentials,
    ) -> Result<u32, ServerError> {
        let _admitting = self.admission.lock().await;
        let peer = socket.peer_addr()?.ip();
        let username = creds.username();

        let reserved = {
            let mut state = self.state.lock();
            if state.table.len() >= self.config.max_clients {
                None
            } else {
                let nickname = state.table.unique_nickname(&username);
                let color = state.table.free_color();
                let auth = self
                    .auth
                    .as_ref()
                    .map_or(AuthFlags::empty(), |a| a.resolve(&creds.user_token()));
                let uid = state.table.allocate_uid();
                let banned = state.bans.is_banned(peer);
                Some((nickname, color, auth, uid, banned))
            }
        };

        let Some((nickname, color, auth, uid, banned)) = reserved else {
            tracing::warn!(username = %username, "join request on full server: rejecting");
            self.send_rejection(socket, Command::ServerFull).await;
            return Err(ServerError::ServerFull);
        };

        if banned {
            tracing::info!(uid, peer = %peer, "banned address rejected");
            self.send_rejection(socket, Command::Banned).await;
            return Err(ServerError::Banned("you are banned".to_string()));
        }

        if !auth.is_empty() {
            tracing::info!(uid, flags = %auth.letters(), "user auth flags");
        }

        tracing::debug!(uid, nickname = %nickname, color, "sending welcome");
        let welcome =
            Frame::new(Command::Welcome, uid, 0, color.to_le_bytes().to_vec());
        if let Err(e) = wire::write_frame(&mut socket, &welcome).await {
            tracing::warn!(uid, error = %e, "error sending welcome message");
            return Err(ServerError::Socket(e));
        }

        {
            let (read_half, write_half) = socket.into_split();
            let mut state = self.state.lock();

            let entry = ClientEntry {
                uid,
                slot: 0,
                nickname: nickname.clone(),
                user_token: creds.user_token(),
                auth,
                color,
                flow: false,
                initialized: false,
                position: None,
                vehicle_name: String::new(),
                peer_addr: peer,
                streams: Default::default(),
                traffic: Default::default(),
                broadcaster: Broadcaster::spawn(
                    uid,
                    write_half,
                    self.config.queue_depth,
                    Arc::clone(self),
                ),
                receiver: Receiver::spawn(uid, read_half, Arc::clone(self)),
            };
            let slot = state.table.push(entry);

            let info = UserJoinInfo::new(slot as u32, color, auth.bits(), &nickname);
            let join = Frame::new(Command::UserJoin, uid, 0, info.to_bytes().to_vec());
            for client in state.table.clients() {
                if !client.broadcaster.queue_frame(join.clone()) {
                    self.stats.add_drop();
                }
            }
        }

        if let Some(script) = &self.script {
            script.player_added(uid);
        }

        tracing::info!(uid, nickname = %nickname, color, "new client added");
        Ok(uid)
    }

    /// Admit the client into broadcasts once the handshake completes.
    pub fn enable_flow(&self, uid: u32) {
        let mut state = self.state.lock();
        if let Some(entry) = state.table.by_uid_mut(uid) {
            entry.flow = true;
        }
        self.print_stats_locked(&state);
    }

    async fn send_rejection(&self, mut socket: TcpStream, command: Command) {
        let frame = Frame::new(command, SERVER_UID, SERVER_STREAM, Bytes::new());
        let _ =
            tokio::time::timeout(REJECT_TIMEOUT, wire::write_frame(&mut socket, &frame)).await;
        let _ = socket.shutdown().await;
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    /// Route one inbound frame. Called by every receiver worker.
    ///
    /// A frame from a uid no longer in the table is dropped silently; that is
    /// a late arrival racing its own disconnect.
    pub fn dispatch(self: &Arc<Self>, source_uid: u32, command: Command, stream_id: u32, payload: Bytes) {
        match command {
            Command::Delete => {
                tracing::info!(uid = source_uid, "client disconnects on request");
                self.disconnect(source_uid, "disconnected on request", false);
                return;
            },
            Command::UseVehicle => {
                tracing::debug!(uid = source_uid, "deprecated vehicle-selection frame ignored");
                return;
            },
            Command::GameCmd => {
                self.account_in(source_uid, stream_id, payload.len());
                if let Some(script) = &self.script {
                    script.game_cmd(source_uid, &String::from_utf8_lossy(&payload));
                }
                return;
            },
            _ => {},
        }

        // Phase 1: classify and mutate under the state lock.
        let classified = {
            let mut state = self.state.lock();
            let Some(pos) = state.table.pos_of_uid(source_uid) else {
                return;
            };

            state.table.clients_mut()[pos]
                .traffic
                .entry(stream_id)
                .or_default()
                .bytes_in += payload.len() as u64;
            self.stats.add_in(payload.len() as u64);

            self.classify_locked(&mut state, pos, source_uid, command, stream_id, &payload)
        };

        // Phase 2: consult the script bridge with no lock held, and handle
        // chat commands (which take their own locks as needed).
        let broadcast = match classified {
            Classified::Drop => None,
            Classified::Broadcast(scope) => Some((scope, payload)),
            Classified::Chat(text) => {
                let mut scope =
                    if text.starts_with('!') { None } else { Some(BroadcastScope::All) };
                if let Some(script) = &self.script {
                    scope = apply_decision(scope, script.player_chat(source_uid, &text));
                }
                if text.starts_with('!') {
                    self.handle_chat_command(source_uid, &text);
                    scope = None;
                }
                scope.map(|s| (s, payload))
            },
            Classified::StreamRegistered(reg) => {
                let mut scope = Some(BroadcastScope::Normal);
                if let Some(script) = &self.script {
                    scope = apply_decision(scope, script.stream_added(source_uid, &reg));
                }
                scope.map(|s| (s, Bytes::copy_from_slice(&reg.to_bytes())))
            },
        };

        // Phase 3: fan out.
        if let Some((scope, frame_payload)) = broadcast {
            let frame = Frame::new(command, source_uid, stream_id, frame_payload);
            let mut state = self.state.lock();
            if let Some(pos) = state.table.pos_of_uid(source_uid) {
                self.broadcast_locked(&mut state, pos, scope, stream_id, &frame);
            }
        }
    }

    fn classify_locked(
        &self,
        state: &mut SequencerState,
        pos: usize,
        source_uid: u32,
        command: Command,
        stream_id: u32,
        payload: &Bytes,
    ) -> Classified {
        match command {
            Command::StreamData => {
                if !state.table.clients()[pos].initialized {
                    self.announce_vehicles(state, source_uid);
                    state.table.clients_mut()[pos].initialized = true;
                }
                Classified::Broadcast(BroadcastScope::Normal)
            },

            Command::StreamRegister => match StreamRegistration::from_payload(payload) {
                Ok(reg) => {
                    let mut reg = *reg;
                    let entry = &mut state.table.clients_mut()[pos];
                    if entry.streams.len() >= MAX_STREAMS {
                        tracing::debug!(
                            uid = source_uid,
                            "stream registration dropped, too many streams"
                        );
                        return Classified::Drop;
                    }

                    reg.sanitize_name();
                    tracing::info!(
                        uid = source_uid,
                        stream_id,
                        kind = reg.kind().map_or("unknown", StreamKind::label),
                        name = %reg.name(),
                        status = reg.status(),
                        "new stream registered"
                    );

                    if entry.vehicle_name.is_empty() && reg.kind() == Some(StreamKind::Truck) {
                        entry.vehicle_name = reg.name();
                    }
                    entry.streams.insert(stream_id, reg);
                    entry.traffic.insert(stream_id, Default::default());

                    Classified::StreamRegistered(reg)
                },
                Err(e) => {
                    tracing::warn!(uid = source_uid, error = %e, "malformed stream registration");
                    Classified::Drop
                },
            },

            Command::Chat => {
                let text = String::from_utf8_lossy(payload).into_owned();
                let nickname = state.table.clients()[pos].nickname.clone();
                tracing::info!(nickname = %nickname, "CHAT| {text}");
                state.chat.push(source_uid, nickname, text.clone());
                Classified::Chat(text)
            },

            Command::PrivChat => {
                if payload.len() >= 4 {
                    let target =
                        u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
                    if let Some(tpos) = state.table.pos_of_uid(target) {
                        let text = payload.slice(4..);
                        let len = text.len() as u64;
                        let frame = Frame::new(Command::Chat, source_uid, 1, text);
                        let dest = &mut state.table.clients_mut()[tpos];
                        if dest.broadcaster.queue_frame(frame) {
                            dest.traffic.entry(stream_id).or_default().bytes_out += len;
                            self.stats.add_out(len);
                        } else {
                            dest.traffic.entry(stream_id).or_default().dropped_frames += 1;
                            self.stats.add_drop();
                        }
                    }
                }
                Classified::Drop
            },

            Command::VehicleData => {
                if self.script.is_some() {
                    if let Some(position) = payloads::vehicle_position(payload) {
                        state.table.clients_mut()[pos].position = Some(position);
                    }
                }
                Classified::Broadcast(BroadcastScope::Normal)
            },

            _ => {
                tracing::warn!(uid = source_uid, ?command, "unexpected frame in session; dropping");
                Classified::Drop
            },
        }
    }

    /// Queue `frame` to every destination selected by `scope`, accumulating
    /// per-stream outbound accounting. Full queues count a drop and the frame
    /// is discarded for that destination only.
    fn broadcast_locked(
        &self,
        state: &mut SequencerState,
        sender_pos: usize,
        scope: BroadcastScope,
        stream_id: u32,
        frame: &Frame,
    ) {
        let len = frame.payload.len() as u64;

        for i in 0..state.table.len() {
            let include = match scope {
                BroadcastScope::Normal => i != sender_pos,
                BroadcastScope::All => true,
                BroadcastScope::Authed => {
                    i != sender_pos
                        && state.table.clients()[i].auth.contains(AuthFlags::ADMIN)
                },
            };

            let client = &mut state.table.clients_mut()[i];
            if !include || !client.flow {
                continue;
            }

            if client.broadcaster.queue_frame(frame.clone()) {
                client.traffic.entry(stream_id).or_default().bytes_out += len;
                self.stats.add_out(len);
            } else {
                client.traffic.entry(stream_id).or_default().dropped_frames += 1;
                self.stats.add_drop();
            }
        }
    }

    /// Announce the full roster to a late-initializing client and that
    /// client's identity to everyone else: every live client's UserInfo row
    /// (the newcomer's own included) plus every stored stream registration
    /// goes to the newcomer, and the newcomer's row goes to every other
    /// client.
    ///
    /// Caller must hold the state lock.
    fn announce_vehicles(&self, state: &mut SequencerState, uid: u32) {
        let Some(pos) = state.table.pos_of_uid(uid) else {
            return;
        };
        let table = state.table.clients();
        let newcomer = &table[pos];

        let own_info = UserJoinInfo::new(
            newcomer.slot as u32,
            newcomer.color,
            newcomer.auth.bits(),
            &newcomer.nickname,
        );
        let own_frame = Frame::new(Command::UserInfo, uid, 0, own_info.to_bytes().to_vec());

        for (i, other) in table.iter().enumerate() {
            let info =
                UserJoinInfo::new(other.slot as u32, other.color, other.auth.bits(), &other.nickname);
            let _ = newcomer
                .broadcaster
                .queue_frame(Frame::new(Command::UserInfo, other.uid, 0, info.to_bytes().to_vec()));

            if i != pos {
                let _ = other.broadcaster.queue_frame(own_frame.clone());
            }

            tracing::debug!(
                streams = other.streams.len(),
                uid = other.uid,
                "announcing streams to {uid}"
            );
            for (sid, reg) in &other.streams {
                let _ = newcomer.broadcaster.queue_frame(Frame::new(
                    Command::StreamRegister,
                    other.uid,
                    *sid,
                    reg.to_bytes().to_vec(),
                ));
            }
        }
    }

    fn account_in(&self, uid: u32, stream_id: u32, len: usize) {
        let mut state = self.state.lock();
        if let Some(entry) = state.table.by_uid_mut(uid) {
            entry.traffic.entry(stream_id).or_default().bytes_in += len as u64;
            self.stats.add_in(len as u64);
        }
    }

    // ------------------------------------------------------------------
    // Disconnect and teardown handoff
    // ------------------------------------------------------------------

    /// Remove a client and hand its entry to the reaper.
    ///
    /// Callable from any task, idempotent: a uid already gone is a no-op.
    /// The ranked user-event and `player_deleted` fire while the entry is
    /// still in the table, so handlers can still observe the departing
    /// client; then every live client (the departing one included) gets a
    /// Delete frame when `crashed`, a UserLeave frame otherwise, carrying
    /// the reason text, and the entry moves to the kill queue.
    pub fn disconnect(&self, uid: u32, reason: &str, crashed: bool) {
        // Lock order: kill queue first, then state. The kill guard stays
        // held across the hooks, serializing concurrent disconnects of the
        // same uid; handlers must not call back into disconnect/kick/ban.
        let mut kill = self.kill_queue.lock();

        let identity = {
            let state = self.state.lock();
            state.table.by_uid(uid).map(|c| {
                (c.auth.contains(AuthFlags::RANKED), c.user_token.clone(), c.nickname.clone())
            })
        };
        let Some((ranked, token, nickname)) = identity else {
            return;
        };

        // Hooks run with the state lock released but the entry still live
        // in the table; roster queries from a handler see the client.
        if ranked {
            if let Some(auth) = &self.auth {
                auth.send_user_event(
                    &token,
                    if crashed { UserEventKind::Crash } else { UserEventKind::Leave },
                    &nickname,
                    "",
                );
            }
        }
        if let Some(script) = &self.script {
            script.player_deleted(uid, crashed);
        }

        let entry = {
            let mut state = self.state.lock();
            let Some(pos) = state.table.pos_of_uid(uid) else {
                return;
            };
            tracing::info!(slot = pos, uid, reason, crashed, "disconnecting client");

            let notice_cmd = if crashed { Command::Delete } else { Command::UserLeave };
            let notice =
                Frame::new(notice_cmd, uid, SERVER_STREAM, reason.as_bytes().to_vec());
            for client in state.table.clients() {
                let _ = client.broadcaster.queue_frame(notice.clone());
            }

            state.table.remove_uid(uid)
        };
        let Some(entry) = entry else {
            return;
        };

        kill.push_back(entry);
        tracing::debug!(queued = kill.len(), "client handed to kill queue");
        drop(kill);

        self.kill_notify.notify_one();

        self.stats.record_disconnect(crashed);
        tracing::info!(
            crashed = self.stats.conn_crash(),
            total = self.stats.conn_count(),
            "disconnect statistics"
        );
        let state = self.state.lock();
        self.print_stats_locked(&state);
    }

    /// Pop the next doomed entry, if any. Reaper only.
    pub(crate) fn pop_doomed(&self) -> Option<ClientEntry> {
        self.kill_queue.lock().pop_front()
    }

    /// Wait for the next kill-queue signal. Reaper only.
    pub(crate) async fn doomed_notified(&self) {
        self.kill_notify.notified().await;
    }

    // ------------------------------------------------------------------
    // Moderation
    // ------------------------------------------------------------------

    /// Kick `target` on behalf of `mod_uid`. `false` if either uid is gone.
    pub fn kick(&self, target: u32, mod_uid: u32, reason: &str) -> bool {
        let names = {
            let state = self.state.lock();
            match (state.table.by_uid(target), state.table.by_uid(mod_uid)) {
                (Some(t), Some(m)) => Some((t.nickname.clone(), m.nickname.clone())),
                _ => None,
            }
        };
        let Some((target_nick, mod_nick)) = names else {
            return false;
        };

        tracing::info!(target = %target_nick, moderator = %mod_nick, "player kicked");
        self.disconnect(target, &format!("kicked by {mod_nick}: {reason}"), false);
        true
    }

    /// Ban `target`'s address and kick them. `false` if either uid is gone.
    pub fn ban(&self, target: u32, mod_uid: u32, reason: &str) -> bool {
        {
            let mut state = self.state.lock();
            let (Some(t), Some(m)) = (state.table.by_uid(target), state.table.by_uid(mod_uid))
            else {
                return false;
            };

            let record = BanRecord {
                uid: target,
                ip: t.peer_addr,
                nickname: t.nickname.clone(),
                banned_by: m.nickname.clone(),
                reason: reason.to_string(),
            };
            tracing::info!(banned = %record.nickname, by = %record.banned_by, "new ban added");
            state.bans.add(record);
        }

        self.kick(target, mod_uid, &format!("banned: {reason}"))
    }

    /// Remove the ban created for `uid`. `true` if one existed.
    pub fn unban(&self, uid: u32) -> bool {
        let removed = self.state.lock().bans.remove_uid(uid);
        if removed {
            tracing::info!(uid, "uid unbanned");
        }
        removed
    }

    fn is_moderator(&self, uid: u32) -> bool {
        self.state.lock().table.by_uid(uid).is_some_and(|c| c.auth.is_moderator())
    }

    fn handle_chat_command(&self, uid: u32, text: &str) {
        let Some(command) = parse_command(text) else {
            return;
        };

        match command {
            ChatCommand::Version => {
                self.server_say(SERVER_VERSION, Some(uid), SayKind::Server);
            },

            ChatCommand::List => {
                let mut lines =
                    vec![" uid | auth   | nick                 | vehicle".to_string()];
                {
                    let state = self.state.lock();
                    for c in state.table.clients() {
                        lines.push(format!(
                            "{:>4} | {:<6} | {:<20} | {}",
                            c.uid,
                            c.auth_letters(),
                            c.nickname,
                            c.vehicle_name
                        ));
                    }
                }
                for line in lines {
                    self.server_say(&line, Some(uid), SayKind::Server);
                }
            },

            ChatCommand::Bans => {
                let mut lines =
                    vec!["uid | IP              | nickname             | banned by".to_string()];
                {
                    let state = self.state.lock();
                    for b in state.bans.records() {
                        lines.push(format!(
                            "{:>3} | {:<15} | {:<20} | {:<20}",
                            b.uid, b.ip, b.nickname, b.banned_by
                        ));
                    }
                }
                for line in lines {
                    self.server_say(&line, Some(uid), SayKind::Server);
                }
            },

            ChatCommand::Kick { uid: target, reason } => {
                if !self.is_moderator(uid) {
                    self.server_say(
                        "You are not authorized to kick people!",
                        Some(uid),
                        SayKind::Server,
                    );
                    return;
                }
                if !self.kick(target, uid, &reason) {
                    self.server_say(
                        "kick not successful: uid not found!",
                        Some(uid),
                        SayKind::Server,
                    );
                }
            },

            ChatCommand::Ban { uid: target, reason } => {
                if !self.is_moderator(uid) {
                    self.server_say(
                        "You are not authorized to ban people!",
                        Some(uid),
                        SayKind::Server,
                    );
                    return;
                }
                if !self.ban(target, uid, &reason) {
                    self.server_say(
                        "kick + ban not successful: uid not found!",
                        Some(uid),
                        SayKind::Server,
                    );
                }
            },

            ChatCommand::Unban { uid: target } => {
                if !self.is_moderator(uid) {
                    self.server_say(
                        "You are not authorized to unban people!",
                        Some(uid),
                        SayKind::Server,
                    );
                    return;
                }
                if self.unban(target) {
                    self.server_say("ban removed", Some(uid), SayKind::Server);
                } else {
                    self.server_say("ban not removed: uid not found", Some(uid), SayKind::Server);
                }
            },

            ChatCommand::Malformed { command, usage } => {
                if !self.is_moderator(uid) {
                    self.server_say(
                        &format!("You are not authorized to {command} people!"),
                        Some(uid),
                        SayKind::Server,
                    );
                    return;
                }
                self.server_say(usage, Some(uid), SayKind::Server);
            },

            ChatCommand::Unknown => {},
        }
    }

    // ------------------------------------------------------------------
    // Server-origin messages
    // ------------------------------------------------------------------

    /// Queue a server-origin chat line to one flowing client, or to all of
    /// them when `to` is `None`.
    pub fn server_say(&self, message: &str, to: Option<u32>, kind: SayKind) {
        let text = match kind {
            SayKind::Server => format!("SERVER: {message}"),
            SayKind::Raw => message.to_string(),
        };
        let frame = Frame::new(Command::Chat, SERVER_UID, SERVER_STREAM, text.into_bytes());

        let state = self.state.lock();
        for client in state.table.clients() {
            if client.flow && to.is_none_or(|uid| uid == client.uid) {
                let _ = client.broadcaster.queue_frame(frame.clone());
            }
        }
    }

    /// Queue a server-origin game command to one client.
    pub fn send_game_command(&self, uid: u32, command_text: &str) -> bool {
        let frame = Frame::new(
            Command::GameCmd,
            SERVER_UID,
            SERVER_STREAM,
            command_text.as_bytes().to_vec(),
        );
        let state = self.state.lock();
        state.table.by_uid(uid).is_some_and(|c| c.broadcaster.queue_frame(frame))
    }

    /// Stream the message-of-the-day to one client as raw server chat.
    pub fn send_motd(&self, uid: u32) {
        let contents = match std::fs::read_to_string(&self.config.motd_file) {
            Ok(contents) => contents,
            Err(e) => {
                tracing::debug!(error = %e, "no message of the day");
                return;
            },
        };

        for line in contents.lines() {
            let line = line.trim_end();
            if line.len() <= 2 {
                continue;
            }
            self.server_say(line, Some(uid), SayKind::Raw);
        }
    }

    // ------------------------------------------------------------------
    // Snapshots and stats
    // ------------------------------------------------------------------

    /// Number of live clients.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.state.lock().table.len()
    }

    /// Snapshot of every live client.
    #[must_use]
    pub fn client_views(&self) -> Vec<ClientView> {
        let state = self.state.lock();
        state
            .table
            .clients()
            .iter()
            .enumerate()
            .map(|(slot, c)| ClientView {
                uid: c.uid,
                slot,
                nickname: c.nickname.clone(),
                color: c.color,
                auth: c.auth,
                flow: c.flow,
                initialized: c.initialized,
                vehicle_name: c.vehicle_name.clone(),
                stream_count: c.streams.len(),
                position: c.position,
            })
            .collect()
    }

    /// Snapshot of one client.
    #[must_use]
    pub fn client_view(&self, uid: u32) -> Option<ClientView> {
        self.client_views().into_iter().find(|v| v.uid == uid)
    }

    /// Number of standing bans.
    #[must_use]
    pub fn ban_count(&self) -> usize {
        self.state.lock().bans.len()
    }

    /// Number of records in the chat ring.
    #[must_use]
    pub fn chat_len(&self) -> usize {
        self.state.lock().chat.len()
    }

    /// Copy of the chat ring, oldest first.
    #[must_use]
    pub fn chat_records(&self) -> Vec<crate::chat::ChatRecord> {
        self.state.lock().chat.records().cloned().collect()
    }

    /// Occupancy document for the listing heartbeat.
    ///
    /// The client count is captured before the table lock is taken; callers
    /// must not hold any sequencer lock when invoking this.
    #[must_use]
    pub fn heartbeat_snapshot(&self, challenge: &str) -> String {
        let num_clients = self.client_count();

        let rows: Vec<HeartbeatRow> = {
            let state = self.state.lock();
            state
                .table
                .clients()
                .iter()
                .enumerate()
                .map(|(slot, c)| HeartbeatRow {
                    slot,
                    vehicle: c.vehicle_name.clone(),
                    nickname: c.nickname.clone(),
                    position: c.position,
                    ip: c.peer_addr,
                    token: c.user_token.clone(),
                    auth_letters: c.auth_letters(),
                })
                .collect()
        };

        format_heartbeat(challenge, num_clients, &rows)
    }

    /// Roll the per-stream minute windows. Driven by a once-a-minute task.
    pub fn update_minute_stats(&self) {
        let mut state = self.state.lock();
        for client in state.table.clients_mut() {
            for traffic in client.traffic.values_mut() {
                traffic.update_minute();
            }
        }
    }

    fn print_stats_locked(&self, state: &SequencerState) {
        if !self.config.print_stats {
            return;
        }

        tracing::info!("server occupancy:");
        tracing::info!("slot  uid   ip               auth color nickname, vehicle");
        for (i, c) in state.table.clients().iter().enumerate() {
            tracing::info!(
                "{:>4} {:>5} {:<16} {:>4} {:>5} {}, {}",
                i,
                c.uid,
                c.peer_addr.to_string(),
                c.auth_letters(),
                c.color,
                c.nickname,
                c.vehicle_name
            );
        }

        let uptime = self.stats.uptime().as_secs();
        tracing::info!(
            "traffic: uptime {}h{:02}m, in {:.2} MB, out {:.2} MB, {} frames dropped",
            uptime / 3600,
            (uptime % 3600) / 60,
            self.stats.bytes_in() as f64 / (1024.0 * 1024.0),
            self.stats.bytes_out() as f64 / (1024.0 * 1024.0),
            self.stats.dropped_frames()
        );
    }

    // ------------------------------------------------------------------
    // Shutdown
    // ------------------------------------------------------------------

    /// Notify every client, drop the listing registration, and give the
    /// broadcasters a moment to flush. The reaper drains afterwards.
    pub async fn shutdown(&self) {
        tracing::info!("closing. disconnecting clients ...");

        {
            let state = self.state.lock();
            let notice = Frame::new(
                Command::Delete,
                SERVER_UID,
                SERVER_STREAM,
                SHUTDOWN_NOTICE.as_bytes().to_vec(),
            );
            for client in state.table.clients() {
                let _ = client.broadcaster.queue_frame(notice.clone());
            }
        }

        if let Some(listing) = &self.listing {
            listing.unregister();
        }

        tokio::time::sleep(Duration::from_secs(2)).await;
        tracing::info!("all clients notified. exiting.");
    }
}

/// Fold a script decision into the default policy. `Auto` defers to the
/// default; any explicit decision is authoritative.
fn apply_decision(
    default: Option<BroadcastScope>,
    decision: BroadcastDecision,
) -> Option<BroadcastScope> {
    match decision {
        BroadcastDecision::Auto => default,
        BroadcastDecision::Block => None,
        BroadcastDecision::All => Some(BroadcastScope::All),
        BroadcastDecision::Normal => Some(BroadcastScope::Normal),
        BroadcastDecision::Authed => Some(BroadcastScope::Authed),
    }
}
