//! `RoomManager`: per-room map, rate limits, backpressure,
//! fan-out, and the TTL reaper.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, instrument, warn};

use super::presence::{participant_infos, Participant, SessionHandle};
use super::rate_limit::SlidingWindowLimiter;
use crate::clock::{Clock, IdGenerator};
use crate::config::Config;
use crate::error::{CollabError, RoomError};
use crate::metrics;
use crate::ot::{DocumentState, Operation};
use crate::persistence::{SharedPersistence, SnapshotMeta};
use crate::protocol::validator::{ensure_op_id, with_user_id};
use crate::protocol::{ClientFrame, CursorState, ParticipantInfo, ServerFrame, SnapshotView};

/// Weight charged against a client's rate bucket per `OT_OP`.
const OT_OP_WEIGHT: f64 = 1.0;

/// One room's mutable state, held behind a single lock so every mutation
/// (document, participants, rate buckets) is linearized.
struct Room {
    document: DocumentState,
    participants: HashMap<String, Participant>,
    sessions: HashMap<String, SessionHandle>,
    rate_buckets: HashMap<String, SlidingWindowLimiter>,
    created_at: Instant,
    last_activity_at: Instant,
    last_snapshot_version: u64,
    last_snapshot_at: Instant,
}

impl Room {
    fn new(document: DocumentState, now: Instant) -> Self {
        let last_snapshot_version = document.version();
        Self {
            document,
            participants: HashMap::new(),
            sessions: HashMap::new(),
            rate_buckets: HashMap::new(),
            created_at: now,
            last_activity_at: now,
            last_snapshot_version,
            last_snapshot_at: now,
        }
    }

    /// Sum of unsent frames across every connected session
    /// (`pendingBroadcastDepth`).
    fn pending_broadcast_depth(&self) -> usize {
        self.sessions.values().map(SessionHandle::queue_depth).sum()
    }

    fn bucket(&mut self, client_id: &str, rate_max: f64, window: std::time::Duration) -> &mut SlidingWindowLimiter {
        self.rate_buckets
            .entry(client_id.to_string())
            .or_insert_with(|| SlidingWindowLimiter::new(window, rate_max))
    }

    /// Sends `frame` to every connected session except `exclude`, returning
    /// the `clientId`s whose queue was full (unhealthy, to be disconnected).
    fn broadcast(&self, frame: ServerFrame, exclude: Option<&str>) -> Vec<String> {
        let mut unhealthy = Vec::new();
        for (client_id, handle) in &self.sessions {
            if exclude == Some(client_id.as_str()) {
                continue;
            }
            if handle.try_send(frame.clone()).is_err() {
                unhealthy.push(client_id.clone());
            }
        }
        unhealthy
    }

    fn participant_list(&self) -> Vec<ParticipantInfo> {
        participant_infos(&self.participants)
    }

    /// Removes `client_id` and broadcasts `ParticipantLeft` to whoever
    /// remains, returning the removed handle (if any) so the caller can
    /// additionally tear down its transport loop. A no-op (no broadcast) if
    /// `client_id` was already removed, so an eviction followed by the
    /// session's own `close()`-triggered `leave()` doesn't double-announce.
    fn remove_participant(&mut self, room_id: &str, client_id: &str) -> Option<SessionHandle> {
        let participant = self.participants.remove(client_id)?;
        let handle = self.sessions.remove(client_id);

        let frame = ServerFrame::ParticipantLeft {
            room_id: room_id.to_string(),
            client_id: client_id.to_string(),
            user_id: participant.user_id,
            participants: self.participant_list(),
        };
        self.broadcast(frame, None);
        handle
    }
}

/// Result of a successful `JOIN_ROOM`.
pub struct JoinOutcome {
    pub version: u64,
    pub content: String,
    pub participants: Vec<ParticipantInfo>,
    /// Signaled if the Room Manager later evicts this session on its own
    /// (e.g. a full outbound queue); the session layer watches this
    /// alongside its normal inbound/outbound traffic to tear the connection
    /// down promptly instead of serving a client the manager no longer
    /// considers joined.
    pub closed: Arc<Notify>,
}

/// Result of a `SYNC_STATE` request.
pub struct SyncStateOutcome {
    pub snapshot: SnapshotView,
    pub operations: Vec<Operation>,
    pub participants: Vec<ParticipantInfo>,
    pub cursor_states: Vec<CursorState>,
}

/// Owns every live room and is the sole place document/participant/rate
/// state is mutated.
pub struct RoomManager {
    rooms: DashMap<String, Arc<Mutex<Room>>>,
    config: Config,
    clock: Arc<dyn Clock>,
    id_gen: Arc<dyn IdGenerator>,
    persistence: SharedPersistence,
}

impl RoomManager {
    pub fn new(config: Config, clock: Arc<dyn Clock>, id_gen: Arc<dyn IdGenerator>, persistence: SharedPersistence) -> Self {
        Self { rooms: DashMap::new(), config, clock, id_gen, persistence }
    }

    /// Looks up a live room, or rehydrates one from the last durable snapshot
    /// (falling back to an empty document if none exists) and inserts it.
    /// This is what lets a room that cycled through the reaper resume where
    /// it left off instead of silently restarting at version 0.
    async fn get_or_create_room(&self, room_id: &str) -> Arc<Mutex<Room>> {
        if let Some(room) = self.rooms.get(room_id) {
            return room.clone();
        }

        let snapshot = self.persistence.load_latest_snapshot(room_id).await.ok().flatten();
        let now = self.clock.now();
        self.rooms
            .entry(room_id.to_string())
            .or_insert_with(|| {
                let document = match snapshot {
                    Some(s) => DocumentState::from_snapshot(s.version, s.content),
                    None => DocumentState::new(),
                };
                Arc::new(Mutex::new(Room::new(document, now)))
            })
            .clone()
    }

    fn get_room(&self, room_id: &str) -> Result<Arc<Mutex<Room>>, RoomError> {
        self.rooms.get(room_id).map(|r| r.clone()).ok_or_else(|| RoomError::UnknownRoom(room_id.to_string()))
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Live participant count for `room_id`, `0` if the room doesn't exist.
    /// Used by monitoring and by tests to observe disconnects the Room
    /// Manager performs internally (e.g. a full outbound queue).
    pub fn participant_count(&self, room_id: &str) -> usize {
        self.rooms.get(room_id).map(|r| r.lock().participants.len()).unwrap_or(0)
    }

    /// `JOIN_ROOM`. Creates the room lazily, restores
    /// any persisted cursor for `userId`, and broadcasts `ParticipantJoined`.
    #[instrument(skip(self, tx, user_info), fields(room_id = %room_id, client_id = %client_id))]
    pub async fn join(
        &self,
        room_id: &str,
        user_id: &str,
        client_id: &str,
        user_info: Option<std::collections::HashMap<String, String>>,
        tx: tokio::sync::mpsc::Sender<ServerFrame>,
    ) -> Result<JoinOutcome, RoomError> {
        let _ = user_info; // opaque, informational only
        let room = self.get_or_create_room(room_id).await;

        let restored_cursor = self.persistence.load_cursors(room_id).await.unwrap_or_default();

        let (version, content, participants, closed);
        {
            let mut g = room.lock();
            if g.participants.len() >= self.config.max_participants_per_room {
                return Err(RoomError::RoomFull { room_id: room_id.to_string(), max: self.config.max_participants_per_room });
            }

            let mut participant = Participant::new(user_id, self.clock.now());
            if let Some(c) = restored_cursor.iter().find(|c| c.user_id == user_id) {
                participant.cursor = Some(c.cursor);
            }
            g.participants.insert(client_id.to_string(), participant);
            let handle = SessionHandle::new(client_id, user_id, tx);
            closed = handle.close_signal();
            g.sessions.insert(client_id.to_string(), handle);
            g.last_activity_at = self.clock.now();

            let (v, c) = g.document.snapshot();
            version = v;
            content = c;
            participants = g.participant_list();

            let frame = ServerFrame::ParticipantJoined {
                room_id: room_id.to_string(),
                client_id: client_id.to_string(),
                user_id: user_id.to_string(),
                participants: participants.clone(),
            };
            g.broadcast(frame, Some(client_id));
            metrics::set_queue_depth(room_id, g.pending_broadcast_depth());
        }
        metrics::set_room_count(self.room_count());
        debug!("client joined room");
        Ok(JoinOutcome { version, content, participants, closed })
    }

    /// `LEAVE_ROOM` or connection drop.
    #[instrument(skip(self), fields(room_id = %room_id, client_id = %client_id))]
    pub fn leave(&self, room_id: &str, client_id: &str) -> Result<(), RoomError> {
        let room = self.get_room(room_id)?;
        let mut g = room.lock();
        g.remove_participant(room_id, client_id);
        g.last_activity_at = self.clock.now();
        Ok(())
    }

    /// `OT_OP`.
    /// Sends the ACK to the submitter and the broadcast to peers itself;
    /// returns the applied version for logging/metrics at the call site.
    #[instrument(skip(self, op), fields(room_id = %room_id, client_id = %client_id))]
    pub async fn submit_operation(&self, room_id: &str, client_id: &str, mut op: Operation) -> Result<u64, CollabError> {
        let room = self.get_room(room_id).map_err(CollabError::from)?;

        let (version, applied, snapshot_due) = {
            let mut g = room.lock();

            let now = self.clock.now();
            let allowed = g.bucket(client_id, self.config.rate_max, self.config.rate_window).try_consume(now, OT_OP_WEIGHT);
            if !allowed {
                metrics::record_rate_limit_rejection();
                warn!("rate limit rejected op");
                return Err(CollabError::from(RoomError::RateLimited { room_id: room_id.to_string(), client_id: client_id.to_string() }));
            }

            op = ensure_op_id(op, self.id_gen.as_ref());
            if let Some(p) = g.participants.get(client_id) {
                op = with_user_id(op, p.user_id.clone());
            }

            let (applied, version) = g.document.apply(op)?;

            if let Some(handle) = g.sessions.get(client_id) {
                let _ = handle.try_send(ServerFrame::Ack { operation_id: applied.id.clone(), version });
            }

            let depth = g.pending_broadcast_depth();
            if depth >= self.config.backpressure_threshold {
                if let Some(handle) = g.sessions.get(client_id) {
                    let _ = handle.try_send(ServerFrame::Backpressure {
                        room_id: room_id.to_string(),
                        client_id: client_id.to_string(),
                        message: format!("pending broadcast depth {depth} at or above threshold"),
                    });
                }
            }

            let broadcast_frame = ServerFrame::OtOpBroadcast {
                room_id: room_id.to_string(),
                operation: applied.clone(),
                version,
                sender_client_id: client_id.to_string(),
            };
            let unhealthy = g.broadcast(broadcast_frame, Some(client_id));
            for dead in unhealthy {
                warn!(client_id = %dead, "evicting session with a full outbound queue");
                if let Some(handle) = g.remove_participant(room_id, &dead) {
                    handle.disconnect();
                }
            }

            g.last_activity_at = now;
            metrics::set_queue_depth(room_id, g.pending_broadcast_depth());

            let snapshot_due = version.saturating_sub(g.last_snapshot_version) >= self.config.snapshot_ops
                || now.saturating_duration_since(g.last_snapshot_at) >= self.config.snapshot_interval;

            (version, applied, snapshot_due)
        };

        self.persist_operation_background(room_id, applied);
        if snapshot_due {
            self.maybe_snapshot(room_id.to_string(), room);
        }

        Ok(version)
    }

    /// `CURSOR_UPDATE`. Shares the `OT_OP` rate
    /// bucket at a lighter weight; never rejects on document grounds.
    #[instrument(skip(self), fields(room_id = %room_id, client_id = %client_id))]
    pub fn cursor_update(&self, room_id: &str, client_id: &str, cursor: crate::protocol::Cursor) -> Result<(), RoomError> {
        let room = self.get_room(room_id)?;
        let mut g = room.lock();

        let now = self.clock.now();
        let _ = g.bucket(client_id, self.config.rate_max, self.config.rate_window).try_consume(now, self.config.cursor_update_weight);

        let user_id = match g.participants.get_mut(client_id) {
            Some(p) => {
                p.cursor = Some(cursor);
                p.user_id.clone()
            }
            None => return Err(RoomError::NotJoined),
        };

        let frame = ServerFrame::CursorUpdateBroadcast {
            room_id: room_id.to_string(),
            client_id: client_id.to_string(),
            user_id: user_id.clone(),
            cursor,
        };
        g.broadcast(frame, Some(client_id));
        g.last_activity_at = now;
        drop(g);

        let persistence = self.persistence.clone();
        let room_id = room_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = persistence.save_cursor(&room_id, &user_id, cursor).await {
                warn!(error = %e, "failed to persist cursor");
            }
        });

        Ok(())
    }

    /// `SYNC_STATE`. When
    /// `fromVersion` is still within the retained in-memory history, replies
    /// with the live snapshot and the missed tail. When it predates
    /// truncation, falls back to the last durable snapshot plus the full
    /// retained tail.
    #[instrument(skip(self), fields(room_id = %room_id, client_id = %client_id))]
    pub async fn sync_state(&self, room_id: &str, client_id: &str, from_version: u64) -> Result<SyncStateOutcome, RoomError> {
        let room = self.get_room(room_id)?;

        let needs_durable_snapshot = {
            let g = room.lock();
            from_version < g.document.snapshot_version()
        };

        if needs_durable_snapshot {
            if let Ok(Some(stored)) = self.persistence.load_latest_snapshot(room_id).await {
                let g = room.lock();
                let operations = g.document.operations_since(stored.version, Some(client_id));
                return Ok(SyncStateOutcome {
                    snapshot: SnapshotView { version: stored.version, content: stored.content },
                    operations,
                    participants: g.participant_list(),
                    cursor_states: cursor_states(&g.participants),
                });
            }
            // Persistence miss on a lagged client: degrade to the full live
            // snapshot rather than fail the request.
        }

        // Either the client is already within the retained window (nothing to
        // replay beyond the live snapshot) or persistence couldn't produce an
        // older baseline; either way the live snapshot alone is sufficient
        // and correct, so `operations` is empty (it would otherwise double
        // apply on top of already-current content).
        let g = room.lock();
        let (version, content) = g.document.snapshot();
        Ok(SyncStateOutcome {
            snapshot: SnapshotView { version, content },
            operations: Vec::new(),
            participants: g.participant_list(),
            cursor_states: cursor_states(&g.participants),
        })
    }

    /// Dispatches a single validated frame that isn't `JOIN_ROOM`/`LEAVE_ROOM`
    /// (those need the session's outbound sender, owned by the session
    /// layer). Convenience used by integration tests; the session layer
    /// calls the typed methods directly in production.
    pub async fn dispatch(&self, frame: ClientFrame) -> Result<(), CollabError> {
        match frame {
            ClientFrame::OtOp { room_id, client_id, operation } => {
                self.submit_operation(&room_id, &client_id, operation).await?;
                Ok(())
            }
            ClientFrame::CursorUpdate { room_id, client_id, cursor } => {
                self.cursor_update(&room_id, &client_id, cursor).map_err(CollabError::from)
            }
            ClientFrame::LeaveRoom { room_id, client_id } => self.leave(&room_id, &client_id).map_err(CollabError::from),
            ClientFrame::JoinRoom { .. } | ClientFrame::SyncState { .. } | ClientFrame::Ack { .. } => {
                Err(CollabError::Internal("frame requires a session handle or is answered directly".into()))
            }
        }
    }

    fn persist_operation_background(&self, room_id: &str, op: Operation) {
        let persistence = self.persistence.clone();
        let room_id = room_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = persistence.append_operation(&room_id, &op).await {
                warn!(error = %e, "failed to persist operation");
            }
        });
    }

    /// Snapshot policy: fires when due, and truncates history
    /// only after the durable write succeeds.
    fn maybe_snapshot(&self, room_id: String, room: Arc<Mutex<Room>>) {
        let persistence = self.persistence.clone();
        let clock = self.clock.clone();
        tokio::spawn(async move {
            let (version, content) = {
                let g = room.lock();
                g.document.snapshot()
            };
            match persistence.save_snapshot(&room_id, version, &content, SnapshotMeta::default()).await {
                Ok(()) => {
                    let mut g = room.lock();
                    g.document.truncate_history_before(version);
                    g.last_snapshot_version = version;
                    g.last_snapshot_at = clock.now();
                }
                Err(e) => warn!(error = %e, room_id = %room_id, "snapshot failed, history not truncated"),
            }
        });
    }

    /// Runs the TTL reaper forever on the current task; callers typically
    /// `tokio::spawn` this.
    pub async fn run_reaper(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.reaper_interval);
        loop {
            ticker.tick().await;
            self.reap_once().await;
        }
    }

    /// One reaper sweep: evict empty rooms idle past
    /// `ROOM_TTL`, flushing a final snapshot first.
    pub async fn reap_once(&self) {
        let now = self.clock.now();
        let candidates: Vec<String> = self
            .rooms
            .iter()
            .filter(|e| {
                let g = e.value().lock();
                g.participants.is_empty() && now.saturating_duration_since(g.last_activity_at) > self.config.room_ttl
            })
            .map(|e| e.key().clone())
            .collect();

        for room_id in candidates {
            if let Some((_, room)) = self.rooms.remove(&room_id) {
                let still_empty = {
                    let g = room.lock();
                    g.participants.is_empty()
                };
                if !still_empty {
                    self.rooms.insert(room_id, room);
                    continue;
                }
                let (version, content, age) = {
                    let g = room.lock();
                    let (version, content) = g.document.snapshot();
                    (version, content, now.saturating_duration_since(g.created_at))
                };
                if let Err(e) = self.persistence.save_snapshot(&room_id, version, &content, SnapshotMeta::default()).await {
                    warn!(error = %e, room_id = %room_id, "final reaper snapshot failed");
                }
                debug!(room_id = %room_id, age_secs = age.as_secs(), "reaped idle room");
            }
        }
        metrics::set_room_count(self.room_count());
    }
}

fn cursor_states(participants: &HashMap<String, Participant>) -> Vec<CursorState> {
    participants
        .values()
        .filter_map(|p| p.cursor.map(|c| CursorState { user_id: p.user_id.clone(), cursor: c }))
        .collect()
}
