//! Session/lobby coordinator: the client slot table, LOGIN/RESUME/LOGOUT,
//! nickname uniqueness, session tokens, room operations, command dispatch,
//! per-client strikes, and the periodic idle/offline/pause timers.
//!
//! A [`Coordinator`] is meant to be owned outright by one task (or, in a
//! single-threaded event loop, called directly from it) — every method here
//! runs a request to completion before returning, so the caller never needs
//! to guard it with a lock.

use rand::Rng;

use crate::cards::Card;
use crate::error::ErrorCode;
use crate::protocol::{self, Message, MsgType};
use crate::room::{RoomManager, RoomPhase};
use crate::sink::Sink;
use crate::slot::{ClientSlot, SlotState};

/// Online clients are dropped (soft: socket closed, slot kept for RESUME)
/// after this many seconds without a line.
pub const ONLINE_IDLE_TIMEOUT_SECS: u64 = 15;
/// Offline clients are fully forgotten after this many seconds unresumed.
pub const OFFLINE_TIMEOUT_SECS: u64 = 120;
/// Strikes (parse failures) a client may accrue before being dropped.
pub const MAX_STRIKES: u32 = 3;
/// Longest nickname accepted by LOGIN, in bytes.
pub const MAX_NICK_LEN: usize = 32;

pub struct Coordinator {
    slots: Vec<ClientSlot>,
    sinks: Vec<Option<Box<dyn Sink>>>,
    rooms: RoomManager,
    max_clients: usize,
}

impl Coordinator {
    pub fn new(max_clients: usize, max_rooms: usize) -> Coordinator {
        let mut slots = Vec::with_capacity(max_clients);
        let mut sinks = Vec::with_capacity(max_clients);
        for _ in 0..max_clients {
            slots.push(ClientSlot::empty());
            sinks.push(None);
        }
        Coordinator { slots, sinks, rooms: RoomManager::new(max_rooms), max_clients }
    }

    /// Allocates the lowest-indexed empty slot for a freshly-accepted
    /// connection. Returns `None` (caller must close the socket) if every
    /// slot is taken.
    pub fn accept(&mut self, sink: Box<dyn Sink>, now: u64) -> Option<usize> {
        let Some(slot) = (0..self.max_clients).find(|&i| self.slots[i].is_empty()) else {
            tracing::warn!(max_clients = self.max_clients, "rejecting connection, at capacity");
            return None;
        };
        self.slots[slot].accept(now);
        self.sinks[slot] = Some(sink);
        Some(slot)
    }

    /// One already-framed line arrived from `slot`.
    pub fn handle_line(&mut self, slot: usize, line: &str, now: u64) {
        self.slots[slot].touch(now);
        match protocol::parse(line) {
            Err(_) => self.strike(slot, "?", "bad_format"),
            Ok(msg) => self.dispatch(slot, msg, now),
        }
    }

    /// The transport detected a framing violation (line too long, or the
    /// receive buffer would overflow). Unlike an ordinary parse failure,
    /// this drops the slot immediately rather than accumulating a strike.
    pub fn frame_violation(&mut self, slot: usize, reason: &'static str) {
        self.send_err(slot, "?", ErrorCode::BadFormat, reason);
        self.drop_slot(slot);
    }

    /// Announces server shutdown to every connected client (`EVT SERVER
    /// msg=shutting_down`) and closes every open socket. Called once, right
    /// before the transport tears itself down.
    pub fn shutdown(&mut self) {
        for slot in 0..self.slots.len() {
            if self.slots[slot].state == SlotState::Connected && self.slots[slot].online {
                self.send_line(slot, "EVT SERVER msg=shutting_down");
            }
            if let Some(sink) = self.sinks[slot].as_mut() {
                sink.close();
            }
            self.sinks[slot] = None;
        }
    }

    /// The transport's socket for `slot` closed or errored out.
    pub fn disconnect(&mut self, slot: usize) {
        if self.slots[slot].is_empty() {
            return;
        }
        self.soft_offline(slot);
    }

    /// Runs the periodic (~250ms) timer sweep: online idle timeout, room
    /// pause bookkeeping, offline expiry.
    pub fn tick(&mut self, now: u64) {
        for slot in 0..self.slots.len() {
            if self.slots[slot].state == SlotState::Connected
                && self.slots[slot].online
                && now.saturating_sub(self.slots[slot].last_seen) > ONLINE_IDLE_TIMEOUT_SECS
            {
                self.soft_offline(slot);
            }
        }

        for idx in 0..self.rooms.room_count() {
            if self.rooms.get(idx).phase != RoomPhase::Game {
                continue;
            }
            let offline_slot = self.rooms.get(idx).player_slots().find(|&s| !self.slots[s].online);
            let any_offline = offline_slot.is_some();
            if let Some(ev) = self.rooms.tick_pause(idx, any_offline, offline_slot, now) {
                self.emit_room_event(idx, ev);
            }
        }

        for slot in 0..self.slots.len() {
            if self.slots[slot].state == SlotState::Connected
                && !self.slots[slot].online
                && now.saturating_sub(self.slots[slot].last_seen) > OFFLINE_TIMEOUT_SECS
            {
                self.expire_offline(slot);
            }
        }
    }

    fn dispatch(&mut self, slot: usize, msg: Message, now: u64) {
        if msg.msg_type != MsgType::Req {
            self.send_err(slot, &msg.cmd, ErrorCode::BadFormat, "expected_req");
            return;
        }
        match msg.cmd.as_str() {
            "LOGIN" => self.handle_login(slot, &msg),
            "RESUME" => self.handle_resume(slot, &msg, now),
            "LIST_ROOMS" => self.handle_list_rooms(slot),
            "CREATE_ROOM" => self.handle_create_room(slot, &msg),
            "JOIN_ROOM" => self.handle_join_room(slot, &msg),
            "LEAVE_ROOM" => self.handle_leave_room(slot),
            "START_GAME" => self.handle_start_game(slot, now),
            "PLAY" => self.handle_play(slot, &msg),
            "DRAW" => self.handle_draw(slot),
            "LOGOUT" => self.handle_logout(slot),
            "PING" => self.handle_ping(slot, now),
            other => self.send_err(slot, other, ErrorCode::UnknownCmd, "unknown_cmd"),
        }
    }

    fn require_logged_in(&mut self, slot: usize, cmd: &str) -> bool {
        if self.slots[slot].nick.is_none() {
            self.send_err(slot, cmd, ErrorCode::NotLogged, "not_logged_in");
            false
        } else {
            true
        }
    }

    fn handle_login(&mut self, slot: usize, msg: &Message) {
        let Some(nick) = msg.try_get("nick").filter(|n| !n.is_empty() && n.len() < MAX_NICK_LEN)
        else {
            self.send_err(slot, "LOGIN", ErrorCode::InvalidValue, "invalid_nick");
            return;
        };
        let nick = nick.to_string();

        let existing = (0..self.slots.len())
            .filter(|&i| i != slot)
            .find(|&i| self.slots[i].state == SlotState::Connected && self.slots[i].nick.as_deref() == Some(nick.as_str()));
        if let Some(other) = existing {
            if self.slots[other].online {
                self.send_err(slot, "LOGIN", ErrorCode::NickTaken, "already_online");
            } else {
                self.send_err(slot, "LOGIN", ErrorCode::NickTaken, "use_resume_offline");
            }
            return;
        }

        let token = generate_session_token();
        self.slots[slot].login(nick, token.clone());
        self.send_line(slot, &format!("RESP LOGIN ok=1 session={}", token));
    }

    fn handle_resume(&mut self, slot: usize, msg: &Message, now: u64) {
        let (Some(nick), Some(session)) = (msg.try_get("nick"), msg.try_get("session")) else {
            self.send_err(slot, "RESUME", ErrorCode::InvalidValue, "missing_fields");
            return;
        };

        let Some(old) = (0..self.slots.len())
            .find(|&i| self.slots[i].state == SlotState::Connected && self.slots[i].nick.as_deref() == Some(nick))
        else {
            self.send_err(slot, "RESUME", ErrorCode::BadSession, "no_such_session");
            return;
        };
        if self.slots[old].session_token.as_deref() != Some(session) {
            self.send_err(slot, "RESUME", ErrorCode::BadSession, "bad_session");
            return;
        }
        if self.slots[old].online {
            self.send_err(slot, "RESUME", ErrorCode::AlreadyOnline, "already_online");
            return;
        }

        let old_data = self.slots[old].clone();
        self.slots[slot].adopt(&old_data, now);
        self.slots[old].free();

        self.send_line(slot, "RESP RESUME ok=1");

        let Some(room_id) = self.slots[slot].room_id else { return };
        let Some(room_idx) = self.rooms.find_by_id(room_id) else { return };
        self.rooms.reseat(room_idx, old, slot);

        self.broadcast_room_line(room_idx, &format!("EVT PLAYER_ONLINE nick={}", self.nick_of(slot)), Some(slot));
        self.send_roster(slot, room_idx);
        self.send_state(slot, room_idx);
        if let Some(pos) = self.rooms.get(room_idx).position_of(slot) {
            self.send_hand(slot, room_idx, pos);
        }
        self.send_top_and_turn_to(slot, room_idx);

        let offline_slot = self.rooms.get(room_idx).player_slots().find(|&s| !self.slots[s].online);
        let any_offline = offline_slot.is_some();
        if let Some(ev) = self.rooms.tick_pause(room_idx, any_offline, offline_slot, now) {
            self.emit_room_event(room_idx, ev);
        }
    }

    fn handle_list_rooms(&mut self, slot: usize) {
        if !self.require_logged_in(slot, "LIST_ROOMS") {
            return;
        }
        let rooms: Vec<(u32, String, usize, usize, &'static str)> = self
            .rooms
            .iter_used()
            .map(|r| {
                let phase = match r.phase {
                    RoomPhase::Game => "GAME",
                    _ => "LOBBY",
                };
                (r.id, r.name.clone(), r.pcount, r.size, phase)
            })
            .collect();

        self.send_line(slot, &format!("RESP LIST_ROOMS count={}", rooms.len()));
        for (id, name, pcount, size, phase) in rooms {
            self.send_line(
                slot,
                &format!("EVT ROOM id={} name={} players={} size={} phase={}", id, name, pcount, size, phase),
            );
        }
    }

    fn handle_create_room(&mut self, slot: usize, msg: &Message) {
        if !self.require_logged_in(slot, "CREATE_ROOM") {
            return;
        }
        if self.slots[slot].room_id.is_some() {
            self.send_err(slot, "CREATE_ROOM", ErrorCode::BadState, "already_in_room");
            return;
        }
        let Some(name) = msg.try_get("name").filter(|n| !n.is_empty()) else {
            self.send_err(slot, "CREATE_ROOM", ErrorCode::InvalidValue, "invalid_name");
            return;
        };
        let Some(size) = msg.try_get("size").and_then(|s| s.parse::<usize>().ok()) else {
            self.send_err(slot, "CREATE_ROOM", ErrorCode::InvalidValue, "invalid_size");
            return;
        };

        match self.rooms.create(slot, name.to_string(), size) {
            Ok(id) => {
                self.slots[slot].room_id = Some(id);
                self.send_line(slot, &format!("RESP CREATE_ROOM ok=1 room={}", id));
            }
            Err(code) => self.send_err(slot, "CREATE_ROOM", code, "cannot_create_room"),
        }
    }

    fn handle_join_room(&mut self, slot: usize, msg: &Message) {
        if !self.require_logged_in(slot, "JOIN_ROOM") {
            return;
        }
        if self.slots[slot].room_id.is_some() {
            self.send_err(slot, "JOIN_ROOM", ErrorCode::BadState, "already_in_room");
            return;
        }
        let Some(room_id) = msg.try_get("room").and_then(|s| s.parse::<u32>().ok()) else {
            self.send_err(slot, "JOIN_ROOM", ErrorCode::InvalidValue, "invalid_room");
            return;
        };
        let Some(idx) = self.rooms.find_by_id(room_id) else {
            self.send_err(slot, "JOIN_ROOM", ErrorCode::NoSuchRoom, "no_such_room");
            return;
        };

        match self.rooms.join(idx, slot) {
            Ok(()) => {
                self.slots[slot].room_id = Some(room_id);
                self.send_line(slot, &format!("RESP JOIN_ROOM ok=1 room={}", room_id));
                self.broadcast_room_line(idx, &format!("EVT PLAYER_JOIN nick={}", self.nick_of(slot)), Some(slot));
                self.send_roster(slot, idx);
            }
            Err(code) => self.send_err(slot, "JOIN_ROOM", code, "cannot_join_room"),
        }
    }

    fn handle_leave_room(&mut self, slot: usize) {
        if !self.require_logged_in(slot, "LEAVE_ROOM") {
            return;
        }
        let Some(room_id) = self.slots[slot].room_id else {
            self.send_err(slot, "LEAVE_ROOM", ErrorCode::BadState, "not_in_room");
            return;
        };

        self.slots[slot].room_id = None;
        self.slots[slot].in_game = false;

        let Some(idx) = self.rooms.find_by_id(room_id) else {
            self.send_line(slot, "RESP LEAVE_ROOM ok=1");
            return;
        };
        let events = self.rooms.remove_player(idx, slot);
        self.send_line(slot, "RESP LEAVE_ROOM ok=1");
        self.emit_room_events(idx, events);
    }

    fn handle_start_game(&mut self, slot: usize, now: u64) {
        if !self.require_logged_in(slot, "START_GAME") {
            return;
        }
        let Some(room_id) = self.slots[slot].room_id else {
            self.send_err(slot, "START_GAME", ErrorCode::BadState, "not_in_room");
            return;
        };
        let Some(idx) = self.rooms.find_by_id(room_id) else {
            self.send_err(slot, "START_GAME", ErrorCode::NoSuchRoom, "no_such_room");
            return;
        };

        let seed = now ^ (room_id as u64);
        match self.rooms.start_game(idx, slot, seed) {
            Ok(()) => {
                let pcount = self.rooms.get(idx).pcount;
                self.broadcast_room_line(idx, &format!("EVT GAME_START players={}", pcount), None);

                let player_slots: Vec<usize> = self.rooms.get(idx).player_slots().collect();
                for (pos, &pslot) in player_slots.iter().enumerate() {
                    self.slots[pslot].in_game = true;
                    self.send_hand(pslot, idx, pos);
                }
                self.send_top_and_turn(idx);
            }
            Err(code) => self.send_err(slot, "START_GAME", code, "cannot_start_game"),
        }
    }

    fn handle_play(&mut self, slot: usize, msg: &Message) {
        if !self.require_logged_in(slot, "PLAY") {
            return;
        }
        let Some((idx, pos)) = self.active_room_pos(slot, "PLAY") else { return };

        let Some(card) = msg.try_get("card").and_then(Card::parse) else {
            self.send_err(slot, "PLAY", ErrorCode::InvalidValue, "bad_card");
            return;
        };
        let wish = msg.try_get("wish");

        match self.rooms.play(idx, pos, card, wish) {
            Ok(outcome) => {
                let nick = self.nick_of(slot);
                let wish_part = wish.map(|w| format!(" wish={}", w)).unwrap_or_default();
                self.broadcast_room_line(idx, &format!("EVT PLAYED nick={} card={}{}", nick, card, wish_part), None);

                if let Some(winner_pos) = outcome.winner_pos {
                    let winner_slot = self.rooms.get(idx).players[winner_pos].expect("winner seated");
                    let winner_nick = self.nick_of(winner_slot);
                    let room_slots: Vec<usize> = self.rooms.get(idx).player_slots().collect();
                    for s in room_slots {
                        self.slots[s].in_game = false;
                    }
                    self.broadcast_room_line(idx, &format!("EVT GAME_END winner={}", winner_nick), None);
                } else {
                    self.send_top_and_turn(idx);
                }
            }
            Err(code) => self.send_err(slot, "PLAY", code, "illegal_play"),
        }
    }

    fn handle_draw(&mut self, slot: usize) {
        if !self.require_logged_in(slot, "DRAW") {
            return;
        }
        let Some((idx, pos)) = self.active_room_pos(slot, "DRAW") else { return };

        match self.rooms.draw(idx, pos) {
            Ok(drawn) => {
                self.send_line(slot, &format!("RESP DRAW ok=1 drawn={}", drawn));
                self.send_top_and_turn(idx);
            }
            Err(code) => self.send_err(slot, "DRAW", code, "cannot_draw"),
        }
    }

    /// Resolves `slot`'s room and in-room position, shared by PLAY and DRAW.
    fn active_room_pos(&mut self, slot: usize, cmd: &'static str) -> Option<(usize, usize)> {
        let Some(room_id) = self.slots[slot].room_id else {
            self.send_err(slot, cmd, ErrorCode::BadState, "not_in_room");
            return None;
        };
        let Some(idx) = self.rooms.find_by_id(room_id) else {
            self.send_err(slot, cmd, ErrorCode::NoSuchRoom, "no_such_room");
            return None;
        };
        let Some(pos) = self.rooms.get(idx).position_of(slot) else {
            self.send_err(slot, cmd, ErrorCode::BadState, "not_in_room");
            return None;
        };
        Some((idx, pos))
    }

    fn handle_logout(&mut self, slot: usize) {
        if let Some(room_id) = self.slots[slot].room_id {
            if let Some(idx) = self.rooms.find_by_id(room_id) {
                let events = self.rooms.remove_player(idx, slot);
                self.emit_room_events(idx, events);
            }
        }
        self.send_line(slot, "RESP LOGOUT ok=1");
        if let Some(sink) = self.sinks[slot].as_mut() {
            sink.close();
        }
        self.slots[slot].free();
        self.sinks[slot] = None;
    }

    fn handle_ping(&mut self, slot: usize, now: u64) {
        self.slots[slot].touch(now);
        self.send_line(slot, "RESP PONG");
    }

    fn strike(&mut self, slot: usize, cmd: &str, reason: &str) {
        self.send_err(slot, cmd, ErrorCode::BadFormat, reason);
        self.slots[slot].strikes += 1;
        tracing::debug!(slot, strikes = self.slots[slot].strikes, reason, "strike recorded");
        if self.slots[slot].strikes > MAX_STRIKES {
            self.drop_slot(slot);
        }
    }

    /// Closes the socket and keeps the slot offline, for RESUME — used for
    /// both the online-idle timeout and a transport-reported disconnect.
    fn soft_offline(&mut self, slot: usize) {
        tracing::info!(slot, "client going offline");
        self.slots[slot].mark_offline();
        if let Some(sink) = self.sinks[slot].as_mut() {
            sink.close();
        }
        self.sinks[slot] = None;

        if let Some(room_id) = self.slots[slot].room_id {
            if let Some(idx) = self.rooms.find_by_id(room_id) {
                self.broadcast_room_line(idx, &format!("EVT PLAYER_OFFLINE nick={}", self.nick_of(slot)), Some(slot));
            }
        }
    }

    /// Hard drop: closes the socket, removes the slot from any room, frees
    /// it entirely. Used for strike overflow and framing violations.
    fn drop_slot(&mut self, slot: usize) {
        tracing::info!(slot, "dropping slot");
        if let Some(room_id) = self.slots[slot].room_id {
            if let Some(idx) = self.rooms.find_by_id(room_id) {
                let events = self.rooms.remove_player(idx, slot);
                self.emit_room_events(idx, events);
            }
        }
        if let Some(sink) = self.sinks[slot].as_mut() {
            sink.close();
        }
        self.sinks[slot] = None;
        self.slots[slot].free();
    }

    /// A 120s-unresumed offline client is fully forgotten. If it was mid-game,
    /// the pause timeout (`tick`, run just before this loop) will ordinarily
    /// have already aborted the room; this only aborts directly in the rarer
    /// case where the room never registered the pause.
    fn expire_offline(&mut self, slot: usize) {
        tracing::info!(slot, "offline client expired, forgetting slot");
        if let Some(room_id) = self.slots[slot].room_id {
            if let Some(idx) = self.rooms.find_by_id(room_id) {
                if let Some(ev) = self.rooms.abort_game(idx, "player_removed") {
                    self.emit_room_event(idx, ev);
                }
                let events = self.rooms.remove_player(idx, slot);
                self.emit_room_events(idx, events);
            }
        }
        self.slots[slot].free();
    }

    fn emit_room_events(&mut self, room_idx: usize, events: Vec<crate::room::RoomEvent>) {
        for ev in events {
            self.emit_room_event(room_idx, ev);
        }
    }

    fn emit_room_event(&mut self, room_idx: usize, ev: crate::room::RoomEvent) {
        use crate::room::RoomEvent;
        match ev {
            RoomEvent::PlayerLeave { slot } => {
                let nick = self.nick_of(slot);
                self.broadcast_room_line(room_idx, &format!("EVT PLAYER_LEAVE nick={}", nick), None);
            }
            RoomEvent::Host { slot } => {
                let nick = self.nick_of(slot);
                self.broadcast_room_line(room_idx, &format!("EVT HOST nick={}", nick), None);
            }
            RoomEvent::GameEnd { winner } => {
                let nick = self.nick_of(winner);
                let room_slots: Vec<usize> = self.rooms.get(room_idx).player_slots().collect();
                for s in room_slots {
                    self.slots[s].in_game = false;
                }
                self.broadcast_room_line(room_idx, &format!("EVT GAME_END winner={}", nick), None);
            }
            RoomEvent::GameAbort { reason } => {
                let room_slots: Vec<usize> = self.rooms.get(room_idx).player_slots().collect();
                for s in room_slots {
                    self.slots[s].in_game = false;
                }
                self.broadcast_room_line(room_idx, &format!("EVT GAME_ABORT reason={}", reason), None);
            }
            RoomEvent::GamePaused { slot } => {
                let nick = self.nick_of(slot);
                self.broadcast_room_line(room_idx, &format!("EVT GAME_PAUSED nick={} timeout=120", nick), None);
            }
            RoomEvent::GameResumed => {
                self.broadcast_room_line(room_idx, "EVT GAME_RESUMED", None);
            }
        }
    }

    /// Re-announces every seated member's online status to `slot` as a
    /// sequence of the same `PLAYER_ONLINE`/`PLAYER_OFFLINE` events the room
    /// would otherwise emit one at a time — used to resync a client that
    /// just joined or resumed, without inventing a wire vocabulary of its
    /// own (`ROSTER`/`PLAYER` aren't in spec §6's enumerated event set).
    fn send_roster(&mut self, slot: usize, room_idx: usize) {
        let members: Vec<usize> = self.rooms.get(room_idx).player_slots().collect();
        for s in members {
            let nick = self.slots[s].nick.clone().unwrap_or_default();
            let evt = if self.slots[s].online { "PLAYER_ONLINE" } else { "PLAYER_OFFLINE" };
            self.send_line(slot, &format!("EVT {} nick={}", evt, nick));
        }
    }

    fn send_state(&mut self, slot: usize, room_idx: usize) {
        let room = self.rooms.get(room_idx);
        let id = room.id;
        let phase = match room.phase {
            RoomPhase::Game => "GAME",
            _ => "LOBBY",
        };
        let paused = room.paused as u8;
        let top = room.game.as_ref().and_then(|g| g.top_card()).map(|c| c.to_string()).unwrap_or_else(|| "--".to_string());
        let suit = room.game.as_ref().and_then(|g| g.active_suit()).map(|s| s.to_string()).unwrap_or_else(|| "-".to_string());
        let penalty = room.game.as_ref().map(|g| g.penalty()).unwrap_or(0);
        let turn_slot = room.turn_slot();
        let turn_nick = turn_slot.map(|s| self.slots[s].nick.clone().unwrap_or_default()).unwrap_or_else(|| "-".to_string());
        self.send_line(
            slot,
            &format!(
                "EVT STATE room={} phase={} paused={} top={} active_suit={} penalty={} turn={}",
                id, phase, paused, top, suit, penalty, turn_nick
            ),
        );
    }

    fn send_hand(&mut self, slot: usize, room_idx: usize, pos: usize) {
        let Some(game) = self.rooms.get(room_idx).game.as_ref() else { return };
        let cards: Vec<String> = game.hand(pos).iter().map(|c| c.to_string()).collect();
        self.send_line(slot, &format!("EVT HAND cards={}", cards.join(",")));
    }

    fn send_top_and_turn(&mut self, room_idx: usize) {
        let room = self.rooms.get(room_idx);
        let Some(game) = room.game.as_ref() else { return };
        let top = game.top_card().map(|c| c.to_string()).unwrap_or_default();
        let suit = game.active_suit().map(|s| s.to_string()).unwrap_or_default();
        let penalty = game.penalty();
        let turn_slot = room.turn_slot();

        self.broadcast_room_line(room_idx, &format!("EVT TOP card={} active_suit={} penalty={}", top, suit, penalty), None);
        if let Some(tslot) = turn_slot {
            let nick = self.slots[tslot].nick.clone().unwrap_or_default();
            self.broadcast_room_line(room_idx, &format!("EVT TURN nick={}", nick), None);
        }
    }

    /// Like [`Coordinator::send_top_and_turn`] but targeted at one
    /// reconnecting client instead of the whole room, for RESUME.
    fn send_top_and_turn_to(&mut self, slot: usize, room_idx: usize) {
        let room = self.rooms.get(room_idx);
        let Some(game) = room.game.as_ref() else { return };
        let top = game.top_card().map(|c| c.to_string()).unwrap_or_default();
        let suit = game.active_suit().map(|s| s.to_string()).unwrap_or_default();
        let penalty = game.penalty();
        let turn_slot = room.turn_slot();
        let turn_nick = turn_slot.map(|s| self.slots[s].nick.clone().unwrap_or_default()).unwrap_or_default();

        self.send_line(slot, &format!("EVT TOP card={} active_suit={} penalty={}", top, suit, penalty));
        self.send_line(slot, &format!("EVT TURN nick={}", turn_nick));
    }

    fn broadcast_room_line(&mut self, room_idx: usize, line: &str, except: Option<usize>) {
        let members: Vec<usize> = self.rooms.get(room_idx).player_slots().collect();
        for s in members {
            if Some(s) == except {
                continue;
            }
            self.send_line(s, line);
        }
    }

    fn send_line(&mut self, slot: usize, line: &str) {
        if let Some(sink) = self.sinks[slot].as_mut() {
            sink.send_line(line);
        }
    }

    fn send_err(&mut self, slot: usize, cmd: &str, code: ErrorCode, msg: &str) {
        if let Some(sink) = self.sinks[slot].as_mut() {
            sink.send_err(cmd, code, msg);
        }
    }

    fn nick_of(&self, slot: usize) -> String {
        self.slots[slot].nick.clone().unwrap_or_default()
    }
}

/// Generates a 32-hex-character opaque session token.
fn generate_session_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 16] = std::array::from_fn(|_| rng.random());
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Recorder {
        lines: Vec<String>,
        closed: bool,
    }

    struct TestSink(Rc<RefCell<Recorder>>);

    impl Sink for TestSink {
        fn send_line(&mut self, line: &str) {
            self.0.borrow_mut().lines.push(line.to_string());
        }

        fn close(&mut self) {
            self.0.borrow_mut().closed = true;
        }
    }

    fn connect(co: &mut Coordinator, now: u64) -> (usize, Rc<RefCell<Recorder>>) {
        let rec = Rc::new(RefCell::new(Recorder::default()));
        let slot = co.accept(Box::new(TestSink(rec.clone())), now).unwrap();
        (slot, rec)
    }

    #[test]
    fn login_assigns_distinct_sessions() {
        let mut co = Coordinator::new(4, 8);
        let (a, rec_a) = connect(&mut co, 0);
        co.handle_line(a, "REQ LOGIN nick=alice", 0);
        let last = rec_a.borrow().lines.last().cloned().unwrap();
        assert!(last.starts_with("RESP LOGIN ok=1 session="));
    }

    #[test]
    fn login_rejects_duplicate_online_nick() {
        let mut co = Coordinator::new(4, 8);
        let (a, _rec_a) = connect(&mut co, 0);
        let (b, rec_b) = connect(&mut co, 0);
        co.handle_line(a, "REQ LOGIN nick=alice", 0);
        co.handle_line(b, "REQ LOGIN nick=alice", 0);
        let last = rec_b.borrow().lines.last().cloned().unwrap();
        assert_eq!(last, "ERR LOGIN code=NICK_TAKEN msg=already_online");
    }

    #[test]
    fn unknown_command_reports_unknown_cmd() {
        let mut co = Coordinator::new(4, 8);
        let (a, rec_a) = connect(&mut co, 0);
        co.handle_line(a, "REQ LOGIN nick=alice", 0);
        co.handle_line(a, "REQ NONSENSE", 0);
        let last = rec_a.borrow().lines.last().cloned().unwrap();
        assert_eq!(last, "ERR NONSENSE code=UNKNOWN_CMD msg=unknown_cmd");
    }

    #[test]
    fn four_strikes_drops_the_slot() {
        let mut co = Coordinator::new(4, 8);
        let (a, rec_a) = connect(&mut co, 0);
        for _ in 0..4 {
            co.handle_line(a, "garbage", 0);
        }
        assert!(rec_a.borrow().closed);
    }

    #[test]
    fn three_strikes_does_not_drop() {
        let mut co = Coordinator::new(4, 8);
        let (a, rec_a) = connect(&mut co, 0);
        for _ in 0..3 {
            co.handle_line(a, "garbage", 0);
        }
        assert!(!rec_a.borrow().closed);
    }

    #[test]
    fn full_game_start_deals_hands_and_announces_turn() {
        let mut co = Coordinator::new(4, 8);
        let (a, rec_a) = connect(&mut co, 0);
        let (b, rec_b) = connect(&mut co, 0);
        co.handle_line(a, "REQ LOGIN nick=alice", 0);
        co.handle_line(b, "REQ LOGIN nick=bob", 0);
        co.handle_line(a, "REQ CREATE_ROOM name=table size=2", 0);
        let create_line = rec_a.borrow().lines.last().cloned().unwrap();
        let room_id = create_line.rsplit('=').next().unwrap();
        co.handle_line(b, &format!("REQ JOIN_ROOM room={}", room_id), 0);
        co.handle_line(a, "REQ START_GAME", 1);

        assert!(rec_a.borrow().lines.iter().any(|l| l.starts_with("EVT HAND cards=")));
        assert!(rec_b.borrow().lines.iter().any(|l| l.starts_with("EVT HAND cards=")));
        assert!(rec_a.borrow().lines.iter().any(|l| l.starts_with("EVT TURN nick=")));
    }

    #[test]
    fn resume_rejects_wrong_session() {
        let mut co = Coordinator::new(4, 8);
        let (a, rec_a) = connect(&mut co, 0);
        co.handle_line(a, "REQ LOGIN nick=alice", 0);
        co.disconnect(a);

        let (c, rec_c) = connect(&mut co, 5);
        co.handle_line(c, "REQ RESUME nick=alice session=deadbeef", 5);
        let last = rec_c.borrow().lines.last().cloned().unwrap();
        assert_eq!(last, "ERR RESUME code=BAD_SESSION msg=bad_session");
        let _ = rec_a;
    }

    #[test]
    fn resume_adopts_offline_slot() {
        let mut co = Coordinator::new(4, 8);
        let (a, rec_a) = connect(&mut co, 0);
        co.handle_line(a, "REQ LOGIN nick=alice", 0);
        let session = rec_a.borrow().lines.last().cloned().unwrap().rsplit('=').next().unwrap().to_string();
        co.disconnect(a);

        let (c, rec_c) = connect(&mut co, 5);
        co.handle_line(c, &format!("REQ RESUME nick=alice session={}", session), 5);
        let last = rec_c.borrow().lines.last().cloned();
        assert_eq!(rec_c.borrow().lines.first().cloned(), Some("RESP RESUME ok=1".to_string()));
        let _ = last;
    }

    #[test]
    fn resume_mid_game_reseats_room_and_restores_play() {
        let mut co = Coordinator::new(4, 8);
        let (a, rec_a) = connect(&mut co, 0);
        let (b, _rec_b) = connect(&mut co, 0);
        co.handle_line(a, "REQ LOGIN nick=alice", 0);
        co.handle_line(b, "REQ LOGIN nick=bob", 0);
        co.handle_line(a, "REQ CREATE_ROOM name=table size=2", 0);
        let create_line = rec_a.borrow().lines.last().cloned().unwrap();
        let room_id = create_line.rsplit('=').next().unwrap().to_string();
        co.handle_line(b, &format!("REQ JOIN_ROOM room={}", room_id), 0);
        co.handle_line(a, "REQ START_GAME", 0);

        let session = rec_a.borrow().lines.first().cloned().unwrap().rsplit('=').next().unwrap().to_string();
        co.disconnect(a);

        let (c, rec_c) = connect(&mut co, 5);
        co.handle_line(c, &format!("REQ RESUME nick=alice session={}", session), 5);

        // The reseated slot must show up as an active room member with its
        // hand re-sent, not silently dropped because it still points at the
        // freed old slot index.
        assert!(rec_c.borrow().lines.iter().any(|l| l.starts_with("EVT HAND cards=")));
        assert!(rec_c.borrow().lines.iter().any(|l| l.starts_with("EVT STATE room=")));
        assert!(rec_c.borrow().lines.iter().any(|l| l == "EVT PLAYER_ONLINE nick=bob"));

        // PLAY/DRAW must resolve the resumed client's seat, whichever of the
        // two is currently on turn.
        co.handle_line(c, "REQ DRAW", 6);
        let last = rec_c.borrow().lines.last().cloned().unwrap();
        assert!(last.starts_with("RESP DRAW ok=1") || last == "ERR DRAW code=NOT_YOUR_TURN msg=cannot_draw");
    }

    #[test]
    fn shutdown_announces_and_closes_connected_clients() {
        let mut co = Coordinator::new(4, 8);
        let (a, rec_a) = connect(&mut co, 0);
        co.handle_line(a, "REQ LOGIN nick=alice", 0);

        co.shutdown();
        assert_eq!(rec_a.borrow().lines.last().cloned(), Some("EVT SERVER msg=shutting_down".to_string()));
        assert!(rec_a.borrow().closed);
    }
}
