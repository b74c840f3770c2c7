//! Room manager: an array of rooms, each with a phase state machine, a
//! roster of client-slot indices, a host, and an embedded [`Game`].
//!
//! Rooms never touch a [`Sink`](crate::sink::Sink) or look up a nickname —
//! every operation here is pure state transition, returning [`RoomEvent`]s
//! that describe what happened. The coordinator resolves slot indices to
//! nicknames and turns events into wire lines.

use crate::cards::Card;
use crate::engine::{Game, PlayOutcome};
use crate::error::ErrorCode;

/// Hard cap on concurrent rooms, matching the protocol's fixed room table.
pub const MAX_ROOMS: usize = 64;
/// Hard cap on seats per room.
pub const MAX_ROOM_PLAYERS: usize = 4;
/// How long a room stays paused before the game is aborted, in seconds.
pub const PAUSE_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomPhase {
    Empty,
    Lobby,
    Game,
}

/// Something a room operation produced that the coordinator must relay to
/// clients. Every variant names the client-slot indices it concerns; the
/// coordinator resolves those to nicknames when it formats the wire line.
#[derive(Debug, Clone)]
pub enum RoomEvent {
    PlayerLeave { slot: usize },
    Host { slot: usize },
    GameEnd { winner: usize },
    GameAbort { reason: &'static str },
    GamePaused { slot: usize },
    GameResumed,
}

pub struct Room {
    pub used: bool,
    pub id: u32,
    pub name: String,
    pub size: usize,
    pub phase: RoomPhase,
    pub paused: bool,
    pub pause_started_at: Option<u64>,
    pub players: [Option<usize>; MAX_ROOM_PLAYERS],
    pub pcount: usize,
    pub host_pos: usize,
    pub game: Option<Game>,
}

impl Room {
    fn empty() -> Room {
        Room {
            used: false,
            id: 0,
            name: String::new(),
            size: 0,
            phase: RoomPhase::Empty,
            paused: false,
            pause_started_at: None,
            players: [None; MAX_ROOM_PLAYERS],
            pcount: 0,
            host_pos: 0,
            game: None,
        }
    }

    pub fn host_slot(&self) -> Option<usize> {
        self.players[self.host_pos]
    }

    pub fn position_of(&self, slot: usize) -> Option<usize> {
        self.players[..self.pcount].iter().position(|&p| p == Some(slot))
    }

    pub fn player_slots(&self) -> impl Iterator<Item = usize> + '_ {
        self.players[..self.pcount].iter().filter_map(|&p| p)
    }

    pub fn turn_slot(&self) -> Option<usize> {
        self.game.as_ref().and_then(|g| self.players[g.turn_pos()])
    }
}

pub struct RoomManager {
    rooms: Vec<Room>,
    next_id: u32,
}

impl RoomManager {
    /// Builds a manager with a fixed table of `max_rooms` slots, clamped to
    /// [`MAX_ROOMS`] (the protocol's hard cap).
    pub fn new(max_rooms: usize) -> RoomManager {
        let capacity = max_rooms.min(MAX_ROOMS);
        let mut rooms = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            rooms.push(Room::empty());
        }
        RoomManager { rooms, next_id: 1 }
    }

    pub fn get(&self, room_idx: usize) -> &Room {
        &self.rooms[room_idx]
    }

    pub fn iter_used(&self) -> impl Iterator<Item = &Room> {
        self.rooms.iter().filter(|r| r.used)
    }

    pub fn find_by_id(&self, id: u32) -> Option<usize> {
        self.rooms.iter().position(|r| r.used && r.id == id)
    }

    /// Finds the room (if any) containing `slot`, and that player's position
    /// within it.
    pub fn find_by_slot(&self, slot: usize) -> Option<(usize, usize)> {
        self.rooms.iter().enumerate().find_map(|(idx, r)| {
            r.used.then(|| r.position_of(slot)).flatten().map(|pos| (idx, pos))
        })
    }

    fn find_free(&self) -> Option<usize> {
        self.rooms.iter().position(|r| !r.used)
    }

    pub fn create(&mut self, host_slot: usize, name: String, size: usize) -> Result<u32, ErrorCode> {
        if !(2..=MAX_ROOM_PLAYERS).contains(&size) {
            return Err(ErrorCode::InvalidValue);
        }
        let idx = self.find_free().ok_or(ErrorCode::LimitReached)?;
        let id = self.next_id;
        self.next_id += 1;

        let mut players = [None; MAX_ROOM_PLAYERS];
        players[0] = Some(host_slot);

        self.rooms[idx] = Room {
            used: true,
            id,
            name,
            size,
            phase: RoomPhase::Lobby,
            paused: false,
            pause_started_at: None,
            players,
            pcount: 1,
            host_pos: 0,
            game: None,
        };
        Ok(id)
    }

    pub fn join(&mut self, room_idx: usize, slot: usize) -> Result<(), ErrorCode> {
        let room = &mut self.rooms[room_idx];
        if room.phase != RoomPhase::Lobby {
            return Err(ErrorCode::BadState);
        }
        if room.pcount >= room.size {
            return Err(ErrorCode::RoomFull);
        }
        room.players[room.pcount] = Some(slot);
        room.pcount += 1;
        Ok(())
    }

    /// Replaces `old_slot` with `new_slot` wherever it's seated in
    /// `room_idx`, for RESUME adopting a freshly-accepted socket's slot
    /// index. Position, host, and turn all stay put — only the client-slot
    /// index they refer to changes. No-op if `old_slot` isn't seated there.
    pub fn reseat(&mut self, room_idx: usize, old_slot: usize, new_slot: usize) {
        let room = &mut self.rooms[room_idx];
        for p in room.players[..room.pcount].iter_mut() {
            if *p == Some(old_slot) {
                *p = Some(new_slot);
            }
        }
    }

    pub fn start_game(&mut self, room_idx: usize, slot: usize, seed: u64) -> Result<(), ErrorCode> {
        let room = &mut self.rooms[room_idx];
        if room.host_slot() != Some(slot) {
            return Err(ErrorCode::NotHost);
        }
        if room.phase != RoomPhase::Lobby {
            return Err(ErrorCode::BadState);
        }
        if room.pcount < 2 {
            return Err(ErrorCode::NotEnoughPlayers);
        }
        room.game = Some(Game::start(room.pcount, seed));
        room.phase = RoomPhase::Game;
        room.paused = false;
        room.pause_started_at = None;
        Ok(())
    }

    pub fn play(
        &mut self,
        room_idx: usize,
        pos: usize,
        card: Card,
        wish: Option<&str>,
    ) -> Result<PlayOutcome, ErrorCode> {
        let room = &mut self.rooms[room_idx];
        if room.phase != RoomPhase::Game {
            return Err(ErrorCode::BadState);
        }
        if room.paused {
            return Err(ErrorCode::Paused);
        }
        let game = room.game.as_mut().ok_or(ErrorCode::BadState)?;
        let outcome = game.play(pos, card, wish)?;
        if outcome.winner_pos.is_some() {
            room.phase = RoomPhase::Lobby;
            room.paused = false;
            room.pause_started_at = None;
        }
        Ok(outcome)
    }

    pub fn draw(&mut self, room_idx: usize, pos: usize) -> Result<u32, ErrorCode> {
        let room = &mut self.rooms[room_idx];
        if room.phase != RoomPhase::Game {
            return Err(ErrorCode::BadState);
        }
        if room.paused {
            return Err(ErrorCode::Paused);
        }
        let game = room.game.as_mut().ok_or(ErrorCode::BadState)?;
        game.draw(pos)
    }

    /// Removes the player at `slot` from whichever room it occupies. Handles
    /// both lobby and mid-game removal (hand compaction is delegated to
    /// [`Game::remove_player`]); zeroes the room if it empties out.
    pub fn remove_player(&mut self, room_idx: usize, slot: usize) -> Vec<RoomEvent> {
        let room = &mut self.rooms[room_idx];
        let Some(pos) = room.position_of(slot) else {
            return Vec::new();
        };

        for i in pos..room.pcount - 1 {
            room.players[i] = room.players[i + 1];
        }
        room.players[room.pcount - 1] = None;
        room.pcount -= 1;

        let mut events = vec![RoomEvent::PlayerLeave { slot }];

        if room.phase == RoomPhase::Game {
            if let Some(game) = room.game.as_mut() {
                game.remove_player(pos);
            }
        }

        if room.pcount == 0 {
            self.rooms[room_idx] = Room::empty();
            return events;
        }

        let room = &mut self.rooms[room_idx];
        if room.host_pos == pos {
            room.host_pos = 0;
            events.push(RoomEvent::Host { slot: room.players[0].expect("pcount>0") });
        } else if room.host_pos > pos {
            room.host_pos -= 1;
        }

        if room.phase == RoomPhase::Game && room.pcount == 1 {
            let winner = room.players[0].expect("pcount==1");
            room.phase = RoomPhase::Lobby;
            room.paused = false;
            room.pause_started_at = None;
            room.game = None;
            events.push(RoomEvent::GameEnd { winner });
        }

        events
    }

    /// Aborts an in-progress game for an external reason (idle/offline
    /// timeout). No-op if the room isn't mid-game.
    pub fn abort_game(&mut self, room_idx: usize, reason: &'static str) -> Option<RoomEvent> {
        let room = &mut self.rooms[room_idx];
        if room.phase != RoomPhase::Game {
            return None;
        }
        room.phase = RoomPhase::Lobby;
        room.paused = false;
        room.pause_started_at = None;
        room.game = None;
        Some(RoomEvent::GameAbort { reason })
    }

    /// Recomputes the room's paused flag given whether any seated player is
    /// currently offline, pausing/resuming and emitting the matching event
    /// when the flag flips. Also aborts the game if the pause has run past
    /// [`PAUSE_TIMEOUT_SECS`].
    pub fn tick_pause(
        &mut self,
        room_idx: usize,
        any_offline: bool,
        offline_slot: Option<usize>,
        now: u64,
    ) -> Option<RoomEvent> {
        let room = &mut self.rooms[room_idx];
        if room.phase != RoomPhase::Game {
            return None;
        }

        if any_offline && !room.paused {
            room.paused = true;
            room.pause_started_at = Some(now);
            return offline_slot.map(|slot| RoomEvent::GamePaused { slot });
        }

        if !any_offline && room.paused {
            room.paused = false;
            room.pause_started_at = None;
            return Some(RoomEvent::GameResumed);
        }

        if room.paused {
            let started = room.pause_started_at.unwrap_or(now);
            if now.saturating_sub(started) > PAUSE_TIMEOUT_SECS {
                return self.abort_game(room_idx, "reconnect_timeout");
            }
        }

        None
    }

    pub fn rooms_mut(&mut self) -> &mut Vec<Room> {
        &mut self.rooms
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

impl Default for RoomManager {
    fn default() -> RoomManager {
        RoomManager::new(MAX_ROOMS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_rejects_bad_size() {
        let mut mgr = RoomManager::new(MAX_ROOMS);
        assert_eq!(mgr.create(0, "x".into(), 1), Err(ErrorCode::InvalidValue));
        assert_eq!(mgr.create(0, "x".into(), 5), Err(ErrorCode::InvalidValue));
    }

    #[test]
    fn join_rejects_full_room() {
        let mut mgr = RoomManager::new(MAX_ROOMS);
        let id = mgr.create(0, "x".into(), 2).unwrap();
        let idx = mgr.find_by_id(id).unwrap();
        mgr.join(idx, 1).unwrap();
        assert_eq!(mgr.join(idx, 2), Err(ErrorCode::RoomFull));
    }

    #[test]
    fn mid_game_removal_reassigns_host_and_compacts() {
        let mut mgr = RoomManager::new(MAX_ROOMS);
        let id = mgr.create(10, "x".into(), 3).unwrap();
        let idx = mgr.find_by_id(id).unwrap();
        mgr.join(idx, 11).unwrap();
        mgr.join(idx, 12).unwrap();
        mgr.start_game(idx, 10, 99).unwrap();

        let events = mgr.remove_player(idx, 10);
        assert!(matches!(events[0], RoomEvent::PlayerLeave { slot: 10 }));
        assert!(events.iter().any(|e| matches!(e, RoomEvent::Host { slot: 11 })));
        assert_eq!(mgr.get(idx).pcount, 2);
        assert_eq!(mgr.get(idx).players[0], Some(11));
        assert_eq!(mgr.get(idx).players[1], Some(12));
    }

    #[test]
    fn lone_survivor_wins_mid_game() {
        let mut mgr = RoomManager::new(MAX_ROOMS);
        let id = mgr.create(1, "x".into(), 2).unwrap();
        let idx = mgr.find_by_id(id).unwrap();
        mgr.join(idx, 2).unwrap();
        mgr.start_game(idx, 1, 5).unwrap();

        let events = mgr.remove_player(idx, 1);
        assert!(events.iter().any(|e| matches!(e, RoomEvent::GameEnd { winner: 2 })));
        assert_eq!(mgr.get(idx).phase, RoomPhase::Lobby);
    }

    #[test]
    fn pause_and_resume_round_trip() {
        let mut mgr = RoomManager::new(MAX_ROOMS);
        let id = mgr.create(1, "x".into(), 2).unwrap();
        let idx = mgr.find_by_id(id).unwrap();
        mgr.join(idx, 2).unwrap();
        mgr.start_game(idx, 1, 5).unwrap();

        let ev = mgr.tick_pause(idx, true, Some(2), 1000);
        assert!(matches!(ev, Some(RoomEvent::GamePaused { slot: 2 })));
        assert!(mgr.get(idx).paused);

        let ev = mgr.tick_pause(idx, false, None, 1001);
        assert!(matches!(ev, Some(RoomEvent::GameResumed)));
        assert!(!mgr.get(idx).paused);
    }

    #[test]
    fn pause_timeout_aborts_game() {
        let mut mgr = RoomManager::new(MAX_ROOMS);
        let id = mgr.create(1, "x".into(), 2).unwrap();
        let idx = mgr.find_by_id(id).unwrap();
        mgr.join(idx, 2).unwrap();
        mgr.start_game(idx, 1, 5).unwrap();

        mgr.tick_pause(idx, true, Some(2), 1000);
        let ev = mgr.tick_pause(idx, true, Some(2), 1000 + PAUSE_TIMEOUT_SECS + 1);
        assert!(matches!(ev, Some(RoomEvent::GameAbort { reason: "reconnect_timeout" })));
        assert_eq!(mgr.get(idx).phase, RoomPhase::Lobby);
    }
}
