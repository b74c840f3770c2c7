//! Client slot table (spec's `{state, nick, session_token, room_id, ...}`
//! record, adapted to explicit `Option`s instead of sentinel values).

/// Lifecycle state of a slot. A slot is either unused, or holds a client
/// that is either currently connected (`online`) or kept around for
/// [`RESUME`](crate::coordinator) (`offline`) — tracked via
/// [`ClientSlot::online`] rather than a third enum variant, since every
/// other field (nick, session, room) stays populated while offline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Empty,
    Connected,
}

/// One client slot. Reused across disconnects until freed by LOGOUT,
/// offline-timeout, or a RESUME that adopts it from a different socket.
#[derive(Debug, Clone)]
pub struct ClientSlot {
    pub state: SlotState,
    pub nick: Option<String>,
    pub session_token: Option<String>,
    pub room_id: Option<u32>,
    pub in_game: bool,
    pub online: bool,
    pub last_seen: u64,
    pub strikes: u32,
}

impl ClientSlot {
    pub fn empty() -> ClientSlot {
        ClientSlot {
            state: SlotState::Empty,
            nick: None,
            session_token: None,
            room_id: None,
            in_game: false,
            online: false,
            last_seen: 0,
            strikes: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.state == SlotState::Empty
    }

    /// Allocates this slot for a freshly-accepted connection. Does not log
    /// the client in — `nick`/`session_token` are set by LOGIN.
    pub fn accept(&mut self, now: u64) {
        *self = ClientSlot {
            state: SlotState::Connected,
            online: true,
            last_seen: now,
            ..ClientSlot::empty()
        };
    }

    /// Logs the client in under `nick`, generating a fresh session token.
    pub fn login(&mut self, nick: String, session_token: String) {
        self.nick = Some(nick);
        self.session_token = Some(session_token);
    }

    /// Adopts the identity (nick, session, room, in_game) of a slot that was
    /// offline, for a RESUME from a new connection. `self` must already be a
    /// freshly-accepted slot.
    pub fn adopt(&mut self, from: &ClientSlot, now: u64) {
        self.nick = from.nick.clone();
        self.session_token = from.session_token.clone();
        self.room_id = from.room_id;
        self.in_game = from.in_game;
        self.online = true;
        self.last_seen = now;
        self.strikes = 0;
    }

    pub fn mark_offline(&mut self) {
        self.online = false;
    }

    pub fn touch(&mut self, now: u64) {
        self.online = true;
        self.last_seen = now;
    }

    /// Drops this slot back to [`SlotState::Empty`], clearing every field.
    pub fn free(&mut self) {
        *self = ClientSlot::empty();
    }
}
