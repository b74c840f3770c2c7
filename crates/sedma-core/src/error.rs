//! Wire error codes (spec.md §7).
//!
//! Every validation failure the coordinator or engine can produce maps to
//! exactly one of these, each with a fixed wire token, so `ERR <cmd>
//! code=<CODE> msg=<token>` never depends on ad-hoc string formatting at the
//! call site.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ErrorCode {
    #[error("BAD_FORMAT")]
    BadFormat,
    #[error("INVALID_VALUE")]
    InvalidValue,
    #[error("UNKNOWN_CMD")]
    UnknownCmd,
    #[error("NOT_LOGGED")]
    NotLogged,
    #[error("NICK_TAKEN")]
    NickTaken,
    #[error("BAD_SESSION")]
    BadSession,
    #[error("ALREADY_ONLINE")]
    AlreadyOnline,
    #[error("BAD_STATE")]
    BadState,
    #[error("NO_SUCH_ROOM")]
    NoSuchRoom,
    #[error("ROOM_FULL")]
    RoomFull,
    #[error("LIMIT_REACHED")]
    LimitReached,
    #[error("NOT_HOST")]
    NotHost,
    #[error("NOT_ENOUGH_PLAYERS")]
    NotEnoughPlayers,
    #[error("PAUSED")]
    Paused,
    #[error("NOT_YOUR_TURN")]
    NotYourTurn,
    #[error("NO_SUCH_CARD")]
    NoSuchCard,
    #[error("ILLEGAL_CARD")]
    IllegalCard,
    #[error("WISH_REQUIRED")]
    WishRequired,
    #[error("BAD_WISH")]
    BadWish,
    #[error("MUST_STACK_OR_DRAW")]
    MustStackOrDraw,
}

impl ErrorCode {
    /// The exact wire token for this code, identical to its `Display`.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::BadFormat => "BAD_FORMAT",
            ErrorCode::InvalidValue => "INVALID_VALUE",
            ErrorCode::UnknownCmd => "UNKNOWN_CMD",
            ErrorCode::NotLogged => "NOT_LOGGED",
            ErrorCode::NickTaken => "NICK_TAKEN",
            ErrorCode::BadSession => "BAD_SESSION",
            ErrorCode::AlreadyOnline => "ALREADY_ONLINE",
            ErrorCode::BadState => "BAD_STATE",
            ErrorCode::NoSuchRoom => "NO_SUCH_ROOM",
            ErrorCode::RoomFull => "ROOM_FULL",
            ErrorCode::LimitReached => "LIMIT_REACHED",
            ErrorCode::NotHost => "NOT_HOST",
            ErrorCode::NotEnoughPlayers => "NOT_ENOUGH_PLAYERS",
            ErrorCode::Paused => "PAUSED",
            ErrorCode::NotYourTurn => "NOT_YOUR_TURN",
            ErrorCode::NoSuchCard => "NO_SUCH_CARD",
            ErrorCode::IllegalCard => "ILLEGAL_CARD",
            ErrorCode::WishRequired => "WISH_REQUIRED",
            ErrorCode::BadWish => "BAD_WISH",
            ErrorCode::MustStackOrDraw => "MUST_STACK_OR_DRAW",
        }
    }
}
