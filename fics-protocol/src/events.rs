//! Structured events recognised in the server's output.
//!
//! Every record is plain data. Events are built per line, handed to the
//! registered handlers and dropped.

use serde::{Deserialize, Serialize};

use crate::error::FenError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Color {
    White,
    Black,
}

impl Color {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::White => "white",
            Self::Black => "black",
        }
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How the user relates to the game a board belongs to (style 12 field 19).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameRelation {
    IsolatedPosition,
    ObservingExamined,
    PlayingOpponentsMove,
    Observing,
    PlayingMyMove,
    Examining,
}

impl GameRelation {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            -3 => Some(Self::IsolatedPosition),
            -2 => Some(Self::ObservingExamined),
            -1 => Some(Self::PlayingOpponentsMove),
            0 => Some(Self::Observing),
            1 => Some(Self::PlayingMyMove),
            2 => Some(Self::Examining),
            _ => None,
        }
    }

    pub fn is_playing(self) -> bool {
        matches!(self, Self::PlayingMyMove | Self::PlayingOpponentsMove)
    }
}

/// A full position with clocks, sent as a `<12>` line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardSnapshot {
    /// Rank 8 first, file a first. `-` marks an empty square.
    pub ranks: [String; 8],
    pub side_to_move: Color,
    /// File (0 = a) of a pawn that just moved two squares.
    pub double_pawn_push_file: Option<u8>,
    pub white_can_castle_short: bool,
    pub white_can_castle_long: bool,
    pub black_can_castle_short: bool,
    pub black_can_castle_long: bool,
    pub irreversible_plies: u32,
    pub game_number: u32,
    pub white_name: String,
    pub black_name: String,
    pub relation: GameRelation,
    pub initial_time_minutes: u32,
    pub increment_seconds: u32,
    pub white_material: u32,
    pub black_material: u32,
    /// Milliseconds when the `ms` ivar is on, seconds otherwise. May be negative.
    pub white_clock: i64,
    pub black_clock: i64,
    pub next_move_number: u32,
    pub previous_move_verbose: Option<String>,
    pub previous_move_time: Option<String>,
    pub previous_move_san: Option<String>,
    pub flipped: bool,
    pub clock_running: Option<bool>,
    pub lag_ms: Option<u32>,
}

impl BoardSnapshot {
    /// The piece letter on a square, `file` and `rank` counted from 0 (a1 = 0, 0).
    pub fn piece_at(&self, file: u8, rank: u8) -> Option<char> {
        if file > 7 || rank > 7 {
            return None;
        }
        let row = &self.ranks[7 - rank as usize];
        row.chars().nth(file as usize).filter(|c| *c != '-')
    }

    pub fn to_fen(&self) -> String {
        let mut placement = String::with_capacity(72);
        for (i, row) in self.ranks.iter().enumerate() {
            if i > 0 {
                placement.push('/');
            }
            let mut empty = 0;
            for c in row.chars() {
                if c == '-' {
                    empty += 1;
                    continue;
                }
                if empty > 0 {
                    placement.push_str(&empty.to_string());
                    empty = 0;
                }
                placement.push(c);
            }
            if empty > 0 {
                placement.push_str(&empty.to_string());
            }
        }

        let side = match self.side_to_move {
            Color::White => 'w',
            Color::Black => 'b',
        };

        let mut castling = String::new();
        if self.white_can_castle_short {
            castling.push('K');
        }
        if self.white_can_castle_long {
            castling.push('Q');
        }
        if self.black_can_castle_short {
            castling.push('k');
        }
        if self.black_can_castle_long {
            castling.push('q');
        }
        if castling.is_empty() {
            castling.push('-');
        }

        let en_passant = match self.double_pawn_push_file {
            Some(file) => {
                let rank = match self.side_to_move {
                    Color::White => '6',
                    Color::Black => '3',
                };
                format!("{}{}", (b'a' + file) as char, rank)
            }
            None => "-".to_string(),
        };

        format!(
            "{} {} {} {} {} {}",
            placement,
            side,
            castling,
            en_passant,
            self.irreversible_plies,
            self.next_move_number.max(1)
        )
    }

    /// Load the position into a `cozy_chess::Board`. Fails for positions
    /// cozy-chess rejects, e.g. boards half-built in setup mode.
    pub fn to_board(&self) -> Result<cozy_chess::Board, FenError> {
        let fen = self.to_fen();
        fen.parse::<cozy_chess::Board>()
            .map_err(|_| FenError::InvalidPosition(fen))
    }
}

/// An incremental board update, sent as a `<d1>` line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardDelta {
    pub game_number: u32,
    pub move_number: u32,
    /// Move in the `P/e2-e4` notation.
    pub move_verbose: String,
    pub move_san: String,
    pub taken_time_ms: u32,
    pub remaining_time_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RatingKind {
    #[default]
    Established,
    Provisional,
    Estimated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rating {
    /// 0 means unrated.
    pub value: u32,
    pub kind: RatingKind,
}

/// Facts about a game that is about to start, sent as a `<g1>` line.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GameInfo {
    pub game_number: u32,
    pub private: bool,
    pub category: String,
    pub rated: bool,
    pub white_registered: bool,
    pub black_registered: bool,
    pub white_initial_minutes: u32,
    pub black_initial_minutes: u32,
    pub white_increment_seconds: u32,
    pub black_increment_seconds: u32,
    /// Game number of the partner's board in bughouse.
    pub partner_game: Option<u32>,
    pub white_rating: Rating,
    pub black_rating: Rating,
    pub white_timeseal: bool,
    pub black_timeseal: bool,
}

/// A seek announced by an `<s>` or `<sn>` line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seek {
    pub index: u32,
    pub seeker: String,
    /// Bit set of the seeker's titles as sent by the server.
    pub seeker_titles: u16,
    pub seeker_rating: Rating,
    pub time_minutes: u32,
    pub increment_seconds: u32,
    pub rated: bool,
    pub match_type: String,
    pub color: Option<Color>,
    pub min_rating: u32,
    pub max_rating: u32,
    pub automatic: bool,
    pub formula_checked: bool,
}

impl Seek {
    pub const UNREGISTERED: u16 = 0x01;
    pub const COMPUTER: u16 = 0x02;

    pub fn is_computer(&self) -> bool {
        self.seeker_titles & Self::COMPUTER != 0
    }

    pub fn is_registered(&self) -> bool {
        self.seeker_titles & Self::UNREGISTERED == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameResult {
    WhiteWins,
    BlackWins,
    Draw,
    Unknown,
}

impl GameResult {
    pub fn from_token(token: &str) -> Self {
        match token.trim().trim_end_matches('.') {
            "1-0" => Self::WhiteWins,
            "0-1" => Self::BlackWins,
            "1/2-1/2" => Self::Draw,
            _ => Self::Unknown,
        }
    }
}

/// Who an offer line is about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OfferSubject {
    User,
    Opponent { name: String },
    /// A player in a game we observe.
    Player { game: u32, name: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OfferKind {
    Draw,
    Abort,
    Adjourn,
    Takeback,
    Match,
    Partner,
    Pause,
    Unpause,
    Other(String),
}

impl OfferKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            "draw" => Self::Draw,
            "abort" => Self::Abort,
            "adjourn" => Self::Adjourn,
            "takeback" => Self::Takeback,
            "match" => Self::Match,
            "partner" => Self::Partner,
            "pause" => Self::Pause,
            "unpause" => Self::Unpause,
            other => Self::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    GameInfo(GameInfo),
    BoardSnapshot(BoardSnapshot),
    BoardDelta(BoardDelta),
    SeekAdded(Seek),
    SeeksRemoved {
        indices: Vec<u32>,
    },
    SeeksCleared,
    GameEnded {
        game_number: u32,
        white: String,
        black: String,
        reason: String,
        /// Everything after the closing brace, verbatim.
        result: String,
        outcome: GameResult,
    },
    StoppedObserving {
        game_number: u32,
    },
    StoppedExamining {
        game_number: u32,
    },
    EnteredBoardSetup,
    ExitedBoardSetup,
    IllegalMoveAttempt {
        /// `None` when the server only said it is not our move.
        attempted: Option<String>,
        reason: String,
    },
    ChannelTell {
        username: String,
        titles: Option<String>,
        channel: u32,
        message: String,
    },
    Kibitz {
        username: String,
        titles: Option<String>,
        rating: Option<u32>,
        game_number: u32,
        message: String,
    },
    Whisper {
        username: String,
        titles: Option<String>,
        rating: Option<u32>,
        game_number: u32,
        message: String,
    },
    PartnerTell {
        username: String,
        titles: Option<String>,
        message: String,
    },
    PersonalTell {
        username: String,
        titles: Option<String>,
        message: String,
    },
    SayTell {
        username: String,
        titles: Option<String>,
        game_number: Option<u32>,
        message: String,
    },
    TShout {
        username: String,
        titles: Option<String>,
        message: String,
    },
    CShout {
        username: String,
        titles: Option<String>,
        message: String,
    },
    Shout {
        username: String,
        titles: Option<String>,
        message: String,
    },
    IShout {
        username: String,
        titles: Option<String>,
        message: String,
    },
    Announcement {
        username: String,
        message: String,
    },
    QTell {
        message: String,
    },
    LoginSucceeded {
        username: String,
        titles: Option<String>,
    },
    LoginFailed {
        reason: String,
    },
    OfferMade {
        subject: OfferSubject,
        kind: OfferKind,
        index: Option<u32>,
        params: Option<String>,
    },
    OfferRemoved {
        index: u32,
    },
    OfferDeclined {
        subject: OfferSubject,
        kind: OfferKind,
    },
    OfferWithdrawn {
        subject: OfferSubject,
        kind: OfferKind,
    },
    TakebackUpdated {
        subject: OfferSubject,
        plies: u32,
        index: Option<u32>,
    },
    TakebackCountered {
        subject: OfferSubject,
        plies: u32,
    },
}

/// Discriminant of [`Event`], used to key handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    GameInfo,
    BoardSnapshot,
    BoardDelta,
    SeekAdded,
    SeeksRemoved,
    SeeksCleared,
    GameEnded,
    StoppedObserving,
    StoppedExamining,
    EnteredBoardSetup,
    ExitedBoardSetup,
    IllegalMoveAttempt,
    ChannelTell,
    Kibitz,
    Whisper,
    PartnerTell,
    PersonalTell,
    SayTell,
    TShout,
    CShout,
    Shout,
    IShout,
    Announcement,
    QTell,
    LoginSucceeded,
    LoginFailed,
    OfferMade,
    OfferRemoved,
    OfferDeclined,
    OfferWithdrawn,
    TakebackUpdated,
    TakebackCountered,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::GameInfo(_) => EventKind::GameInfo,
            Self::BoardSnapshot(_) => EventKind::BoardSnapshot,
            Self::BoardDelta(_) => EventKind::BoardDelta,
            Self::SeekAdded(_) => EventKind::SeekAdded,
            Self::SeeksRemoved { .. } => EventKind::SeeksRemoved,
            Self::SeeksCleared => EventKind::SeeksCleared,
            Self::GameEnded { .. } => EventKind::GameEnded,
            Self::StoppedObserving { .. } => EventKind::StoppedObserving,
            Self::StoppedExamining { .. } => EventKind::StoppedExamining,
            Self::EnteredBoardSetup => EventKind::EnteredBoardSetup,
            Self::ExitedBoardSetup => EventKind::ExitedBoardSetup,
            Self::IllegalMoveAttempt { .. } => EventKind::IllegalMoveAttempt,
            Self::ChannelTell { .. } => EventKind::ChannelTell,
            Self::Kibitz { .. } => EventKind::Kibitz,
            Self::Whisper { .. } => EventKind::Whisper,
            Self::PartnerTell { .. } => EventKind::PartnerTell,
            Self::PersonalTell { .. } => EventKind::PersonalTell,
            Self::SayTell { .. } => EventKind::SayTell,
            Self::TShout { .. } => EventKind::TShout,
            Self::CShout { .. } => EventKind::CShout,
            Self::Shout { .. } => EventKind::Shout,
            Self::IShout { .. } => EventKind::IShout,
            Self::Announcement { .. } => EventKind::Announcement,
            Self::QTell { .. } => EventKind::QTell,
            Self::LoginSucceeded { .. } => EventKind::LoginSucceeded,
            Self::LoginFailed { .. } => EventKind::LoginFailed,
            Self::OfferMade { .. } => EventKind::OfferMade,
            Self::OfferRemoved { .. } => EventKind::OfferRemoved,
            Self::OfferDeclined { .. } => EventKind::OfferDeclined,
            Self::OfferWithdrawn { .. } => EventKind::OfferWithdrawn,
            Self::TakebackUpdated { .. } => EventKind::TakebackUpdated,
            Self::TakebackCountered { .. } => EventKind::TakebackCountered,
        }
    }
}
