//! Ordered line recognizers.
//!
//! A line is offered to each recognizer in table order and the first one
//! that matches decides what the line is. The order goes from the reserved
//! `<tag>` sigils, through game lifecycle text and chat (most constrained
//! shape first), to login and offer phrases.

mod tags;
mod text;

use crate::error::GrammarError;
use crate::events::Event;

/// Outcome of a recognizer that matched: the event, or the field that
/// failed to parse.
pub type ParseResult = Result<Event, GrammarError>;

/// Returns `None` if the line is not of this recognizer's shape.
pub type RecognizeFn = fn(&str) -> Option<ParseResult>;

#[derive(Clone, Copy)]
pub struct Recognizer {
    pub name: &'static str,
    recognize: RecognizeFn,
}

impl Recognizer {
    pub const fn new(name: &'static str, recognize: RecognizeFn) -> Self {
        Self { name, recognize }
    }

    pub fn recognize(&self, line: &str) -> Option<ParseResult> {
        (self.recognize)(line)
    }
}

impl std::fmt::Debug for Recognizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recognizer").field("name", &self.name).finish()
    }
}

/// The standard table.
pub static RECOGNIZERS: &[Recognizer] = &[
    Recognizer::new("game-info", tags::game_info),
    Recognizer::new("board-snapshot", tags::board_snapshot),
    Recognizer::new("board-delta", tags::board_delta),
    Recognizer::new("seeks-cleared", tags::seeks_cleared),
    Recognizer::new("seek-added", tags::seek_added),
    Recognizer::new("seeks-removed", tags::seeks_removed),
    Recognizer::new("game-ended", text::game_ended),
    Recognizer::new("stopped-observing", text::stopped_observing),
    Recognizer::new("stopped-examining", text::stopped_examining),
    Recognizer::new("entered-setup", text::entered_setup),
    Recognizer::new("exited-setup", text::exited_setup),
    Recognizer::new("illegal-move", text::illegal_move),
    Recognizer::new("channel-tell", text::channel_tell),
    Recognizer::new("kibitz", text::kibitz),
    Recognizer::new("whisper", text::whisper),
    Recognizer::new("partner-tell", text::partner_tell),
    Recognizer::new("personal-tell", text::personal_tell),
    Recognizer::new("say-tell", text::say_tell),
    Recognizer::new("t-shout", text::t_shout),
    Recognizer::new("c-shout", text::c_shout),
    Recognizer::new("shout", text::shout),
    Recognizer::new("i-shout", text::i_shout),
    Recognizer::new("announcement", text::announcement),
    Recognizer::new("q-tell", text::q_tell),
    Recognizer::new("login-succeeded", text::login_succeeded),
    Recognizer::new("login-failed", text::login_failed),
    Recognizer::new("offer-from", text::offer_from),
    Recognizer::new("offer-to", text::offer_to),
    Recognizer::new("offer-removed", text::offer_removed),
    Recognizer::new("takeback-requested", text::takeback_requested),
    Recognizer::new("takeback-countered", text::takeback_countered),
    Recognizer::new("player-offered", text::player_offered),
    Recognizer::new("player-declined", text::player_declined),
    Recognizer::new("player-withdrew", text::player_withdrew),
    Recognizer::new("opponent-declined", text::opponent_declined),
    Recognizer::new("opponent-withdrew", text::opponent_withdrew),
    Recognizer::new("user-declined", text::user_declined),
    Recognizer::new("user-withdrew", text::user_withdrew),
];

/// A line matched by a recognizer.
#[derive(Debug)]
pub struct Classified {
    pub recognizer: &'static str,
    pub result: ParseResult,
}

/// An ordered set of recognizers. [`Grammar::default`] is the standard table.
#[derive(Debug, Clone)]
pub struct Grammar {
    recognizers: Vec<Recognizer>,
}

impl Default for Grammar {
    fn default() -> Self {
        Self::new(RECOGNIZERS.to_vec())
    }
}

impl Grammar {
    pub fn new(recognizers: Vec<Recognizer>) -> Self {
        Self { recognizers }
    }

    /// Run the line through the table. `None` means it is plain text.
    pub fn classify(&self, line: &str) -> Option<Classified> {
        self.recognizers.iter().find_map(|r| {
            r.recognize(line).map(|result| Classified {
                recognizer: r.name,
                result,
            })
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.recognizers.iter().map(|r| r.name)
    }
}

/// Classify with the standard table.
pub fn classify(line: &str) -> Option<Classified> {
    RECOGNIZERS.iter().find_map(|r| {
        r.recognize(line).map(|result| Classified {
            recognizer: r.name,
            result,
        })
    })
}
