//! Recognizers for the human-readable lines: game lifecycle, chat, login and
//! offers.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::ParseResult;
use crate::error::GrammarError;
use crate::events::{Event, GameResult, OfferKind, OfferSubject};

macro_rules! user {
    () => {
        "[A-Za-z]{3,17}"
    };
}

macro_rules! titles {
    () => {
        r"\([A-Z*()]*\)"
    };
}

macro_rules! pattern {
    ($name:ident, $($part:tt)+) => {
        static $name: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(concat!($($part)+)).expect("valid pattern"));
    };
}

pattern!(GAME_ENDED, r"^\{Game (\d+) \((", user!(), r") vs\. (", user!(), r")\) ([^}]+)\} (.*)$");
pattern!(STOPPED_OBSERVING, r"^Removing game (\d+) from observation list\.$");
pattern!(STOPPED_EXAMINING, r"^You are no longer examining game (\d+)\.$");
pattern!(ILLEGAL_MOVE, r"^Illegal move \((.*)\)\.(.*)$");
pattern!(CHANNEL_TELL, "^(", user!(), ")(", titles!(), r")?\((\d+)\): (.*)$");
pattern!(KIBITZ, "^(", user!(), ")(", titles!(), r")?\( *([\-0-9]+)\)\[(\d+)\] kibitzes: (.*)$");
pattern!(WHISPER, "^(", user!(), ")(", titles!(), r")?\( *([\-0-9]+)\)\[(\d+)\] whispers: (.*)$");
pattern!(PARTNER_TELL, "^(", user!(), ")(", titles!(), r")? \(your partner\) tells you: (.*)$");
pattern!(PERSONAL_TELL, "^(", user!(), ")(", titles!(), ")? tells you: (.*)$");
pattern!(SAY_TELL, "^(", user!(), ")(", titles!(), r")?(?:\[(\d+)\])? says: (.*)$");
pattern!(T_SHOUT, "^:(", user!(), ")(", titles!(), ")? t-shouts: (.*)$");
pattern!(C_SHOUT, "^(", user!(), ")(", titles!(), ")? c-shouts: (.*)$");
pattern!(SHOUT, "^(", user!(), ")(", titles!(), ")? shouts: (.*)$");
pattern!(I_SHOUT, "^--> (", user!(), ")(", titles!(), ")? ?(.*)$");
pattern!(ANNOUNCEMENT, r"^    \*\*ANNOUNCEMENT\*\* from (", user!(), "): (.*)$");
pattern!(Q_TELL, "^:(.*)$");
pattern!(LOGIN_SUCCEEDED, r"^\*\*\*\* Starting FICS session as (", user!(), ")(", titles!(), r")? \*\*\*\*");
pattern!(OFFER_FROM, r"^<pf> (\d+) w=(", user!(), r") t=(\S+) p=(.*)$");
pattern!(OFFER_TO, r"^<pt> (\d+) w=(", user!(), r") t=(\S+) p=(.*)$");
pattern!(OFFER_REMOVED, r"^<pr> (\d+)$");
pattern!(TAKEBACK_REQUESTED, r"^Game (\d+): (", user!(), r") requests to take back (\d+) half move\(s\)\.$");
pattern!(TAKEBACK_COUNTERED, r"^Game (\d+): (", user!(), r") proposes a different number \((\d+)\) of half-move\(s\) to take back\.$");
pattern!(PLAYER_OFFERED, r"^Game (\d+): (", user!(), r") offers an? (\w+)\.$");
pattern!(PLAYER_DECLINED, r"^Game (\d+): (", user!(), r") declines the (\w+) request\.$");
pattern!(PLAYER_WITHDREW, r"^Game (\d+): (", user!(), r") withdraws the (\w+) request\.$");
pattern!(OPPONENT_DECLINED, "^(", user!(), r") declines the (\w+) request\.$");
pattern!(OPPONENT_WITHDREW, "^(", user!(), r") withdraws the (\w+) request\.$");
pattern!(USER_DECLINED, r"^You decline the (\w+) request(?: from ", user!(), r")?\.$");
pattern!(USER_WITHDREW, r"^You withdraw the (\w+) request(?: to ", user!(), r")?\.$");

const NOT_YOUR_MOVE: &str = "It is not your move.";
const ENTERED_SETUP: &str = "Entering setup mode.";
const SETUP_VALIDATED: &str = "Game is validated - entering examine mode.";
const EXITED_SETUP: &str = "Exiting setup mode.";
const INVALID_PASSWORD: &str = "**** Invalid password! ****";

fn text(caps: &Captures, i: usize) -> String {
    caps.get(i).map_or_else(String::new, |m| m.as_str().to_string())
}

fn optional(caps: &Captures, i: usize) -> Option<String> {
    caps.get(i).map(|m| m.as_str().to_string())
}

fn parsed<T: FromStr>(caps: &Captures, i: usize, field: &'static str) -> Result<T, GrammarError> {
    let value = caps.get(i).map_or("", |m| m.as_str());
    value.parse().map_err(|_| GrammarError::bad(field, value))
}

/// Kibitz and whisper ratings: digits, or dashes for unrated players.
fn chat_rating(caps: &Captures, i: usize) -> Result<Option<u32>, GrammarError> {
    let value = caps.get(i).map_or("", |m| m.as_str().trim());
    if !value.is_empty() && value.chars().all(|c| c == '-') {
        return Ok(None);
    }
    value
        .parse()
        .map(Some)
        .map_err(|_| GrammarError::bad("rating", value))
}

fn player(caps: &Captures) -> Result<OfferSubject, GrammarError> {
    Ok(OfferSubject::Player {
        game: parsed(caps, 1, "game number")?,
        name: text(caps, 2),
    })
}

pub(super) fn game_ended(line: &str) -> Option<ParseResult> {
    let caps = GAME_ENDED.captures(line)?;
    let result = text(&caps, 5);
    Some(parsed(&caps, 1, "game number").map(|game_number| Event::GameEnded {
        game_number,
        white: text(&caps, 2),
        black: text(&caps, 3),
        reason: text(&caps, 4),
        outcome: GameResult::from_token(&result),
        result,
    }))
}

pub(super) fn stopped_observing(line: &str) -> Option<ParseResult> {
    let caps = STOPPED_OBSERVING.captures(line)?;
    Some(parsed(&caps, 1, "game number").map(|game_number| Event::StoppedObserving { game_number }))
}

pub(super) fn stopped_examining(line: &str) -> Option<ParseResult> {
    let caps = STOPPED_EXAMINING.captures(line)?;
    Some(parsed(&caps, 1, "game number").map(|game_number| Event::StoppedExamining { game_number }))
}

pub(super) fn entered_setup(line: &str) -> Option<ParseResult> {
    (line == ENTERED_SETUP).then_some(Ok(Event::EnteredBoardSetup))
}

pub(super) fn exited_setup(line: &str) -> Option<ParseResult> {
    (line == SETUP_VALIDATED || line == EXITED_SETUP).then_some(Ok(Event::ExitedBoardSetup))
}

pub(super) fn illegal_move(line: &str) -> Option<ParseResult> {
    if line == NOT_YOUR_MOVE {
        return Some(Ok(Event::IllegalMoveAttempt {
            attempted: None,
            reason: NOT_YOUR_MOVE.to_string(),
        }));
    }
    let caps = ILLEGAL_MOVE.captures(line)?;
    let reason = caps.get(2).map_or("", |m| m.as_str().trim());
    Some(Ok(Event::IllegalMoveAttempt {
        attempted: optional(&caps, 1),
        reason: if reason.is_empty() {
            "Illegal move".to_string()
        } else {
            reason.to_string()
        },
    }))
}

pub(super) fn channel_tell(line: &str) -> Option<ParseResult> {
    let caps = CHANNEL_TELL.captures(line)?;
    Some(parsed(&caps, 3, "channel").map(|channel| Event::ChannelTell {
        username: text(&caps, 1),
        titles: optional(&caps, 2),
        channel,
        message: text(&caps, 4),
    }))
}

pub(super) fn kibitz(line: &str) -> Option<ParseResult> {
    let caps = KIBITZ.captures(line)?;
    Some((|| -> ParseResult {
        Ok(Event::Kibitz {
            username: text(&caps, 1),
            titles: optional(&caps, 2),
            rating: chat_rating(&caps, 3)?,
            game_number: parsed(&caps, 4, "game number")?,
            message: text(&caps, 5),
        })
    })())
}

pub(super) fn whisper(line: &str) -> Option<ParseResult> {
    let caps = WHISPER.captures(line)?;
    Some((|| -> ParseResult {
        Ok(Event::Whisper {
            username: text(&caps, 1),
            titles: optional(&caps, 2),
            rating: chat_rating(&caps, 3)?,
            game_number: parsed(&caps, 4, "game number")?,
            message: text(&caps, 5),
        })
    })())
}

pub(super) fn partner_tell(line: &str) -> Option<ParseResult> {
    let caps = PARTNER_TELL.captures(line)?;
    Some(Ok(Event::PartnerTell {
        username: text(&caps, 1),
        titles: optional(&caps, 2),
        message: text(&caps, 3),
    }))
}

pub(super) fn personal_tell(line: &str) -> Option<ParseResult> {
    let caps = PERSONAL_TELL.captures(line)?;
    Some(Ok(Event::PersonalTell {
        username: text(&caps, 1),
        titles: optional(&caps, 2),
        message: text(&caps, 3),
    }))
}

pub(super) fn say_tell(line: &str) -> Option<ParseResult> {
    let caps = SAY_TELL.captures(line)?;
    let game_number = match caps.get(3) {
        Some(_) => match parsed(&caps, 3, "game number") {
            Ok(game) => Some(game),
            Err(e) => return Some(Err(e)),
        },
        None => None,
    };
    Some(Ok(Event::SayTell {
        username: text(&caps, 1),
        titles: optional(&caps, 2),
        game_number,
        message: text(&caps, 4),
    }))
}

pub(super) fn t_shout(line: &str) -> Option<ParseResult> {
    let caps = T_SHOUT.captures(line)?;
    Some(Ok(Event::TShout {
        username: text(&caps, 1),
        titles: optional(&caps, 2),
        message: text(&caps, 3),
    }))
}

pub(super) fn c_shout(line: &str) -> Option<ParseResult> {
    let caps = C_SHOUT.captures(line)?;
    Some(Ok(Event::CShout {
        username: text(&caps, 1),
        titles: optional(&caps, 2),
        message: text(&caps, 3),
    }))
}

pub(super) fn shout(line: &str) -> Option<ParseResult> {
    let caps = SHOUT.captures(line)?;
    Some(Ok(Event::Shout {
        username: text(&caps, 1),
        titles: optional(&caps, 2),
        message: text(&caps, 3),
    }))
}

pub(super) fn i_shout(line: &str) -> Option<ParseResult> {
    let caps = I_SHOUT.captures(line)?;
    Some(Ok(Event::IShout {
        username: text(&caps, 1),
        titles: optional(&caps, 2),
        message: text(&caps, 3),
    }))
}

pub(super) fn announcement(line: &str) -> Option<ParseResult> {
    let caps = ANNOUNCEMENT.captures(line)?;
    Some(Ok(Event::Announcement {
        username: text(&caps, 1),
        message: text(&caps, 2),
    }))
}

pub(super) fn q_tell(line: &str) -> Option<ParseResult> {
    let caps = Q_TELL.captures(line)?;
    Some(Ok(Event::QTell {
        message: text(&caps, 1),
    }))
}

pub(super) fn login_succeeded(line: &str) -> Option<ParseResult> {
    let caps = LOGIN_SUCCEEDED.captures(line)?;
    Some(Ok(Event::LoginSucceeded {
        username: text(&caps, 1),
        titles: optional(&caps, 2),
    }))
}

pub(super) fn login_failed(line: &str) -> Option<ParseResult> {
    line.starts_with(INVALID_PASSWORD).then(|| {
        Ok(Event::LoginFailed {
            reason: "Invalid password".to_string(),
        })
    })
}

/// `<pf>`: someone offers us something. A takeback carries its ply count as
/// the parameter.
pub(super) fn offer_from(line: &str) -> Option<ParseResult> {
    let caps = OFFER_FROM.captures(line)?;
    Some((|| -> ParseResult {
        let index = parsed(&caps, 1, "offer index")?;
        let subject = OfferSubject::Opponent {
            name: text(&caps, 2),
        };
        pending_offer(&caps, subject, index)
    })())
}

/// `<pt>`: an offer we made.
pub(super) fn offer_to(line: &str) -> Option<ParseResult> {
    let caps = OFFER_TO.captures(line)?;
    Some((|| -> ParseResult {
        let index = parsed(&caps, 1, "offer index")?;
        pending_offer(&caps, OfferSubject::User, index)
    })())
}

fn pending_offer(caps: &Captures, subject: OfferSubject, index: u32) -> ParseResult {
    let kind = OfferKind::from_name(caps.get(3).map_or("", |m| m.as_str()));
    let params = caps.get(4).map_or("", |m| m.as_str().trim());

    if kind == OfferKind::Takeback {
        return Ok(Event::TakebackUpdated {
            subject,
            plies: params
                .parse()
                .map_err(|_| GrammarError::bad("takeback plies", params))?,
            index: Some(index),
        });
    }

    Ok(Event::OfferMade {
        subject,
        kind,
        index: Some(index),
        params: (!params.is_empty() && params != "#").then(|| params.to_string()),
    })
}

pub(super) fn offer_removed(line: &str) -> Option<ParseResult> {
    let caps = OFFER_REMOVED.captures(line)?;
    Some(parsed(&caps, 1, "offer index").map(|index| Event::OfferRemoved { index }))
}

pub(super) fn takeback_requested(line: &str) -> Option<ParseResult> {
    let caps = TAKEBACK_REQUESTED.captures(line)?;
    Some((|| -> ParseResult {
        Ok(Event::TakebackUpdated {
            subject: player(&caps)?,
            plies: parsed(&caps, 3, "takeback plies")?,
            index: None,
        })
    })())
}

pub(super) fn takeback_countered(line: &str) -> Option<ParseResult> {
    let caps = TAKEBACK_COUNTERED.captures(line)?;
    Some((|| -> ParseResult {
        Ok(Event::TakebackCountered {
            subject: player(&caps)?,
            plies: parsed(&caps, 3, "takeback plies")?,
        })
    })())
}

pub(super) fn player_offered(line: &str) -> Option<ParseResult> {
    let caps = PLAYER_OFFERED.captures(line)?;
    Some(player(&caps).map(|subject| Event::OfferMade {
        subject,
        kind: OfferKind::from_name(&text(&caps, 3)),
        index: None,
        params: None,
    }))
}

pub(super) fn player_declined(line: &str) -> Option<ParseResult> {
    let caps = PLAYER_DECLINED.captures(line)?;
    Some(player(&caps).map(|subject| Event::OfferDeclined {
        subject,
        kind: OfferKind::from_name(&text(&caps, 3)),
    }))
}

pub(super) fn player_withdrew(line: &str) -> Option<ParseResult> {
    let caps = PLAYER_WITHDREW.captures(line)?;
    Some(player(&caps).map(|subject| Event::OfferWithdrawn {
        subject,
        kind: OfferKind::from_name(&text(&caps, 3)),
    }))
}

pub(super) fn opponent_declined(line: &str) -> Option<ParseResult> {
    let caps = OPPONENT_DECLINED.captures(line)?;
    Some(Ok(Event::OfferDeclined {
        subject: OfferSubject::Opponent { name: text(&caps, 1) },
        kind: OfferKind::from_name(&text(&caps, 2)),
    }))
}

pub(super) fn opponent_withdrew(line: &str) -> Option<ParseResult> {
    let caps = OPPONENT_WITHDREW.captures(line)?;
    Some(Ok(Event::OfferWithdrawn {
        subject: OfferSubject::Opponent { name: text(&caps, 1) },
        kind: OfferKind::from_name(&text(&caps, 2)),
    }))
}

pub(super) fn user_declined(line: &str) -> Option<ParseResult> {
    let caps = USER_DECLINED.captures(line)?;
    Some(Ok(Event::OfferDeclined {
        subject: OfferSubject::User,
        kind: OfferKind::from_name(&text(&caps, 1)),
    }))
}

pub(super) fn user_withdrew(line: &str) -> Option<ParseResult> {
    let caps = USER_WITHDREW.captures(line)?;
    Some(Ok(Event::OfferWithdrawn {
        subject: OfferSubject::User,
        kind: OfferKind::from_name(&text(&caps, 1)),
    }))
}
