//! One-line human-readable rendering of events.

use fics_protocol::events::{Color, OfferKind, OfferSubject, Rating, RatingKind};
use fics_protocol::Event;

fn who(username: &str, titles: &Option<String>) -> String {
    format!("{}{}", username, titles.as_deref().unwrap_or(""))
}

fn rating(rating: &Rating) -> String {
    match rating.kind {
        RatingKind::Established => rating.value.to_string(),
        RatingKind::Provisional => format!("{}P", rating.value),
        RatingKind::Estimated => format!("{}E", rating.value),
    }
}

fn offer_kind(kind: &OfferKind) -> String {
    match kind {
        OfferKind::Other(name) => name.clone(),
        other => format!("{:?}", other).to_lowercase(),
    }
}

/// `verb` conjugated for `subject`: "you decline" but "Newton declines".
fn acts(s: &OfferSubject, verb: &str) -> String {
    match s {
        OfferSubject::User => format!("you {}", verb),
        other => format!("{} {}s", subject(other), verb),
    }
}

fn subject(subject: &OfferSubject) -> String {
    match subject {
        OfferSubject::User => "you".to_string(),
        OfferSubject::Opponent { name } => name.clone(),
        OfferSubject::Player { game, name } => format!("{} (game {})", name, game),
    }
}

pub fn describe(event: &Event) -> String {
    match event {
        Event::GameInfo(info) => format!(
            "[game {}] {} {} {}+{} ({} vs {})",
            info.game_number,
            if info.rated { "rated" } else { "unrated" },
            info.category,
            info.white_initial_minutes,
            info.white_increment_seconds,
            rating(&info.white_rating),
            rating(&info.black_rating),
        ),
        Event::BoardSnapshot(board) => format!(
            "[game {}] {} vs {}, move {} {} to play, last {} | {}",
            board.game_number,
            board.white_name,
            board.black_name,
            board.next_move_number,
            board.side_to_move,
            board.previous_move_san.as_deref().unwrap_or("none"),
            board.to_fen(),
        ),
        Event::BoardDelta(delta) => format!(
            "[game {}] move {}: {} ({} ms, {} ms left)",
            delta.game_number,
            delta.move_number,
            delta.move_san,
            delta.taken_time_ms,
            delta.remaining_time_ms,
        ),
        Event::SeekAdded(seek) => format!(
            "[seek {}] {} ({}) {} {} {}+{}{}",
            seek.index,
            seek.seeker,
            rating(&seek.seeker_rating),
            if seek.rated { "rated" } else { "unrated" },
            seek.match_type,
            seek.time_minutes,
            seek.increment_seconds,
            match seek.color {
                Some(Color::White) => " [white]",
                Some(Color::Black) => " [black]",
                None => "",
            },
        ),
        Event::SeeksRemoved { indices } => format!("[seeks removed] {:?}", indices),
        Event::SeeksCleared => "[seeks cleared]".to_string(),
        Event::GameEnded {
            game_number,
            white,
            black,
            reason,
            result,
            ..
        } => format!(
            "[game {}] {} vs {}: {} {}",
            game_number, white, black, reason, result
        ),
        Event::StoppedObserving { game_number } => {
            format!("[game {}] no longer observing", game_number)
        }
        Event::StoppedExamining { game_number } => {
            format!("[game {}] no longer examining", game_number)
        }
        Event::EnteredBoardSetup => "[setup] entered".to_string(),
        Event::ExitedBoardSetup => "[setup] exited".to_string(),
        Event::IllegalMoveAttempt { attempted, reason } => match attempted {
            Some(mv) => format!("[illegal] {}: {}", mv, reason),
            None => format!("[illegal] {}", reason),
        },
        Event::ChannelTell {
            username,
            titles,
            channel,
            message,
        } => format!("[{}] {}: {}", channel, who(username, titles), message),
        Event::Kibitz {
            username,
            titles,
            game_number,
            message,
            ..
        } => format!(
            "[game {}] {} kibitzes: {}",
            game_number,
            who(username, titles),
            message
        ),
        Event::Whisper {
            username,
            titles,
            game_number,
            message,
            ..
        } => format!(
            "[game {}] {} whispers: {}",
            game_number,
            who(username, titles),
            message
        ),
        Event::PartnerTell {
            username,
            titles,
            message,
        } => format!("[partner] {}: {}", who(username, titles), message),
        Event::PersonalTell {
            username,
            titles,
            message,
        } => format!("[tell] {}: {}", who(username, titles), message),
        Event::SayTell {
            username,
            titles,
            message,
            ..
        } => format!("[say] {}: {}", who(username, titles), message),
        Event::TShout {
            username,
            titles,
            message,
        } => format!("[t-shout] {}: {}", who(username, titles), message),
        Event::CShout {
            username,
            titles,
            message,
        } => format!("[c-shout] {}: {}", who(username, titles), message),
        Event::Shout {
            username,
            titles,
            message,
        } => format!("[shout] {}: {}", who(username, titles), message),
        Event::IShout {
            username,
            titles,
            message,
        } => format!("--> {} {}", who(username, titles), message),
        Event::Announcement { username, message } => {
            format!("[announcement] {}: {}", username, message)
        }
        Event::QTell { message } => format!("[qtell] {}", message),
        Event::LoginSucceeded { username, titles } => {
            format!("[login] {}", who(username, titles))
        }
        Event::LoginFailed { reason } => format!("[login failed] {}", reason),
        Event::OfferMade {
            subject: s,
            kind,
            index,
            params,
        } => {
            let mut line = format!("[offer] {} offers {}", subject(s), offer_kind(kind));
            if let Some(params) = params {
                line.push_str(&format!(" ({})", params));
            }
            if let Some(index) = index {
                line.push_str(&format!(" #{}", index));
            }
            line
        }
        Event::OfferRemoved { index } => format!("[offer] #{} removed", index),
        Event::OfferDeclined { subject: s, kind } => {
            format!("[offer] {} {}", acts(s, "decline"), offer_kind(kind))
        }
        Event::OfferWithdrawn { subject: s, kind } => {
            format!("[offer] {} {}", acts(s, "withdraw"), offer_kind(kind))
        }
        Event::TakebackUpdated {
            subject: s, plies, ..
        } => format!("[takeback] {} asks for {} half-moves", subject(s), plies),
        Event::TakebackCountered { subject: s, plies } => {
            format!("[takeback] {} counters with {} half-moves", subject(s), plies)
        }
    }
}
