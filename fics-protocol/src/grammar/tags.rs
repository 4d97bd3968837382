//! Parsers for the machine-readable lines that start with a `<tag>` sigil.

use std::str::FromStr;

use super::ParseResult;
use crate::error::GrammarError;
use crate::events::{
    BoardDelta, BoardSnapshot, Color, Event, GameInfo, GameRelation, Rating, RatingKind, Seek,
};

/// Fields following `<12>`, not counting the optional clock flag and lag.
const STYLE12_FIELDS: usize = 30;
const DELTA_FIELDS: usize = 6;

pub(super) fn game_info(line: &str) -> Option<ParseResult> {
    line.strip_prefix("<g1> ")
        .map(|body| parse_game_info(body).map(Event::GameInfo))
}

pub(super) fn board_snapshot(line: &str) -> Option<ParseResult> {
    line.strip_prefix("<12> ")
        .map(|body| parse_style12(body).map(Event::BoardSnapshot))
}

pub(super) fn board_delta(line: &str) -> Option<ParseResult> {
    line.strip_prefix("<d1> ")
        .map(|body| parse_delta(body).map(Event::BoardDelta))
}

pub(super) fn seeks_cleared(line: &str) -> Option<ParseResult> {
    (line.trim_end() == "<sc>").then_some(Ok(Event::SeeksCleared))
}

pub(super) fn seek_added(line: &str) -> Option<ParseResult> {
    line.strip_prefix("<s> ")
        .or_else(|| line.strip_prefix("<sn> "))
        .map(|body| parse_seek(body).map(Event::SeekAdded))
}

pub(super) fn seeks_removed(line: &str) -> Option<ParseResult> {
    let rest = line.strip_prefix("<sr>")?;
    if !rest.is_empty() && !rest.starts_with(' ') {
        return None;
    }
    let indices = rest
        .split_whitespace()
        .map(|token| number(token, "seek index"))
        .collect::<Result<Vec<u32>, _>>();
    Some(indices.map(|indices| Event::SeeksRemoved { indices }))
}

fn number<T: FromStr>(token: &str, field: &'static str) -> Result<T, GrammarError> {
    token.parse().map_err(|_| GrammarError::bad(field, token))
}

fn flag(token: &str, field: &'static str) -> Result<bool, GrammarError> {
    match token {
        "1" | "t" => Ok(true),
        "0" | "f" => Ok(false),
        _ => Err(GrammarError::bad(field, token)),
    }
}

fn pair<'a>(token: &'a str, field: &'static str) -> Result<(&'a str, &'a str), GrammarError> {
    token
        .split_once(',')
        .ok_or_else(|| GrammarError::bad(field, token))
}

fn none_if_none(token: &str) -> Option<String> {
    (token != "none").then(|| token.to_string())
}

/// `1586`, `1586E` (estimated), `0P` (provisional).
fn parse_rating(token: &str) -> Result<Rating, GrammarError> {
    let digits_end = token
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(token.len());
    let (digits, suffix) = token.split_at(digits_end);
    if digits.is_empty() {
        return Err(GrammarError::bad("rating", token));
    }
    let kind = match suffix {
        "" => RatingKind::Established,
        "E" => RatingKind::Estimated,
        "P" => RatingKind::Provisional,
        _ => return Err(GrammarError::bad("rating", token)),
    };
    Ok(Rating {
        value: number(digits, "rating")?,
        kind,
    })
}

fn parse_color(token: &str) -> Result<Color, GrammarError> {
    match token {
        "W" => Ok(Color::White),
        "B" => Ok(Color::Black),
        _ => Err(GrammarError::bad("side to move", token)),
    }
}

fn parse_rank(token: &str) -> Result<String, GrammarError> {
    let valid = token.len() == 8 && token.chars().all(|c| "-pnbrqkPNBRQK".contains(c));
    if !valid {
        return Err(GrammarError::bad("board rank", token));
    }
    Ok(token.to_string())
}

fn parse_style12(body: &str) -> Result<BoardSnapshot, GrammarError> {
    let f: Vec<&str> = body.split_whitespace().collect();
    if f.len() < STYLE12_FIELDS {
        return Err(GrammarError::MissingFields {
            tag: "<12>",
            expected: STYLE12_FIELDS,
            found: f.len(),
        });
    }

    let ranks = [
        parse_rank(f[0])?,
        parse_rank(f[1])?,
        parse_rank(f[2])?,
        parse_rank(f[3])?,
        parse_rank(f[4])?,
        parse_rank(f[5])?,
        parse_rank(f[6])?,
        parse_rank(f[7])?,
    ];

    let double_pawn_push_file = match number::<i8>(f[9], "double pawn push")? {
        -1 => None,
        file @ 0..=7 => Some(file as u8),
        _ => return Err(GrammarError::bad("double pawn push", f[9])),
    };

    let relation_code: i32 = number(f[18], "relation")?;
    let relation = GameRelation::from_code(relation_code)
        .ok_or_else(|| GrammarError::bad("relation", f[18]))?;

    let clock_running = match f.get(30) {
        Some(token) => Some(flag(token, "clock running")?),
        None => None,
    };
    let lag_ms = match f.get(31) {
        Some(token) => Some(number(token, "lag")?),
        None => None,
    };

    Ok(BoardSnapshot {
        ranks,
        side_to_move: parse_color(f[8])?,
        double_pawn_push_file,
        white_can_castle_short: flag(f[10], "castling")?,
        white_can_castle_long: flag(f[11], "castling")?,
        black_can_castle_short: flag(f[12], "castling")?,
        black_can_castle_long: flag(f[13], "castling")?,
        irreversible_plies: number(f[14], "irreversible plies")?,
        game_number: number(f[15], "game number")?,
        white_name: f[16].to_string(),
        black_name: f[17].to_string(),
        relation,
        initial_time_minutes: number(f[19], "initial time")?,
        increment_seconds: number(f[20], "increment")?,
        white_material: number(f[21], "white material")?,
        black_material: number(f[22], "black material")?,
        white_clock: number(f[23], "white clock")?,
        black_clock: number(f[24], "black clock")?,
        next_move_number: number(f[25], "move number")?,
        previous_move_verbose: none_if_none(f[26]),
        previous_move_time: Some(f[27].to_string()),
        previous_move_san: none_if_none(f[28]),
        flipped: flag(f[29], "flip")?,
        clock_running,
        lag_ms,
    })
}

fn parse_delta(body: &str) -> Result<BoardDelta, GrammarError> {
    let f: Vec<&str> = body.split_whitespace().collect();
    if f.len() < DELTA_FIELDS {
        return Err(GrammarError::MissingFields {
            tag: "<d1>",
            expected: DELTA_FIELDS,
            found: f.len(),
        });
    }

    Ok(BoardDelta {
        game_number: number(f[0], "game number")?,
        move_number: number(f[1], "move number")?,
        move_verbose: f[2].to_string(),
        move_san: f[3].to_string(),
        taken_time_ms: number(f[4], "taken time")?,
        remaining_time_ms: number(f[5], "remaining time")?,
    })
}

fn parse_game_info(body: &str) -> Result<GameInfo, GrammarError> {
    let mut tokens = body.split_whitespace();
    let game_number = match tokens.next() {
        Some(token) => number(token, "game number")?,
        None => {
            return Err(GrammarError::MissingFields {
                tag: "<g1>",
                expected: 1,
                found: 0,
            })
        }
    };

    let mut info = GameInfo {
        game_number,
        ..Default::default()
    };

    for token in tokens {
        let Some((key, value)) = token.split_once('=') else {
            continue;
        };
        match key {
            "p" => info.private = flag(value, "private")?,
            "t" => info.category = value.to_string(),
            "r" => info.rated = flag(value, "rated")?,
            "u" => {
                let (white, black) = pair(value, "registered")?;
                info.white_registered = flag(white, "registered")?;
                info.black_registered = flag(black, "registered")?;
            }
            "it" => {
                let (white, black) = pair(value, "initial time")?;
                info.white_initial_minutes = number(white, "initial time")?;
                info.black_initial_minutes = number(black, "initial time")?;
            }
            "i" => {
                let (white, black) = pair(value, "increment")?;
                info.white_increment_seconds = number(white, "increment")?;
                info.black_increment_seconds = number(black, "increment")?;
            }
            "pt" => {
                let partner: u32 = number(value, "partner game")?;
                info.partner_game = (partner != 0).then_some(partner);
            }
            "rt" => {
                let (white, black) = pair(value, "rating")?;
                info.white_rating = parse_rating(white)?;
                info.black_rating = parse_rating(black)?;
            }
            "ts" => {
                let (white, black) = pair(value, "timeseal")?;
                info.white_timeseal = flag(white, "timeseal")?;
                info.black_timeseal = flag(black, "timeseal")?;
            }
            _ => {}
        }
    }

    Ok(info)
}

fn parse_seek(body: &str) -> Result<Seek, GrammarError> {
    let mut tokens = body.split_whitespace();
    let index = match tokens.next() {
        Some(token) => number(token, "seek index")?,
        None => {
            return Err(GrammarError::MissingFields {
                tag: "<s>",
                expected: 2,
                found: 0,
            })
        }
    };

    let mut seeker = None;
    let mut seek = Seek {
        index,
        seeker: String::new(),
        seeker_titles: 0,
        seeker_rating: Rating::default(),
        time_minutes: 0,
        increment_seconds: 0,
        rated: false,
        match_type: String::new(),
        color: None,
        min_rating: 0,
        max_rating: 9999,
        automatic: true,
        formula_checked: false,
    };

    for token in tokens {
        let Some((key, value)) = token.split_once('=') else {
            continue;
        };
        match key {
            "w" => seeker = Some(value.to_string()),
            "ti" => {
                seek.seeker_titles = u16::from_str_radix(value, 16)
                    .map_err(|_| GrammarError::bad("seeker titles", value))?
            }
            "rt" => seek.seeker_rating = parse_rating(value)?,
            "t" => seek.time_minutes = number(value, "seek time")?,
            "i" => seek.increment_seconds = number(value, "seek increment")?,
            "r" => {
                seek.rated = match value {
                    "r" => true,
                    "u" => false,
                    _ => return Err(GrammarError::bad("seek rated", value)),
                }
            }
            "tp" => seek.match_type = value.to_string(),
            "c" => {
                seek.color = match value {
                    "W" => Some(Color::White),
                    "B" => Some(Color::Black),
                    "?" => None,
                    _ => return Err(GrammarError::bad("seek color", value)),
                }
            }
            "rr" => {
                let (min, max) = value
                    .split_once('-')
                    .ok_or_else(|| GrammarError::bad("rating range", value))?;
                seek.min_rating = number(min, "rating range")?;
                seek.max_rating = number(max, "rating range")?;
            }
            "a" => seek.automatic = flag(value, "automatic")?,
            "f" => seek.formula_checked = flag(value, "formula")?,
            _ => {}
        }
    }

    seek.seeker = seeker.ok_or_else(|| GrammarError::MissingFields {
        tag: "<s>",
        expected: 2,
        found: 1,
    })?;
    Ok(seek)
}
