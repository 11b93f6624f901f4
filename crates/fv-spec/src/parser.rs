//! Grammar implementations for media range specifications.
//!
//! Each grammar is a winnow parser over the whole input. The grammars are
//! tried in a fixed order; the first one that matches syntactically decides
//! the result, and its semantic checks may still reject the input.

use winnow::ascii::digit1;
use winnow::combinator::{alt, opt, preceded, terminated};
use winnow::prelude::*;
use winnow::token::one_of;

use crate::types::{MediaSpec, SpecFlags};

/// Result of running one grammar against the input.
enum Outcome {
    /// The grammar does not apply; try the next one.
    NoMatch,
    /// The grammar applies but the value is not acceptable.
    Rejected,
    Matched(MediaSpec),
}

impl From<Option<MediaSpec>> for Outcome {
    fn from(spec: Option<MediaSpec>) -> Self {
        spec.map_or(Outcome::Rejected, Outcome::Matched)
    }
}

type Grammar = fn(&str) -> Outcome;

const GRAMMARS: [Grammar; 4] = [timestamp_range, index_range, realtime_range, duration_range];

pub fn parse(input: &str) -> Option<MediaSpec> {
    for grammar in GRAMMARS {
        match grammar(input) {
            Outcome::NoMatch => continue,
            Outcome::Rejected => return None,
            Outcome::Matched(spec) => return Some(spec),
        }
    }
    None
}

// -------------------------------------------------------------------------
// Lexical pieces
// -------------------------------------------------------------------------

/// Signed decimal integer that fits in an `i64`.
fn integer(input: &mut &str) -> PResult<i64> {
    (opt('-'), digit1)
        .try_map(|(sign, digits): (Option<char>, &str)| {
            let text = match sign {
                Some(_) => format!("-{digits}"),
                None => digits.to_string(),
            };
            text.parse::<i64>()
        })
        .parse_next(input)
}

/// Signed decimal number with an optional fractional part.
fn seconds(input: &mut &str) -> PResult<f64> {
    (opt('-'), digit1, opt(preceded('.', digit1)))
        .try_map(
            |(sign, whole, frac): (Option<char>, &str, Option<&str>)| {
                let mut text = String::with_capacity(whole.len() + 8);
                if sign.is_some() {
                    text.push('-');
                }
                text.push_str(whole);
                if let Some(frac) = frac {
                    text.push('.');
                    text.push_str(frac);
                }
                text.parse::<f64>()
            },
        )
        .parse_next(input)
}

/// Position in the index grammar.
#[derive(Clone, Copy)]
enum Position {
    Ordinal(i64),
    First,
    Last,
}

impl Position {
    fn to_index(self) -> i64 {
        match self {
            Position::Ordinal(n) => n - 1,
            Position::First => 0,
            Position::Last => -1,
        }
    }
}

/// `N(st|nd|rd|th)` with the raw digits kept for validation.
fn ordinal<'s>(input: &mut &'s str) -> PResult<&'s str> {
    terminated(digit1, alt(("st", "nd", "rd", "th"))).parse_next(input)
}

fn position(input: &mut &str) -> PResult<Option<Position>> {
    alt((
        ordinal.map(|digits: &str| {
            // No zeroth element and no zero padding.
            if digits.starts_with('0') {
                return None;
            }
            digits.parse::<i64>().ok().map(Position::Ordinal)
        }),
        "first".value(Some(Position::First)),
        "last".value(Some(Position::Last)),
    ))
    .parse_next(input)
}

// -------------------------------------------------------------------------
// Grammars
// -------------------------------------------------------------------------

/// `<int>[f]` or `<int>[f]-<int>`.
fn timestamp_range(input: &str) -> Outcome {
    let parsed = (integer, opt('f'), opt(preceded('-', integer))).parse(input);
    let Ok((start, fuzzy, end)) = parsed else {
        return Outcome::NoMatch;
    };

    let flags = if fuzzy.is_some() {
        SpecFlags::FUZZY
    } else {
        SpecFlags::DEFAULT
    };
    Outcome::Matched(MediaSpec::new(start, end.unwrap_or(start), flags))
}

/// `first`, `last`, `<N>th`, optionally ranged to `<N>th` or `last`.
fn index_range(input: &str) -> Outcome {
    let parsed = (position, opt(preceded('-', position))).parse(input);
    let Ok((start, end)) = parsed else {
        return Outcome::NoMatch;
    };

    let resolve = || -> Option<MediaSpec> {
        let start = start?;
        let end = match end {
            None => start,
            Some(end) => {
                let end = end?;
                match (start, end) {
                    (Position::Last, _) => return None,
                    (_, Position::First) => return None,
                    _ => end,
                }
            }
        };
        Some(MediaSpec::new(
            start.to_index(),
            end.to_index(),
            SpecFlags::INDEX,
        ))
    };
    resolve().into()
}

/// `<float>s` or `<float>s-<float>[s]`.
fn realtime_range(input: &str) -> Outcome {
    let parsed = (
        seconds,
        's',
        opt(preceded('-', terminated(seconds, opt('s')))),
    )
        .parse(input);
    let Ok((start, _, end)) = parsed else {
        return Outcome::NoMatch;
    };

    Outcome::Matched(MediaSpec::new(
        start,
        end.unwrap_or(start),
        SpecFlags::REALTIME,
    ))
}

/// `<int>[f](+|-)<int>d`.
fn duration_range(input: &str) -> Outcome {
    let parsed = (integer, opt('f'), one_of(['+', '-']), digit1, 'd').parse(input);
    let Ok((start, fuzzy, sign, magnitude, _)) = parsed else {
        return Outcome::NoMatch;
    };

    let resolve = || -> Option<MediaSpec> {
        let magnitude = magnitude.parse::<i64>().ok()?;
        let offset = if sign == '-' { -magnitude } else { magnitude };
        let end = start.checked_add(offset)?;
        let mut flags = SpecFlags::DURATION;
        if fuzzy.is_some() {
            flags |= SpecFlags::FUZZY;
        }
        Some(MediaSpec::new(start, end, flags))
    };
    resolve().into()
}
