use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use nom::{
    bytes::complete::{take_while, take_while_m_n},
    character::complete::{char, one_of, satisfy},
    combinator::{opt, recognize},
    error::{context, ErrorKind},
    sequence::{pair, preceded},
};

use crate::context::ParseContext;
use crate::error::{fatal, Input, ParseResult, SyntaxError};
use crate::util::inline_spaces1;

pub(crate) fn is_date_separator(c: char) -> bool {
    c == '/' || c == '-' || c == '.'
}

/// A full `YYYY/MM/DD` or partial `MM/DD` date, with `/`, `-` or `.` as the
/// separator. Partial dates take the context's default year.
pub fn date<'a>(input: Input<'a>, ctx: &ParseContext) -> ParseResult<'a, NaiveDate> {
    date_with_default_year(input, ctx.year())
}

/// Lexes a digits-and-separators token, then makes sense of it. Once the
/// token is seen it has to be a valid date: every failure past that point is
/// fatal, anchored at the token's start.
pub fn date_with_default_year(input: Input, default_year: Option<i32>) -> ParseResult<NaiveDate> {
    let at = input;
    let (input, lexeme) = context(
        "date",
        recognize(pair(
            satisfy(|c: char| c.is_ascii_digit()),
            take_while(|c: char| c.is_ascii_digit() || is_date_separator(c)),
        )),
    )(input)?;
    let text = *lexeme.fragment();

    let mut separators: Vec<char> = Vec::new();
    for c in text.chars().filter(|&c| is_date_separator(c)) {
        if !separators.contains(&c) {
            separators.push(c);
        }
    }
    let separator = match separators.as_slice() {
        [separator] => *separator,
        [] => return Err(bad_date(at, text)),
        _ => {
            return Err(fatal(
                at,
                format!("bad date, different separators used: {text}"),
            ))
        }
    };

    let components: Vec<&str> = text.split(separator).collect();
    let date = match components.as_slice() {
        [month, day] => {
            let year = default_year.ok_or_else(|| {
                fatal(
                    at,
                    format!("partial date {text} found, but the current year is unknown"),
                )
            })?;
            build_date(at, text, year, month, day)?
        }
        [year, month, day] => {
            let year = year.parse().map_err(|_| bad_date(at, text))?;
            build_date(at, text, year, month, day)?
        }
        _ => return Err(bad_date(at, text)),
    };
    Ok((input, date))
}

fn bad_date<'a>(at: Input<'a>, text: &str) -> nom::Err<SyntaxError<'a>> {
    fatal(at, format!("bad date: {text}"))
}

fn build_date<'a>(
    at: Input<'a>,
    text: &str,
    year: i32,
    month: &str,
    day: &str,
) -> Result<NaiveDate, nom::Err<SyntaxError<'a>>> {
    let month: u32 = month.parse().map_err(|_| bad_date(at, text))?;
    let day: u32 = day.parse().map_err(|_| bad_date(at, text))?;
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| bad_date(at, text))
}

/// Date, whitespace, `HH:MM[:SS]`. A zone offset like `+0100` after the time
/// is read and ignored; the result is always naive local time.
pub fn datetime<'a>(input: Input<'a>, ctx: &ParseContext) -> ParseResult<'a, NaiveDateTime> {
    let (input, date) = date(input, ctx)?;
    let (input, _) = inline_spaces1(input)?;
    let (input, time) = time_of_day(input)?;
    let (input, _) = opt(timezone_offset)(input)?;
    Ok((input, date.and_time(time)))
}

/// The `=DATE2` companion of a transaction date. A missing year defaults to
/// the primary date's year; the context's own default year is untouched.
pub fn secondary_date(input: Input, primary: NaiveDate) -> ParseResult<NaiveDate> {
    date_with_default_year(input, Some(primary.year()))
}

fn time_of_day(input: Input) -> ParseResult<NaiveTime> {
    let at = input;
    let (input, hour) = two_digits(input)?;
    let (input, _) = char(':')(input)?;
    let (input, minute) = two_digits(input)?;
    let (input, second) = opt(preceded(char(':'), two_digits))(input)?;
    // Out-of-range fields backtrack so a caller can fall back to reading a
    // plain date.
    match NaiveTime::from_hms_opt(hour, minute, second.unwrap_or(0)) {
        Some(time) => Ok((input, time)),
        None => Err(nom::Err::Error(SyntaxError {
            at,
            kind: ErrorKind::Verify,
            label: Some("time of day"),
            message: None,
        })),
    }
}

fn two_digits(input: Input) -> ParseResult<u32> {
    let (rest, digits) = take_while_m_n(1, 2, |c: char| c.is_ascii_digit())(input)?;
    match digits.fragment().parse() {
        Ok(value) => Ok((rest, value)),
        Err(_) => Err(nom::Err::Error(SyntaxError {
            at: input,
            kind: ErrorKind::Digit,
            label: None,
            message: None,
        })),
    }
}

fn timezone_offset(input: Input) -> ParseResult<()> {
    let (input, _) = one_of("+-")(input)?;
    let (input, _) = take_while_m_n(4, 4, |c: char| c.is_ascii_digit())(input)?;
    Ok((input, ()))
}
