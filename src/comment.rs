//! Following comments and the tags and dates hidden inside them.
//!
//! A transaction or posting may be followed by a comment region: the rest of
//! the current line after `;`, plus any number of further lines holding only
//! an indented comment. The region is read once for its text, then the
//! original sub-slices are scanned again for `name: value` tags and
//! `[DATE]`/`[DATE=DATE2]` bracketed dates, so errors found on the second
//! pass still point at the right spot in the file.

use chrono::{Datelike, NaiveDate};
use nom::{
    branch::alt,
    bytes::complete::{take_till, take_while1},
    character::complete::char,
    combinator::{map, opt, peek},
    error::ErrorKind,
    multi::many0,
    sequence::{delimited, preceded, terminated},
    Slice,
};

use crate::date::{date_with_default_year, is_date_separator};
use crate::error::{Input, ParseResult, SyntaxError};
use crate::journal::Tag;
use crate::util::{end_of_line, inline_spaces0, inline_spaces1};

/// The comment region following a transaction or posting, as stripped text:
/// each line loses its `;` and surrounding whitespace, lines are joined with
/// newlines. An immediate end of line yields the empty string.
pub fn following_comment(input: Input) -> ParseResult<String> {
    let (input, spans) = following_comment_lines(input)?;
    Ok((input, strip_comment_lines(&spans)))
}

/// Like [`following_comment`], but additionally extracts tags and any
/// `date:`/`date2:` values, whether written as tags or in brackets. Partial
/// dates take `default_date`'s year. Every `date:`/`date2:` value must parse,
/// duplicates included; the first of each fills the slot, and a tag beats a
/// bracketed date for the same slot.
pub fn following_comment_and_tags(
    input: Input,
    default_date: Option<NaiveDate>,
) -> ParseResult<(String, Vec<Tag>, Option<NaiveDate>, Option<NaiveDate>)> {
    let (input, spans) = following_comment_lines(input)?;
    let text = strip_comment_lines(&spans);
    let default_year = default_date.map(|d| d.year());

    let mut tags = Vec::new();
    let mut tag_date = None;
    let mut tag_date2 = None;
    let mut bracket_date = None;
    let mut bracket_date2 = None;

    for line in &spans {
        for raw in comment_line_tags(*line) {
            match raw.name {
                "date" => {
                    let parsed = reparse_tag_date(&raw, default_year)?;
                    tag_date.get_or_insert(parsed);
                }
                "date2" => {
                    let parsed = reparse_tag_date(&raw, default_year)?;
                    tag_date2.get_or_insert(parsed);
                }
                _ => {}
            }
            tags.push(raw.to_tag());
        }
        let (d, d2) = bracketed_dates_in_line(*line, default_year)?;
        bracket_date = bracket_date.or(d);
        bracket_date2 = bracket_date2.or(d2);
    }

    let date = tag_date.or(bracket_date);
    let date2 = tag_date2.or(bracket_date2);
    Ok((input, (text, tags, date, date2)))
}

/// Extract `name: value` tags from already-collected comment text.
pub fn comment_tags(text: &str) -> Vec<Tag> {
    let mut tags = Vec::new();
    for line in text.lines() {
        for raw in comment_line_tags(Input::new(line)) {
            tags.push(raw.to_tag());
        }
    }
    tags
}

/// One sub-slice per comment line, each pointing at the text after its `;`.
fn following_comment_lines(input: Input) -> ParseResult<Vec<Input>> {
    let (input, _) = inline_spaces0(input)?;
    let (input, first) = alt((
        map(terminated(comment_text, end_of_line), Some),
        map(end_of_line, |_| None),
    ))(input)?;
    let (input, more) = many0(preceded(
        inline_spaces1,
        terminated(comment_text, end_of_line),
    ))(input)?;
    let mut spans: Vec<Input> = first.into_iter().collect();
    spans.extend(more);
    Ok((input, spans))
}

fn comment_text(input: Input) -> ParseResult<Input> {
    preceded(char(';'), take_till(|c| c == '\n'))(input)
}

fn strip_comment_lines(spans: &[Input]) -> String {
    spans
        .iter()
        .map(|s| s.fragment().trim())
        .collect::<Vec<_>>()
        .join("\n")
}

/// A tag hit from the scanning pass: the name, and the untrimmed value still
/// anchored at its source position.
struct RawTag<'a> {
    name: &'a str,
    value: Input<'a>,
}

impl RawTag<'_> {
    fn to_tag(&self) -> Tag {
        Tag {
            name: self.name.to_string(),
            value: self.value.fragment().trim().to_string(),
        }
    }
}

/// Scan one comment line for tags. A tag name is the last whitespace-free
/// run ending at a `:`; a colon with nothing in front of it is plain text.
/// Values run to the next comma or the end of the line; the text of a value
/// is never scanned for further tags.
fn comment_line_tags(line: Input) -> Vec<RawTag> {
    let mut tags = Vec::new();
    let mut rest = line;
    while let Ok((after_colon, before)) = up_to_colon(rest) {
        let name = before
            .fragment()
            .rsplit(char::is_whitespace)
            .next()
            .unwrap_or("");
        if name.is_empty() {
            rest = after_colon;
            continue;
        }
        let (after_value, value) = match tag_value(after_colon) {
            Ok(ok) => ok,
            Err(_) => break,
        };
        tags.push(RawTag { name, value });
        rest = after_value;
    }
    tags
}

fn up_to_colon(input: Input) -> ParseResult<Input> {
    terminated(take_till(|c| c == ':'), char(':'))(input)
}

fn tag_value(input: Input) -> ParseResult<Input> {
    terminated(take_till(|c| c == ','), opt(char(',')))(input)
}

/// Re-parse a `date:`/`date2:` tag value at its original position. Trailing
/// text after the date is tolerated, but a value that is no date at all is an
/// error, not a plain tag.
fn reparse_tag_date<'a>(
    raw: &RawTag<'a>,
    default_year: Option<i32>,
) -> Result<NaiveDate, nom::Err<SyntaxError<'a>>> {
    let (value, _) = inline_spaces0(raw.value)?;
    match date_with_default_year(value, default_year) {
        Ok((_, date)) => Ok(date),
        Err(nom::Err::Error(e)) => Err(nom::Err::Failure(e)),
        Err(other) => Err(other),
    }
}

/// Scan one comment line for `[...]` groups that look like bracketed dates.
/// The first hit fills each slot; brackets that fail the lookahead are left
/// as plain text.
fn bracketed_dates_in_line<'a>(
    line: Input<'a>,
    default_year: Option<i32>,
) -> Result<(Option<NaiveDate>, Option<NaiveDate>), nom::Err<SyntaxError<'a>>> {
    let mut date = None;
    let mut date2 = None;
    let mut rest = line;
    loop {
        let (at_bracket, _) = up_to_bracket(rest)?;
        if at_bracket.fragment().is_empty() {
            break;
        }
        match bracketed_dates(at_bracket, default_year) {
            Ok((after, (d, d2))) => {
                date = date.or(d);
                date2 = date2.or(d2);
                rest = after;
            }
            Err(nom::Err::Error(_)) => rest = at_bracket.slice(1..),
            Err(other) => return Err(other),
        }
    }
    Ok((date, date2))
}

fn up_to_bracket(input: Input) -> ParseResult<Input> {
    take_till(|c| c == '[')(input)
}

/// `[DATE]`, `[DATE=DATE2]` or `[=DATE2]`. The lookahead only commits when
/// the brackets hold nothing but digits, date separators and `=`, with at
/// least one digit and one separator; once committed, a malformed date inside
/// is fatal. A second date missing its year takes it from the first date.
fn bracketed_dates(
    input: Input,
    default_year: Option<i32>,
) -> ParseResult<(Option<NaiveDate>, Option<NaiveDate>)> {
    let (_, candidate) = peek(delimited(
        char('['),
        take_while1(|c: char| c.is_ascii_digit() || is_date_separator(c) || c == '='),
        char(']'),
    ))(input)?;
    let content = candidate.fragment();
    if !content.chars().any(|c| c.is_ascii_digit()) || !content.chars().any(is_date_separator) {
        return Err(nom::Err::Error(SyntaxError {
            at: input,
            kind: ErrorKind::Verify,
            label: Some("bracketed date"),
            message: None,
        }));
    }
    let (input, _) = char('[')(input)?;
    let (input, first) = opt(|i| date_with_default_year(i, default_year))(input)?;
    let (input, second) = opt(|i| {
        let (i, _) = char('=')(i)?;
        let year = first.map(|d| d.year()).or(default_year);
        date_with_default_year(i, year)
    })(input)?;
    let (input, _) = char(']')(input)?;
    Ok((input, (first, second)))
}
