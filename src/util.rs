use nom::{
    branch::alt,
    bytes::complete::{take_till, take_while, take_while1},
    character::complete::{line_ending, satisfy},
    combinator::{eof, not, value},
    sequence::terminated,
};

use crate::error::{Input, ParseResult};

/// Whitespace that stays on the current line. Tabs and unicode spaces count,
/// newlines and carriage returns do not.
pub fn is_inline_space(c: char) -> bool {
    c != '\n' && c != '\r' && c.is_whitespace()
}

pub fn inline_spaces0(input: Input) -> ParseResult<Input> {
    take_while(is_inline_space)(input)
}

pub fn inline_spaces1(input: Input) -> ParseResult<Input> {
    take_while1(is_inline_space)(input)
}

/// Exactly one inline space with no second one after it. Account names and
/// period expressions may contain these; wider gaps end them.
pub fn single_space(input: Input) -> ParseResult<char> {
    terminated(satisfy(is_inline_space), not(satisfy(is_inline_space)))(input)
}

/// End of line or end of input; the line terminator, if any, is consumed.
pub fn end_of_line(input: Input) -> ParseResult<()> {
    alt((value((), line_ending), value((), eof)))(input)
}

/// The remainder of the current line, with the terminator consumed but not
/// returned. A trailing carriage return is dropped.
pub fn rest_of_line(input: Input) -> ParseResult<&str> {
    let (input, text) = take_till(|c| c == '\n')(input)?;
    let (input, _) = end_of_line(input)?;
    Ok((input, text.fragment().trim_end_matches('\r')))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rest_of_line_consumes_terminator() {
        let (rest, line) = rest_of_line(Input::new("one line\nnext")).unwrap();
        assert_eq!(line, "one line");
        assert_eq!(*rest.fragment(), "next");
    }

    #[test]
    fn rest_of_line_drops_carriage_return() {
        let (rest, line) = rest_of_line(Input::new("windows line\r\nnext")).unwrap();
        assert_eq!(line, "windows line");
        assert_eq!(*rest.fragment(), "next");
    }

    #[test]
    fn rest_of_line_accepts_end_of_input() {
        let (rest, line) = rest_of_line(Input::new("last line")).unwrap();
        assert_eq!(line, "last line");
        assert!(rest.fragment().is_empty());
    }

    #[test]
    fn end_of_line_accepts_both() {
        assert!(end_of_line(Input::new("\nx")).is_ok());
        assert!(end_of_line(Input::new("")).is_ok());
        assert!(end_of_line(Input::new("x")).is_err());
    }

    #[test]
    fn inline_spaces_stop_at_newlines() {
        let (rest, taken) = inline_spaces1(Input::new(" \t \nx")).unwrap();
        assert_eq!(*taken.fragment(), " \t ");
        assert_eq!(*rest.fragment(), "\nx");
        assert!(inline_spaces1(Input::new("\nx")).is_err());
    }

    #[test]
    fn single_space_rejects_wider_gaps() {
        assert!(single_space(Input::new(" x")).is_ok());
        assert!(single_space(Input::new("  x")).is_err());
        assert!(single_space(Input::new("\nx")).is_err());
    }
}
