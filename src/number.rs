use std::str::FromStr;

use nom::{
    branch::alt,
    bytes::complete::take_while1,
    character::complete::{char, satisfy},
    combinator::{map, opt},
    multi::many0,
    sequence::{pair, preceded},
};
use rust_decimal::Decimal;

use crate::amount::{AmountStyle, DigitGroupStyle};
use crate::error::{fatal, Input, ParseResult, SyntaxError};

const TOO_MANY_DECIMAL_PLACES: &str =
    "invalid number: numbers with more than 28 decimal places are not supported";
const OUT_OF_RANGE: &str = "invalid number: the number is too large to be represented";

/// A numeric token as written, before deciding which mark is the decimal
/// point. `digit_groups` holds the digits between occurrences of
/// `first_separator`; `tail` holds a differing mark and the digits after it.
/// "1,234,567.89" lexes to groups `["1", "234", "567"]` separated by `,` with
/// tail `('.', "89")`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawNumber<'a> {
    pub first_separator: Option<char>,
    pub digit_groups: Vec<&'a str>,
    pub tail: Option<(char, &'a str)>,
}

/// The outcome of interpreting a [`RawNumber`]: an exact quantity plus the
/// display details observed in the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedNumber {
    pub quantity: Decimal,
    pub precision: u8,
    pub decimal_mark: Option<char>,
    pub digit_groups: Option<DigitGroupStyle>,
}

/// '.' and ',' can serve as either decimal marks or digit-group separators.
pub fn is_decimal_mark(c: char) -> bool {
    c == '.' || c == ','
}

/// Space characters group digits but never mark the decimal point.
fn is_separator_space(c: char) -> bool {
    matches!(c, ' ' | '\u{00a0}' | '\u{2000}'..='\u{200a}' | '\u{202f}' | '\u{205f}')
}

fn is_group_separator(c: char) -> bool {
    is_decimal_mark(c) || is_separator_space(c)
}

fn digit_group(input: Input) -> ParseResult<Input> {
    take_while1(|c: char| c.is_ascii_digit())(input)
}

/// Optional leading sign. Returns true when the sign is negative.
pub fn sign(input: Input) -> ParseResult<bool> {
    let (input, sign) = opt(alt((char('-'), char('+'))))(input)?;
    Ok((input, sign == Some('-')))
}

/// An exponent suffix: `e` or `E` and a signed integer.
pub fn exponent(input: Input) -> ParseResult<i32> {
    let (input, _) = alt((char('e'), char('E')))(input)?;
    let (input, negative) = sign(input)?;
    let (input, digits) = digit_group(input)?;
    match digits.fragment().parse::<i32>() {
        Ok(magnitude) => Ok((input, if negative { -magnitude } else { magnitude })),
        Err(_) => Err(fatal(digits, "invalid number (exponent out of range)")),
    }
}

/// Lex a numeric token without yet deciding what its punctuation means.
///
/// Once digits have been seen, a malformed continuation is a hard error
/// rather than a backtrack: a second mark directly after the number (as in
/// "1,,1" or ".1,") or a lone digit group dangling after a space can only be
/// a mistyped number.
pub fn raw_number(input: Input) -> ParseResult<RawNumber> {
    let (input, number) = alt((leading_mark_number, leading_digits_number))(input)?;

    if input.fragment().starts_with(is_decimal_mark) {
        return Err(fatal(input, "invalid number (invalid use of separator)"));
    }
    let mut following = input.fragment().chars();
    if following.next() == Some(' ') && following.next().map_or(false, |c| c.is_ascii_digit()) {
        return Err(fatal(input, "invalid number (excessive trailing digits)"));
    }

    Ok((input, number))
}

/// ".5" and ",5": a decimal mark with no integer part.
fn leading_mark_number(input: Input) -> ParseResult<RawNumber> {
    let (input, mark) = satisfy(is_decimal_mark)(input)?;
    let (input, digits) = digit_group(input)?;
    let number = RawNumber {
        first_separator: None,
        digit_groups: Vec::new(),
        tail: Some((mark, *digits.fragment())),
    };
    Ok((input, number))
}

fn leading_digits_number(input: Input) -> ParseResult<RawNumber> {
    let (input, first) = digit_group(input)?;
    let first = *first.fragment();

    let (input, separated) = opt(pair(satisfy(is_group_separator), digit_group))(input)?;
    match separated {
        // Just digits, optionally ending in a bare decimal mark as in "1."
        None => {
            let (input, mark) = opt(satisfy(is_decimal_mark))(input)?;
            let number = RawNumber {
                first_separator: None,
                digit_groups: vec![first],
                tail: mark.map(|mark| (mark, "")),
            };
            Ok((input, number))
        }
        Some((separator, second)) => {
            let (input, rest) = many0(preceded(char(separator), digit_group))(input)?;
            let (input, tail) = opt(pair(
                satisfy(|c| is_decimal_mark(c) && c != separator),
                map(opt(digit_group), |digits| {
                    digits.map_or("", |digits| *digits.fragment())
                }),
            ))(input)?;

            let mut digit_groups = vec![first, *second.fragment()];
            digit_groups.extend(rest.iter().map(|group| *group.fragment()));
            let number = RawNumber {
                first_separator: Some(separator),
                digit_groups,
                tail,
            };
            Ok((input, number))
        }
    }
}

/// Decide what the punctuation of `number` meant and build the exact value.
///
/// A token like "1,234" is ambiguous: the mark is read as the decimal point
/// unless the style hint for the commodity says otherwise. Errors are fatal,
/// anchored at `at` (the start of the number in the source).
pub fn interpret_number<'a>(
    at: Input<'a>,
    number: RawNumber,
    exponent: Option<i32>,
    style: Option<&AmountStyle>,
) -> Result<ParsedNumber, nom::Err<SyntaxError<'a>>> {
    let (groups, separator, tail) = resolve(number, style);

    if separator.is_some() && exponent.is_some() {
        return Err(fatal(
            at,
            "invalid number: digit separators and exponents may not be used together",
        ));
    }
    let digit_groups = separator.map(|separator| DigitGroupStyle {
        separator,
        sizes: group_sizes(&groups),
    });

    let decimal_digits = tail.map_or("", |(_, digits)| digits);
    if decimal_digits.len() > 28 {
        return Err(fatal(at, TOO_MANY_DECIMAL_PLACES));
    }

    // Leading guard zero covers numbers like ".5" that have no integer part.
    let digit_count = groups.iter().map(|group| group.len()).sum::<usize>();
    let mut literal = String::with_capacity(2 + digit_count + decimal_digits.len());
    literal.push('0');
    for group in &groups {
        literal.push_str(group);
    }
    if !decimal_digits.is_empty() {
        literal.push('.');
        literal.push_str(decimal_digits);
    }
    let quantity = Decimal::from_str(&literal).map_err(|_| fatal(at, OUT_OF_RANGE))?;

    let scale = decimal_digits.len() as i64 - i64::from(exponent.unwrap_or(0));
    let (quantity, precision) = scale_quantity(at, quantity, scale)?;

    Ok(ParsedNumber {
        quantity,
        precision,
        decimal_mark: tail.map(|(mark, _)| mark),
        digit_groups,
    })
}

/// Settle an ambiguous mark, yielding integer groups, the group separator and
/// the fractional tail. Without a style hint the mark is the decimal point.
fn resolve<'a>(
    number: RawNumber<'a>,
    style: Option<&AmountStyle>,
) -> (Vec<&'a str>, Option<char>, Option<(char, &'a str)>) {
    match number {
        RawNumber {
            first_separator: Some(mark),
            digit_groups,
            tail: None,
        } if digit_groups.len() == 2 && is_decimal_mark(mark) => {
            if style.map_or(true, |style| style.accepts_decimal_mark(mark)) {
                (vec![digit_groups[0]], None, Some((mark, digit_groups[1])))
            } else {
                (digit_groups, Some(mark), None)
            }
        }
        RawNumber {
            first_separator,
            digit_groups,
            tail,
        } => (digit_groups, first_separator, tail),
    }
}

/// Group sizes nearest the decimal point first. A short leading group does
/// not get its own entry; display repeats the last size anyway.
fn group_sizes(groups: &[&str]) -> Vec<u8> {
    let mut sizes: Vec<u8> = groups
        .iter()
        .map(|group| u8::try_from(group.len()).unwrap_or(u8::MAX))
        .collect();
    if sizes.len() >= 2 && sizes[0] < sizes[1] {
        sizes.remove(0);
    }
    sizes.reverse();
    sizes
}

/// Apply the exponent by adjusting the scale, keeping the quantity exact.
/// The stored scale always equals the reported precision.
fn scale_quantity<'a>(
    at: Input<'a>,
    quantity: Decimal,
    scale: i64,
) -> Result<(Decimal, u8), nom::Err<SyntaxError<'a>>> {
    if scale > 28 {
        return Err(fatal(at, TOO_MANY_DECIMAL_PLACES));
    }
    if scale >= 0 {
        let mut quantity = quantity;
        quantity
            .set_scale(scale as u32)
            .map_err(|_| fatal(at, TOO_MANY_DECIMAL_PLACES))?;
        return Ok((quantity, scale as u8));
    }
    // Positive exponent beyond the written decimals: shift into the mantissa.
    let shift = u32::try_from(-scale).map_err(|_| fatal(at, OUT_OF_RANGE))?;
    let factor = 10i128
        .checked_pow(shift)
        .ok_or_else(|| fatal(at, OUT_OF_RANGE))?;
    let mantissa = quantity
        .mantissa()
        .checked_mul(factor)
        .ok_or_else(|| fatal(at, OUT_OF_RANGE))?;
    let quantity =
        Decimal::try_from_i128_with_scale(mantissa, 0).map_err(|_| fatal(at, OUT_OF_RANGE))?;
    Ok((quantity, 0))
}

#[cfg(test)]
mod test {
    use super::*;

    fn number(text: &str, style: Option<&AmountStyle>) -> Result<ParsedNumber, String> {
        let input = Input::new(text);
        let (input, raw) = raw_number(input).map_err(render)?;
        let (_, exp) = opt(exponent)(input).map_err(render)?;
        interpret_number(Input::new(text), raw, exp, style).map_err(render)
    }

    fn render(err: nom::Err<SyntaxError>) -> String {
        match err {
            nom::Err::Error(e) | nom::Err::Failure(e) => e.message.unwrap_or_default(),
            nom::Err::Incomplete(_) => String::new(),
        }
    }

    fn dec(text: &str) -> Decimal {
        Decimal::from_str(text).unwrap()
    }

    fn grouped(separator: char, sizes: &[u8]) -> Option<DigitGroupStyle> {
        Some(DigitGroupStyle {
            separator,
            sizes: sizes.to_vec(),
        })
    }

    #[test]
    fn groups_then_decimal_mark() {
        let n = number("1,234,567.89", None).unwrap();
        assert_eq!(n.quantity, dec("1234567.89"));
        assert_eq!(n.quantity.scale(), 2);
        assert_eq!(n.precision, 2);
        assert_eq!(n.decimal_mark, Some('.'));
        assert_eq!(n.digit_groups, grouped(',', &[3, 3]));
    }

    #[test]
    fn swapped_marks() {
        let n = number("1.00.000,1", None).unwrap();
        assert_eq!(n.quantity, dec("100000.1"));
        assert_eq!(n.precision, 1);
        assert_eq!(n.decimal_mark, Some(','));
        assert_eq!(n.digit_groups, grouped('.', &[3, 2]));
    }

    #[test]
    fn grouped_integer() {
        let n = number("1,000,000", None).unwrap();
        assert_eq!(n.quantity, dec("1000000"));
        assert_eq!(n.precision, 0);
        assert_eq!(n.decimal_mark, None);
        assert_eq!(n.digit_groups, grouped(',', &[3, 3]));
    }

    #[test]
    fn space_separated_groups() {
        let n = number("1 000 000", None).unwrap();
        assert_eq!(n.quantity, dec("1000000"));
        assert_eq!(n.digit_groups, grouped(' ', &[3, 3]));
    }

    #[test]
    fn bare_and_trailing_marks() {
        let n = number("1.", None).unwrap();
        assert_eq!(n.quantity, dec("1"));
        assert_eq!(n.precision, 0);
        assert_eq!(n.decimal_mark, Some('.'));

        let n = number("1,", None).unwrap();
        assert_eq!(n.precision, 0);
        assert_eq!(n.decimal_mark, Some(','));

        let n = number(".5", None).unwrap();
        assert_eq!(n.quantity, dec("0.5"));
        assert_eq!(n.precision, 1);
    }

    #[test]
    fn doubled_separators_are_rejected() {
        for text in [
            "1,,1",
            "1..1",
            ".1,",
            ",1.",
            "1,000.000,1",
            "1.000,000.1",
            "1,000.000.1",
        ] {
            let err = number(text, None).unwrap_err();
            assert_eq!(err, "invalid number (invalid use of separator)", "{text}");
        }
    }

    #[test]
    fn dangling_digits_are_rejected() {
        let err = number("1,000 0", None).unwrap_err();
        assert_eq!(err, "invalid number (excessive trailing digits)");
    }

    #[test]
    fn two_groups_lean_on_the_style_hint() {
        // Unhinted, the mark reads as the decimal point.
        let n = number("1,000", None).unwrap();
        assert_eq!(n.quantity, dec("1.000"));
        assert_eq!(n.precision, 3);

        let integer_style = AmountStyle {
            precision: 0,
            ..AmountStyle::default()
        };
        let n = number("1,000", Some(&integer_style)).unwrap();
        assert_eq!(n.quantity, dec("1000"));
        assert_eq!(n.precision, 0);
        assert_eq!(n.digit_groups, grouped(',', &[3]));

        let comma_decimal = AmountStyle {
            decimal_mark: Some(','),
            ..AmountStyle::default()
        };
        let n = number("1,000", Some(&comma_decimal)).unwrap();
        assert_eq!(n.quantity, dec("1.000"));

        let dot_decimal = AmountStyle {
            decimal_mark: Some('.'),
            ..AmountStyle::default()
        };
        let n = number("1,000", Some(&dot_decimal)).unwrap();
        assert_eq!(n.quantity, dec("1000"));

        let comma_grouped = AmountStyle {
            precision: 2,
            digit_groups: Some(DigitGroupStyle {
                separator: ',',
                sizes: vec![3],
            }),
            ..AmountStyle::default()
        };
        let n = number("1,000", Some(&comma_grouped)).unwrap();
        assert_eq!(n.quantity, dec("1000"));
    }

    #[test]
    fn exponents_scale_the_value() {
        let n = number("1e3", None).unwrap();
        assert_eq!(n.quantity, dec("1000"));
        assert_eq!(n.precision, 0);

        let n = number("1.5e-2", None).unwrap();
        assert_eq!(n.quantity, dec("0.015"));
        assert_eq!(n.precision, 3);

        let n = number("0.5e3", None).unwrap();
        assert_eq!(n.quantity, dec("500"));
        assert_eq!(n.precision, 0);
    }

    #[test]
    fn exponents_and_digit_groups_do_not_mix() {
        let err = number("1,000,000e1", None).unwrap_err();
        assert_eq!(
            err,
            "invalid number: digit separators and exponents may not be used together"
        );
    }

    #[test]
    fn capacity_limits_are_fatal() {
        let tiny = format!("0.{}", "1".repeat(29));
        let err = number(&tiny, None).unwrap_err();
        assert_eq!(err, TOO_MANY_DECIMAL_PLACES);

        let err = number("123456789012345678901234567890", None).unwrap_err();
        assert_eq!(err, OUT_OF_RANGE);
    }
}
