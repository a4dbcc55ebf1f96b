use std::borrow::Cow;
use std::fmt;

use nom::{
    branch::alt,
    bytes::complete::take_while1,
    character::complete::char,
    combinator::opt,
    sequence::{pair, preceded},
};
use rust_decimal::Decimal;

use crate::context::ParseContext;
use crate::error::{Input, ParseResult};
use crate::number::{exponent, interpret_number, raw_number, sign};
use crate::util::{inline_spaces0, inline_spaces1};

/// Which side of the quantity the commodity symbol sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// Digit grouping for display: the separator and the group sizes, nearest
/// the decimal point first. The last size repeats for remaining digits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigitGroupStyle {
    pub separator: char,
    pub sizes: Vec<u8>,
}

/// How amounts of a commodity are written: symbol placement, spacing between
/// symbol and quantity, decimal precision and punctuation. `precision` is
/// the number of digits that were actually written after the decimal mark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmountStyle {
    pub side: Side,
    pub spaced: bool,
    pub precision: u8,
    pub decimal_mark: Option<char>,
    pub digit_groups: Option<DigitGroupStyle>,
}

impl Default for AmountStyle {
    fn default() -> Self {
        AmountStyle {
            side: Side::Left,
            spaced: false,
            precision: 0,
            decimal_mark: None,
            digit_groups: None,
        }
    }
}

impl AmountStyle {
    /// Whether `mark` reads as this style's decimal mark.
    pub fn accepts_decimal_mark(&self, mark: char) -> bool {
        if let Some(decimal_mark) = self.decimal_mark {
            return decimal_mark == mark;
        }
        if let Some(groups) = &self.digit_groups {
            return groups.separator != mark;
        }
        self.precision != 0
    }
}

/// A price annotation on an amount: `@ AMOUNT` per unit or `@@ AMOUNT` in
/// total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Price {
    Unit(Amount),
    Total(Amount),
}

/// An inline declaration that the account's balance should now equal
/// `amount`; `==` asserts across all commodities and a trailing `*` includes
/// subaccounts. Verification is the finalizer's job, not the parser's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceAssertion {
    pub amount: Amount,
    pub total: bool,
    pub inclusive: bool,
}

/// A quantity of some commodity together with the display style it was
/// written in. The quantity's decimal scale always equals the style's
/// precision.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Amount {
    pub commodity: String,
    pub quantity: Decimal,
    /// Written with a leading '*', as in periodic and auto posting rules.
    pub is_multiplier: bool,
    pub style: AmountStyle,
    pub price: Option<Box<Price>>,
}

impl Amount {
    fn looks_zero(&self) -> bool {
        self.quantity
            .round_dp(u32::from(self.style.precision))
            .is_zero()
    }

    /// The quantity rendered per the style: rounded (banker's) and
    /// zero-padded to the precision, grouped, with the style's decimal mark.
    fn formatted_quantity(&self) -> String {
        let precision = u32::from(self.style.precision);
        let mut rounded = self.quantity.round_dp(precision);
        rounded.rescale(precision);
        let text = rounded.to_string();

        let (sign, digits) = match text.strip_prefix('-') {
            Some(rest) => ("-", rest),
            None => ("", text.as_str()),
        };
        let (int_part, frac_part) = match digits.split_once('.') {
            Some((int_part, frac_part)) => (int_part, Some(frac_part)),
            None => (digits, None),
        };

        let mut out = String::with_capacity(text.len() + 8);
        out.push_str(sign);
        match &self.style.digit_groups {
            Some(groups) => push_grouped(&mut out, int_part, groups),
            None => out.push_str(int_part),
        }
        if let Some(frac_part) = frac_part {
            out.push(self.style.decimal_mark.unwrap_or('.'));
            out.push_str(frac_part);
        }
        out
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // Zero amounts collapse to a bare "0", commodity and all.
        if self.looks_zero() {
            f.write_str("0")?;
        } else {
            let quantity = self.formatted_quantity();
            let symbol = quote_symbol_if_needed(&self.commodity);
            let space = if self.style.spaced && !symbol.is_empty() {
                " "
            } else {
                ""
            };
            match self.style.side {
                Side::Left => write!(f, "{symbol}{space}{quantity}")?,
                Side::Right => write!(f, "{quantity}{space}{symbol}")?,
            }
        }
        match self.price.as_deref() {
            Some(Price::Unit(price)) => write!(f, " @ {price}"),
            Some(Price::Total(price)) => write!(f, " @@ {price}"),
            None => Ok(()),
        }
    }
}

fn push_grouped(out: &mut String, digits: &str, style: &DigitGroupStyle) {
    let mut sizes = style.sizes.iter().copied();
    let mut size = usize::from(sizes.next().unwrap_or(0));
    let mut remaining = digits.len();
    let mut boundaries = Vec::new();
    while size > 0 && remaining > size {
        remaining -= size;
        boundaries.push(remaining);
        if let Some(next) = sizes.next() {
            size = usize::from(next);
        }
    }
    let mut start = 0;
    for boundary in boundaries.iter().rev() {
        out.push_str(&digits[start..*boundary]);
        out.push(style.separator);
        start = *boundary;
    }
    out.push_str(&digits[start..]);
}

fn is_plain_symbol_char(c: char) -> bool {
    !c.is_ascii_digit()
        && !matches!(
            c,
            '-' | '+' | '.' | '@' | '*' | ';' | '\n' | '\r' | '\t' | ' ' | '"' | '{' | '}' | '='
        )
}

/// Wrap the symbol in double quotes when it contains characters that do not
/// survive unquoted, such as spaces or digits.
pub fn quote_symbol_if_needed(symbol: &str) -> Cow<'_, str> {
    if symbol.chars().all(is_plain_symbol_char) {
        Cow::Borrowed(symbol)
    } else {
        Cow::Owned(format!("\"{symbol}\""))
    }
}

/// A commodity symbol: a double-quoted run (anything but ';', newline and
/// the quote itself) or an unquoted run of plain symbol characters.
pub fn commodity_symbol(input: Input) -> ParseResult<&str> {
    alt((quoted_symbol, unquoted_symbol))(input)
}

fn quoted_symbol(input: Input) -> ParseResult<&str> {
    let (input, _) = char('"')(input)?;
    let (input, symbol) = take_while1(|c| c != ';' && c != '\n' && c != '\r' && c != '"')(input)?;
    let (input, _) = char('"')(input)?;
    Ok((input, *symbol.fragment()))
}

fn unquoted_symbol(input: Input) -> ParseResult<&str> {
    let (input, symbol) = take_while1(is_plain_symbol_char)(input)?;
    Ok((input, *symbol.fragment()))
}

fn spaces_flag(input: Input) -> ParseResult<bool> {
    let (input, spaces) = inline_spaces0(input)?;
    Ok((input, !spaces.fragment().is_empty()))
}

fn multiplier_flag(input: Input) -> ParseResult<bool> {
    let (input, star) = opt(char('*'))(input)?;
    Ok((input, star.is_some()))
}

/// Parse one amount: optional '*' multiplier, sign, commodity on either side
/// or absent, the number, and an optional price annotation. Trailing spaces
/// are consumed.
pub fn amount<'a>(input: Input<'a>, ctx: &ParseContext) -> ParseResult<'a, Amount> {
    let (input, mut amount) = amount_without_price(input, ctx)?;
    let (input, _) = inline_spaces0(input)?;
    let (input, price) = opt(|input| price_annotation(input, ctx))(input)?;
    let (input, _) = inline_spaces0(input)?;
    amount.price = price.map(Box::new);
    Ok((input, amount))
}

/// The amount proper, without any price suffix. Price annotations call this
/// recursively, so a price carries its own commodity and style but never a
/// further price.
pub fn amount_without_price<'a>(input: Input<'a>, ctx: &ParseContext) -> ParseResult<'a, Amount> {
    let (input, is_multiplier) = multiplier_flag(input)?;
    let (input, negative) = sign(input)?;
    alt((
        move |input| left_symbol_amount(input, ctx, is_multiplier, negative),
        move |input| right_or_no_symbol_amount(input, ctx, is_multiplier, negative),
    ))(input)
}

fn left_symbol_amount<'a>(
    input: Input<'a>,
    ctx: &ParseContext,
    is_multiplier: bool,
    negative: bool,
) -> ParseResult<'a, Amount> {
    let (input, symbol) = commodity_symbol(input)?;
    let style_hint = ctx.amount_style(symbol);
    let (input, spaced) = spaces_flag(input)?;
    // The sign may also come between the symbol and the number: "$-5".
    let (input, inner_negative) = sign(input)?;

    let number_start = input;
    let (input, raw) = raw_number(input)?;
    let (input, exp) = opt(exponent)(input)?;
    let parsed = interpret_number(number_start, raw, exp, style_hint)?;

    let quantity = if negative != inner_negative {
        -parsed.quantity
    } else {
        parsed.quantity
    };
    let style = AmountStyle {
        side: Side::Left,
        spaced,
        precision: parsed.precision,
        decimal_mark: parsed.decimal_mark,
        digit_groups: parsed.digit_groups,
    };
    let amount = Amount {
        commodity: symbol.to_string(),
        quantity,
        is_multiplier,
        style,
        price: None,
    };
    Ok((input, amount))
}

/// Number first. Only after it is read do we learn whether a commodity
/// follows, so the raw token is held and interpreted once the symbol (and
/// with it any style hint) is known.
fn right_or_no_symbol_amount<'a>(
    input: Input<'a>,
    ctx: &ParseContext,
    is_multiplier: bool,
    negative: bool,
) -> ParseResult<'a, Amount> {
    let number_start = input;
    let (input, raw) = raw_number(input)?;
    let (input, exp) = opt(exponent)(input)?;
    let (input, symbol) = opt(pair(spaces_flag, commodity_symbol))(input)?;

    match symbol {
        Some((spaced, symbol)) => {
            let style_hint = ctx.amount_style(symbol);
            let parsed = interpret_number(number_start, raw, exp, style_hint)?;
            let quantity = if negative {
                -parsed.quantity
            } else {
                parsed.quantity
            };
            let style = AmountStyle {
                side: Side::Right,
                spaced,
                precision: parsed.precision,
                decimal_mark: parsed.decimal_mark,
                digit_groups: parsed.digit_groups,
            };
            let amount = Amount {
                commodity: symbol.to_string(),
                quantity,
                is_multiplier,
                style,
                price: None,
            };
            Ok((input, amount))
        }
        None => {
            let style_hint = ctx.amount_style("");
            let parsed = interpret_number(number_start, raw, exp, style_hint)?;
            let quantity = if negative {
                -parsed.quantity
            } else {
                parsed.quantity
            };
            // A declared default commodity adopts the bare number, widening
            // its precision to the larger of the two. Multiplier amounts
            // stay commodity-less so the matched posting decides.
            match ctx.default_commodity().filter(|_| !is_multiplier) {
                Some((symbol, default_style)) => {
                    let mut style = default_style.clone();
                    style.precision = style.precision.max(parsed.precision);
                    let mut quantity = quantity;
                    quantity.rescale(u32::from(style.precision));
                    let amount = Amount {
                        commodity: symbol.to_string(),
                        quantity,
                        is_multiplier,
                        style,
                        price: None,
                    };
                    Ok((input, amount))
                }
                None => {
                    let style = AmountStyle {
                        side: Side::Left,
                        spaced: false,
                        precision: parsed.precision,
                        decimal_mark: parsed.decimal_mark,
                        digit_groups: parsed.digit_groups,
                    };
                    let amount = Amount {
                        commodity: String::new(),
                        quantity,
                        is_multiplier,
                        style,
                        price: None,
                    };
                    Ok((input, amount))
                }
            }
        }
    }
}

fn price_annotation<'a>(input: Input<'a>, ctx: &ParseContext) -> ParseResult<'a, Price> {
    let (input, _) = char('@')(input)?;
    let (input, total) = opt(char('@'))(input)?;
    let (input, _) = inline_spaces0(input)?;
    let (input, price) = amount_without_price(input, ctx)?;
    let price = if total.is_some() {
        Price::Total(price)
    } else {
        Price::Unit(price)
    };
    Ok((input, price))
}

/// `= AMOUNT` following a posting amount.
pub fn balance_assertion<'a>(
    input: Input<'a>,
    ctx: &ParseContext,
) -> ParseResult<'a, BalanceAssertion> {
    let (input, _) = char('=')(input)?;
    let (input, total) = opt(char('='))(input)?;
    let (input, inclusive) = opt(char('*'))(input)?;
    let (input, _) = inline_spaces0(input)?;
    let (input, amount) = amount(input, ctx)?;
    let assertion = BalanceAssertion {
        amount,
        total: total.is_some(),
        inclusive: inclusive.is_some(),
    };
    Ok((input, assertion))
}

/// Ledger-style `{=AMOUNT}` fixed lot price, accepted for compatibility.
/// Callers validate and discard the value.
pub fn fixed_lot_price<'a>(input: Input<'a>, ctx: &ParseContext) -> ParseResult<'a, Amount> {
    let (input, _) = char('{')(input)?;
    let (input, _) = inline_spaces0(input)?;
    let (input, _) = char('=')(input)?;
    let (input, _) = inline_spaces0(input)?;
    let (input, amount) = amount_without_price(input, ctx)?;
    let (input, _) = inline_spaces0(input)?;
    let (input, _) = char('}')(input)?;
    Ok((input, amount))
}

/// At least one space and then an amount, or nothing at all: posting amounts
/// may be left out entirely.
pub fn space_and_amount_or_missing<'a>(
    input: Input<'a>,
    ctx: &ParseContext,
) -> ParseResult<'a, Option<Amount>> {
    opt(preceded(inline_spaces1, |input| amount(input, ctx)))(input)
}
