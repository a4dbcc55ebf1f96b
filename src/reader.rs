//! The journal file reader: the top-level loop turning file text into a
//! [`Journal`], and the directives that steer the [`ParseContext`] along the
//! way. Includes are read eagerly; an included file inherits a copy of the
//! context and its results are folded back into the same journal, but its
//! directives do not leak back out.

use std::path::{Path, PathBuf};

use chrono::{Datelike, Local, NaiveDate};
use log::debug;
use nom::{
    branch::alt,
    bytes::complete::{tag, take_till, take_while1},
    character::complete::{char, one_of, satisfy},
    combinator::{map, opt, peek},
    error::{context, ErrorKind},
    multi::many0,
    sequence::{delimited, preceded},
};

use crate::amount::{
    amount, balance_assertion, commodity_symbol, fixed_lot_price, space_and_amount_or_missing,
    AmountStyle,
};
use crate::comment::{following_comment, following_comment_and_tags};
use crate::context::{account_alias, account_name, modified_account_name, AccountAlias, ParseContext};
use crate::date::{date, datetime, secondary_date};
use crate::error::{fatal, Input, ParseError, ParseResult, SyntaxError};
use crate::journal::{
    account_name_without_kind, AccountDeclaration, Journal, MarketPrice, ModifierTransaction,
    PeriodicTransaction, Posting, PostingKind, Status, Transaction,
};
use crate::options::InputOpts;
use crate::util::{end_of_line, inline_spaces0, inline_spaces1, rest_of_line, single_space};

/// Describes a reader for format detection: its name, the file extensions it
/// claims, and its parse function.
pub struct Reader {
    pub format: &'static str,
    pub extensions: &'static [&'static str],
    pub parse: fn(&InputOpts, &Path, &str) -> Result<Journal, String>,
    pub experimental: bool,
}

/// The journal format reader.
pub fn reader() -> Reader {
    Reader {
        format: "journal",
        extensions: &["journal", "j", "hledger", "ledger"],
        parse: read_journal,
        experimental: false,
    }
}

/// Run one parser over a string with no prior context. The parser does not
/// have to consume all of the input.
pub fn parse_value<'a, T>(
    mut parser: impl FnMut(Input<'a>) -> ParseResult<'a, T>,
    text: &'a str,
) -> Result<T, ParseError> {
    match parser(Input::new(text)) {
        Ok((_, value)) => Ok(value),
        Err(err) => Err(ParseError::from_nom("(string)", err)),
    }
}

/// Parse journal text with a fresh, unseeded context: no default year and no
/// input options. Partial dates in such text are errors.
pub fn parse_journal(text: &str) -> Result<Journal, ParseError> {
    let mut ctx = ParseContext::default();
    ctx.path = PathBuf::from("(string)");
    let mut journal = parse_file(&mut ctx, text)?;
    finalise(&mut journal, ctx);
    Ok(journal)
}

/// Read a journal file's text through the full pipeline: the context starts
/// with the current year, command-line aliases are installed, directives and
/// includes are honored, and the files and style tables are attached.
pub fn read_journal(opts: &InputOpts, path: &Path, text: &str) -> Result<Journal, String> {
    let mut ctx = ParseContext::default();
    ctx.path = path.to_path_buf();
    ctx.set_year(Local::now().year());
    for alias in &opts.aliases {
        ctx.add_account_alias(alias.parse::<AccountAlias>()?);
    }
    let mut journal = parse_file(&mut ctx, text).map_err(|e| e.to_string())?;
    finalise(&mut journal, ctx);
    Ok(journal)
}

fn finalise(journal: &mut Journal, ctx: ParseContext) {
    journal.commodity_styles.extend(ctx.commodity_styles().clone());
    journal.files = ctx.files;
}

/// Parse one file's text, recording the file in the context. Errors are
/// rendered against the context's current path.
fn parse_file(ctx: &mut ParseContext, text: &str) -> Result<Journal, ParseError> {
    ctx.files.push((ctx.path.clone(), text.to_string()));
    let mut journal = Journal::default();
    let mut input = Input::new(text);
    while !input.fragment().is_empty() {
        input = match journal_item(ctx, &mut journal, input) {
            Ok(rest) => rest,
            Err(err) => {
                let file = ctx.path.display().to_string();
                return Err(ParseError::from_nom(&file, err));
            }
        };
    }
    Ok(journal)
}

/// One journal item: a directive, a transaction of some kind, a market
/// price, or a line with nothing to keep. Items that do not match backtrack;
/// fatal errors abort the file.
fn journal_item<'a>(
    ctx: &mut ParseContext,
    journal: &mut Journal,
    input: Input<'a>,
) -> Result<Input<'a>, nom::Err<SyntaxError<'a>>> {
    macro_rules! attempt {
        ($parsed:expr, $into:expr) => {
            match $parsed {
                Ok((rest, value)) => {
                    $into.push(value);
                    return Ok(rest);
                }
                Err(nom::Err::Error(_)) => {}
                Err(other) => return Err(other),
            }
        };
    }

    match directive(ctx, journal, input) {
        Ok(rest) => return Ok(rest),
        Err(nom::Err::Error(_)) => {}
        Err(other) => return Err(other),
    }
    attempt!(transaction(input, ctx), journal.transactions);
    attempt!(modifier_transaction(input, ctx), journal.modifier_transactions);
    attempt!(periodic_transaction(input, ctx), journal.periodic_transactions);
    attempt!(market_price(input, ctx), journal.market_prices);
    match empty_or_comment_line(input) {
        Ok((rest, ())) => return Ok(rest),
        Err(nom::Err::Error(_)) => {}
        Err(other) => return Err(other),
    }

    Err(nom::Err::Error(SyntaxError {
        at: input,
        kind: ErrorKind::Alt,
        label: Some("transaction or directive"),
        message: None,
    }))
}

fn transaction<'a>(input: Input<'a>, ctx: &ParseContext) -> ParseResult<'a, Transaction> {
    let (input, date) = date(input, ctx)?;
    let (input, date2) = opt(preceded(char('='), |i| secondary_date(i, date)))(input)?;
    let (input, _) = peek(satisfy(|c: char| c.is_whitespace()))(input)?;
    let (input, status) = status(input)?;
    let (input, code) = opt(transaction_code)(input)?;
    let (input, description) = description_text(input)?;
    // Tags are kept, but dates in a transaction comment stay plain tags;
    // date overrides are a posting-level feature.
    let (input, (comment, tags, _, _)) = following_comment_and_tags(input, Some(date))?;
    let (input, postings) = posting_lines(input, ctx, Some(date))?;
    let transaction = Transaction {
        date,
        date2,
        status,
        code: code.unwrap_or_default().to_string(),
        description,
        comment,
        tags,
        postings,
    };
    Ok((input, transaction))
}

fn status(input: Input) -> ParseResult<Status> {
    let (input, _) = inline_spaces0(input)?;
    let (input, marker) = opt(one_of("*!"))(input)?;
    let status = match marker {
        Some('*') => Status::Cleared,
        Some('!') => Status::Pending,
        _ => Status::Unmarked,
    };
    Ok((input, status))
}

fn transaction_code(input: Input) -> ParseResult<&str> {
    let (input, _) = inline_spaces0(input)?;
    let (input, code) = delimited(char('('), take_till(|c| c == ')' || c == '\n'), char(')'))(input)?;
    Ok((input, *code.fragment()))
}

fn description_text(input: Input) -> ParseResult<String> {
    let (input, text) = take_till(|c| c == ';' || c == '\n')(input)?;
    Ok((input, text.fragment().trim().to_string()))
}

fn posting_lines<'a>(
    input: Input<'a>,
    ctx: &ParseContext,
    default_date: Option<NaiveDate>,
) -> ParseResult<'a, Vec<Posting>> {
    many0(|i| posting(i, ctx, default_date))(input)
}

/// One indented posting line: status, account, optional amount, optional
/// balance assertion and fixed lot price, trailing comment. Dates found in
/// the comment become the posting's date overrides.
fn posting<'a>(
    input: Input<'a>,
    ctx: &ParseContext,
    default_date: Option<NaiveDate>,
) -> ParseResult<'a, Posting> {
    let (input, _) = inline_spaces1(input)?;
    let (input, status) = status(input)?;
    let (input, _) = inline_spaces0(input)?;
    let (input, name) = modified_account_name(input, ctx)?;
    let kind = PostingKind::from_name(&name);
    let account = account_name_without_kind(&name).to_string();
    let (input, amount) = space_and_amount_or_missing(input, ctx)?;
    let (input, assertion) = opt(preceded(inline_spaces0, |i| balance_assertion(i, ctx)))(input)?;
    let (input, _) = opt(preceded(inline_spaces0, |i| fixed_lot_price(i, ctx)))(input)?;
    let (input, (comment, tags, date, date2)) = following_comment_and_tags(input, default_date)?;
    let posting = Posting {
        status,
        account,
        kind,
        amount,
        assertion,
        comment,
        tags,
        date,
        date2,
    };
    Ok((input, posting))
}

/// `~ PERIOD  DESCRIPTION` plus postings. The period expression is kept as
/// written; expanding it into dates happens downstream.
fn periodic_transaction<'a>(
    input: Input<'a>,
    ctx: &ParseContext,
) -> ParseResult<'a, PeriodicTransaction> {
    let (input, _) = char('~')(input)?;
    let (input, _) = inline_spaces0(input)?;
    let (input, period_expression) = period_expression(input)?;
    let (input, description) = description_text(input)?;
    let (input, (comment, tags, _, _)) = following_comment_and_tags(input, None)?;
    let (input, postings) = posting_lines(input, ctx, None)?;
    let periodic = PeriodicTransaction {
        period_expression,
        description,
        comment,
        tags,
        postings,
    };
    Ok((input, periodic))
}

/// Like an account name, a period expression may contain single spaces; two
/// or more spaces separate it from the description.
fn period_expression(input: Input) -> ParseResult<String> {
    let (input, first) = period_word(input)?;
    let (input, others) = many0(preceded(single_space, period_word))(input)?;
    let mut text = (*first.fragment()).to_string();
    for word in &others {
        text.push(' ');
        text.push_str(word.fragment());
    }
    Ok((input, text))
}

fn period_word(input: Input) -> ParseResult<Input> {
    take_while1(|c: char| c != ';' && !c.is_whitespace())(input)
}

/// `= QUERY` plus posting rules, applied to matched transactions downstream.
fn modifier_transaction<'a>(
    input: Input<'a>,
    ctx: &ParseContext,
) -> ParseResult<'a, ModifierTransaction> {
    let (input, _) = char('=')(input)?;
    let (input, _) = inline_spaces0(input)?;
    let (input, query) = description_text(input)?;
    let (input, _) = following_comment(input)?;
    let (input, postings) = posting_lines(input, ctx, None)?;
    Ok((input, ModifierTransaction { query, postings }))
}

/// `P DATE[TIME] COMMODITY AMOUNT`. A time of day is accepted and dropped.
fn market_price<'a>(input: Input<'a>, ctx: &ParseContext) -> ParseResult<'a, MarketPrice> {
    let (input, _) = char('P')(input)?;
    let (input, _) = inline_spaces1(input)?;
    let (input, date) = alt((map(|i| datetime(i, ctx), |dt| dt.date()), |i| date(i, ctx)))(input)?;
    let (input, _) = inline_spaces1(input)?;
    let (input, symbol) = commodity_symbol(input)?;
    let commodity = symbol.to_string();
    let (input, _) = inline_spaces0(input)?;
    let (input, amount) = amount(input, ctx)?;
    let (input, _) = rest_of_line(input)?;
    let price = MarketPrice {
        date,
        commodity,
        amount,
    };
    Ok((input, price))
}

fn empty_or_comment_line(input: Input) -> ParseResult<()> {
    let (input, _) = inline_spaces0(input)?;
    alt((end_of_line, line_comment))(input)
}

fn line_comment(input: Input) -> ParseResult<()> {
    let (input, _) = one_of(";#*")(input)?;
    let (input, _) = rest_of_line(input)?;
    Ok((input, ()))
}

/// A word-keyword directive line, with an optional ledger-style `!` prefix.
/// Unknown words backtrack so the other item parsers get a turn.
fn directive<'a>(
    ctx: &mut ParseContext,
    journal: &mut Journal,
    input: Input<'a>,
) -> Result<Input<'a>, nom::Err<SyntaxError<'a>>> {
    let start = input;
    let (input, _) = opt(char('!'))(input)?;
    let (input, word) = keyword(input)?;
    match *word.fragment() {
        "include" => include_directive(ctx, journal, input),
        "alias" => alias_directive(ctx, input),
        "account" => account_directive(ctx, journal, input),
        "apply" => apply_account_directive(ctx, input),
        "end" => end_directive(ctx, start, input),
        "commodity" => commodity_directive(ctx, journal, input),
        "Y" | "year" => year_directive(ctx, input),
        "D" => default_commodity_directive(ctx, input),
        "comment" => {
            let (rest, ()) = comment_block(input)?;
            Ok(rest)
        }
        "tag" => {
            let (rest, ()) = tag_directive(input)?;
            Ok(rest)
        }
        "pop" => {
            let (rest, ()) = skipped_line(input)?;
            Ok(rest)
        }
        "N" => {
            let (rest, ()) = ignored_price_commodity_directive(input)?;
            Ok(rest)
        }
        "C" => {
            let (rest, ()) = commodity_conversion_directive(input, ctx)?;
            Ok(rest)
        }
        _ => Err(nom::Err::Error(SyntaxError {
            at: start,
            kind: ErrorKind::Tag,
            label: Some("directive"),
            message: None,
        })),
    }
}

fn keyword(input: Input) -> ParseResult<Input> {
    take_while1(|c: char| c.is_ascii_alphabetic())(input)
}

/// `include PATH`: read and parse another journal file, relative to the one
/// being read. The child inherits a copy of the context; its entries and
/// file records accumulate here, its directives do not.
fn include_directive<'a>(
    ctx: &mut ParseContext,
    journal: &mut Journal,
    input: Input<'a>,
) -> Result<Input<'a>, nom::Err<SyntaxError<'a>>> {
    let (input, _) = inline_spaces1(input)?;
    let at = input;
    let (input, filename) = rest_of_line(input)?;
    let filename = filename.trim_end();
    if filename.is_empty() {
        return Err(fatal(at, "include needs a file path"));
    }

    let path = match ctx.path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join(filename),
        _ => PathBuf::from(filename),
    };
    if path == ctx.path || ctx.include_stack.contains(&path) {
        return Err(fatal(at, format!("cyclic include: {}", path.display())));
    }
    debug!("including {}", path.display());
    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(err) => return Err(fatal(at, format!("could not read {}: {err}", path.display()))),
    };

    let mut child = ctx.clone();
    child.path = path;
    child.include_stack.push(ctx.path.clone());
    child.files = Vec::new();
    match parse_file(&mut child, &text) {
        Ok(included) => merge_journal(journal, included),
        Err(err) => return Err(fatal(at, err.to_string())),
    }
    ctx.files.extend(child.files);
    Ok(input)
}

fn merge_journal(journal: &mut Journal, included: Journal) {
    journal.transactions.extend(included.transactions);
    journal
        .periodic_transactions
        .extend(included.periodic_transactions);
    journal
        .modifier_transactions
        .extend(included.modifier_transactions);
    journal.market_prices.extend(included.market_prices);
    journal.declared_accounts.extend(included.declared_accounts);
    journal.commodity_styles.extend(included.commodity_styles);
}

fn alias_directive<'a>(
    ctx: &mut ParseContext,
    input: Input<'a>,
) -> Result<Input<'a>, nom::Err<SyntaxError<'a>>> {
    let (input, _) = inline_spaces1(input)?;
    let (input, alias) = account_alias(input)?;
    ctx.add_account_alias(alias);
    Ok(input)
}

/// `account NAME` declares an account; its comment tags are kept.
fn account_directive<'a>(
    ctx: &ParseContext,
    journal: &mut Journal,
    input: Input<'a>,
) -> Result<Input<'a>, nom::Err<SyntaxError<'a>>> {
    let (input, _) = inline_spaces1(input)?;
    let (input, name) = modified_account_name(input, ctx)?;
    let (input, (comment, tags, _, _)) = following_comment_and_tags(input, None)?;
    journal.declared_accounts.push(AccountDeclaration {
        name,
        comment,
        tags,
    });
    Ok(input)
}

fn apply_account_directive<'a>(
    ctx: &mut ParseContext,
    input: Input<'a>,
) -> Result<Input<'a>, nom::Err<SyntaxError<'a>>> {
    let (input, _) = inline_spaces1(input)?;
    let (input, _) = tag("account")(input)?;
    let (input, _) = inline_spaces1(input)?;
    let (input, name) = account_name(input)?;
    let (input, _) = rest_of_line(input)?;
    ctx.push_parent_account(name);
    Ok(input)
}

fn end_directive<'a>(
    ctx: &mut ParseContext,
    start: Input<'a>,
    input: Input<'a>,
) -> Result<Input<'a>, nom::Err<SyntaxError<'a>>> {
    let (input, _) = inline_spaces1(input)?;
    let (input, word) = keyword(input)?;
    match *word.fragment() {
        "aliases" => {
            let (input, _) = rest_of_line(input)?;
            ctx.clear_account_aliases();
            Ok(input)
        }
        "apply" => {
            let (input, _) = inline_spaces1(input)?;
            let (input, _) = tag("account")(input)?;
            let (input, _) = rest_of_line(input)?;
            if ctx.pop_parent_account().is_none() {
                return Err(fatal(start, "end of apply-account block with no beginning"));
            }
            Ok(input)
        }
        "tag" => {
            let (input, _) = rest_of_line(input)?;
            Ok(input)
        }
        _ => Err(nom::Err::Error(SyntaxError {
            at: start,
            kind: ErrorKind::Tag,
            label: Some("directive"),
            message: None,
        })),
    }
}

/// `commodity AMOUNT` on one line, or `commodity SYMBOL` followed by
/// indented `format AMOUNT` subdirectives. Declares the display style used
/// to disambiguate later amounts in that commodity.
fn commodity_directive<'a>(
    ctx: &mut ParseContext,
    journal: &mut Journal,
    input: Input<'a>,
) -> Result<Input<'a>, nom::Err<SyntaxError<'a>>> {
    let (input, _) = inline_spaces1(input)?;
    let at = input;
    match amount(input, ctx) {
        Ok((rest, amount)) => {
            require_decimal_mark(at, &amount.style)?;
            let (rest, _) = following_comment(rest)?;
            debug!(
                "commodity {} styled with precision {}",
                amount.commodity, amount.style.precision
            );
            ctx.set_commodity_style(amount.commodity.clone(), amount.style.clone());
            journal.commodity_styles.insert(amount.commodity, amount.style);
            Ok(rest)
        }
        Err(nom::Err::Error(_)) => multiline_commodity_directive(ctx, journal, input),
        Err(other) => Err(other),
    }
}

fn multiline_commodity_directive<'a>(
    ctx: &mut ParseContext,
    journal: &mut Journal,
    input: Input<'a>,
) -> Result<Input<'a>, nom::Err<SyntaxError<'a>>> {
    let (input, symbol) = commodity_symbol(input)?;
    let symbol = symbol.to_string();
    let (mut input, _) = following_comment(input)?;
    let mut style: Option<AmountStyle> = None;
    loop {
        match format_subdirective(ctx, input, &symbol) {
            Ok((rest, found)) => {
                style = Some(found);
                input = rest;
                continue;
            }
            Err(nom::Err::Error(_)) => {}
            Err(other) => return Err(other),
        }
        // other indented subdirective lines are ignored
        match ignored_subdirective(input) {
            Ok((rest, ())) => input = rest,
            Err(_) => break,
        }
    }
    if let Some(style) = style {
        ctx.set_commodity_style(symbol.clone(), style.clone());
        journal.commodity_styles.insert(symbol, style);
    }
    Ok(input)
}

fn format_subdirective<'a>(
    ctx: &ParseContext,
    input: Input<'a>,
    expected: &str,
) -> ParseResult<'a, AmountStyle> {
    let (input, _) = inline_spaces1(input)?;
    let (input, _) = tag("format")(input)?;
    let (input, _) = inline_spaces1(input)?;
    let at = input;
    let (input, amount) = amount(input, ctx)?;
    if amount.commodity != expected {
        return Err(fatal(
            at,
            format!(
                "commodity directive symbol \"{expected}\" and format directive symbol \"{}\" should be the same",
                amount.commodity
            ),
        ));
    }
    require_decimal_mark(at, &amount.style)?;
    let (input, _) = following_comment(input)?;
    Ok((input, amount.style))
}

fn ignored_subdirective(input: Input) -> ParseResult<()> {
    let (input, _) = inline_spaces1(input)?;
    let (input, _) = rest_of_line(input)?;
    Ok((input, ()))
}

fn require_decimal_mark<'a>(
    at: Input<'a>,
    style: &AmountStyle,
) -> Result<(), nom::Err<SyntaxError<'a>>> {
    if style.decimal_mark.is_none() {
        return Err(fatal(
            at,
            "please include a decimal separator in the commodity directive's amount",
        ));
    }
    Ok(())
}

/// `Y`/`year` sets the default year for partial dates. Four or more digits.
fn year_directive<'a>(
    ctx: &mut ParseContext,
    input: Input<'a>,
) -> Result<Input<'a>, nom::Err<SyntaxError<'a>>> {
    let (input, _) = inline_spaces0(input)?;
    let at = input;
    let (input, word) = context("year", take_while1(|c: char| !c.is_whitespace()))(input)?;
    let text = *word.fragment();
    let year = match text.parse::<i32>() {
        Ok(year) if text.len() >= 4 && text.chars().all(|c| c.is_ascii_digit()) => year,
        _ => return Err(fatal(at, format!("bad year number: {text}"))),
    };
    let (input, _) = rest_of_line(input)?;
    ctx.set_year(year);
    Ok(input)
}

/// `D AMOUNT` sets the default commodity and style for no-symbol amounts.
fn default_commodity_directive<'a>(
    ctx: &mut ParseContext,
    input: Input<'a>,
) -> Result<Input<'a>, nom::Err<SyntaxError<'a>>> {
    let (input, _) = inline_spaces1(input)?;
    let at = input;
    let (input, amount) = amount(input, ctx)?;
    require_decimal_mark(at, &amount.style)?;
    let (input, _) = rest_of_line(input)?;
    debug!(
        "default commodity {} with precision {}",
        amount.commodity, amount.style.precision
    );
    ctx.set_default_commodity_and_style(amount.commodity, amount.style);
    Ok(input)
}

/// `comment` ... `end comment`: everything in between is dropped. An
/// unterminated block runs to end of input.
fn comment_block(input: Input) -> ParseResult<()> {
    let (mut input, _) = rest_of_line(input)?;
    loop {
        if input.fragment().is_empty() {
            return Ok((input, ()));
        }
        if let Ok((rest, _)) = end_comment_line(input) {
            return Ok((rest, ()));
        }
        let (rest, _) = rest_of_line(input)?;
        input = rest;
    }
}

fn end_comment_line(input: Input) -> ParseResult<()> {
    let (input, _) = tag("end comment")(input)?;
    let (input, _) = rest_of_line(input)?;
    Ok((input, ()))
}

fn tag_directive(input: Input) -> ParseResult<()> {
    let (input, _) = inline_spaces1(input)?;
    let (input, _) = take_while1(|c: char| !c.is_whitespace())(input)?;
    let (input, _) = rest_of_line(input)?;
    Ok((input, ()))
}

fn skipped_line(input: Input) -> ParseResult<()> {
    let (input, _) = rest_of_line(input)?;
    Ok((input, ()))
}

/// `N SYMBOL`, accepted for ledger compatibility and ignored.
fn ignored_price_commodity_directive(input: Input) -> ParseResult<()> {
    let (input, _) = inline_spaces1(input)?;
    let (input, _) = commodity_symbol(input)?;
    let (input, _) = rest_of_line(input)?;
    Ok((input, ()))
}

/// `C AMOUNT1 = AMOUNT2`, accepted for ledger compatibility and ignored.
fn commodity_conversion_directive<'a>(
    input: Input<'a>,
    ctx: &ParseContext,
) -> ParseResult<'a, ()> {
    let (input, _) = inline_spaces1(input)?;
    let (input, _) = amount(input, ctx)?;
    let (input, _) = inline_spaces0(input)?;
    let (input, _) = char('=')(input)?;
    let (input, _) = inline_spaces0(input)?;
    let (input, _) = amount(input, ctx)?;
    let (input, _) = rest_of_line(input)?;
    Ok((input, ()))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::journal::Tag;

    fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn tag_pair(name: &str, value: &str) -> Tag {
        Tag {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn parses_a_small_journal() {
        let text = "\
2024/1/5 * (123) grocery store  ; memo: weekly
    expenses:food    $45.00
    assets:checking

2024/1/6 ! coffee
    expenses:coffee    $4.50 @ €0.90
    ! assets:cash
";
        let journal = parse_journal(text).unwrap();
        assert_eq!(journal.transactions.len(), 2);

        let t = &journal.transactions[0];
        assert_eq!(t.date, ymd(2024, 1, 5));
        assert_eq!(t.status, Status::Cleared);
        assert_eq!(t.code, "123");
        assert_eq!(t.description, "grocery store");
        assert_eq!(t.comment, "memo: weekly");
        assert_eq!(t.tags, vec![tag_pair("memo", "weekly")]);
        assert_eq!(t.postings.len(), 2);
        assert_eq!(t.postings[0].account, "expenses:food");
        assert_eq!(t.postings[0].amount.as_ref().unwrap().to_string(), "$45.00");
        assert!(t.postings[1].amount.is_none());

        let t = &journal.transactions[1];
        assert_eq!(t.status, Status::Pending);
        assert_eq!(
            t.postings[0].amount.as_ref().unwrap().to_string(),
            "$4.50 @ €0.90"
        );
        assert_eq!(t.postings[1].status, Status::Pending);
        assert_eq!(t.postings[1].account, "assets:cash");
    }

    #[test]
    fn secondary_dates_take_the_primary_year() {
        let journal = parse_journal("2024/1/1=1/15 x\n    a  $1.00\n    b\n").unwrap();
        assert_eq!(journal.transactions[0].date2, Some(ymd(2024, 1, 15)));
    }

    #[test]
    fn year_directive_enables_partial_dates() {
        let journal = parse_journal("Y 2021\n\n3/15 lunch\n    expenses  $1.00\n    assets\n").unwrap();
        assert_eq!(journal.transactions[0].date, ymd(2021, 3, 15));
    }

    #[test]
    fn bad_year_number_is_fatal() {
        let err = parse_journal("Y 21\n").unwrap_err();
        assert_eq!(err.message, "bad year number: 21");
    }

    #[test]
    fn default_commodity_styles_bare_amounts() {
        let journal =
            parse_journal("D $1,000.00\n\n2024/1/1 x\n    a  2500\n    b\n").unwrap();
        let amount = journal.transactions[0].postings[0].amount.as_ref().unwrap();
        assert_eq!(amount.to_string(), "$2,500.00");
    }

    #[test]
    fn commodity_directive_declares_a_style() {
        let journal = parse_journal("commodity $1,000.00\n").unwrap();
        assert_eq!(journal.commodity_styles["$"].precision, 2);

        let journal = parse_journal("commodity USD\n  format 1,000.00 USD\n").unwrap();
        let style = &journal.commodity_styles["USD"];
        assert_eq!(style.precision, 2);
        assert_eq!(style.digit_groups.as_ref().unwrap().separator, ',');
    }

    #[test]
    fn format_symbol_must_match_the_directive() {
        let err = parse_journal("commodity USD\n  format 1.000,00 EUR\n").unwrap_err();
        assert_eq!(
            err.message,
            "commodity directive symbol \"USD\" and format directive symbol \"EUR\" should be the same"
        );
    }

    #[test]
    fn commodity_directives_need_a_decimal_mark() {
        let err = parse_journal("commodity $1000\n").unwrap_err();
        assert!(err.message.contains("decimal separator"));
    }

    #[test]
    fn aliases_rewrite_posting_accounts() {
        let text = "alias checking = assets:bank:checking\n\n2024/1/1 x\n    checking  $1.00\n    food\n";
        let journal = parse_journal(text).unwrap();
        assert_eq!(
            journal.transactions[0].postings[0].account,
            "assets:bank:checking"
        );
        assert_eq!(journal.transactions[0].postings[1].account, "food");

        let text = "alias a = b\nend aliases\n\n2024/1/1 x\n    a  $1.00\n    c\n";
        let journal = parse_journal(text).unwrap();
        assert_eq!(journal.transactions[0].postings[0].account, "a");
    }

    #[test]
    fn apply_account_prefixes_until_ended() {
        let text = "\
apply account home
2024/1/1 x
    food  $1.00
    cash
end apply account
2024/1/1 y
    food  $2.00
    cash
";
        let journal = parse_journal(text).unwrap();
        assert_eq!(journal.transactions[0].postings[0].account, "home:food");
        assert_eq!(journal.transactions[0].postings[1].account, "home:cash");
        assert_eq!(journal.transactions[1].postings[0].account, "food");
    }

    #[test]
    fn apply_account_blocks_nest_outermost_first() {
        let text = "\
apply account home
apply account food
2024/1/1 x
    lunch  $1.00
    cash
end apply account
2024/1/2 y
    lunch  $2.00
    cash
end apply account
2024/1/3 z
    lunch  $3.00
    cash
";
        let journal = parse_journal(text).unwrap();
        let account = |t: usize| journal.transactions[t].postings[0].account.as_str();
        assert_eq!(account(0), "home:food:lunch");
        assert_eq!(account(1), "home:lunch");
        assert_eq!(account(2), "lunch");
    }

    #[test]
    fn unbalanced_end_apply_account_is_fatal() {
        let err = parse_journal("end apply account\n").unwrap_err();
        assert_eq!(err.message, "end of apply-account block with no beginning");
        assert_eq!(err.line, 1);
        assert_eq!(err.column, 1);
    }

    #[test]
    fn posting_comments_override_posting_dates() {
        let text = "2024/1/1 x\n    a  $1.00  ; date:1/5, date2:2024/2/2\n    b\n";
        let journal = parse_journal(text).unwrap();
        let p = &journal.transactions[0].postings[0];
        assert_eq!(p.date, Some(ymd(2024, 1, 5)));
        assert_eq!(p.date2, Some(ymd(2024, 2, 2)));
        assert_eq!(journal.transactions[0].postings[1].date, None);
    }

    #[test]
    fn virtual_postings_keep_their_kind() {
        let journal = parse_journal("2024/1/1 x\n    (food)  $1.00\n    [assets]  $2.00\n").unwrap();
        let postings = &journal.transactions[0].postings;
        assert_eq!(postings[0].kind, PostingKind::Virtual);
        assert_eq!(postings[0].account, "food");
        assert_eq!(postings[1].kind, PostingKind::BalancedVirtual);
        assert_eq!(postings[1].account, "assets");
    }

    #[test]
    fn balance_assertions_and_lot_prices() {
        let journal = parse_journal("2024/1/1 x\n    a  $1.00 = $5.00\n    b  1 FOO {=$1.10}\n").unwrap();
        let postings = &journal.transactions[0].postings;
        let assertion = postings[0].assertion.as_ref().unwrap();
        assert_eq!(assertion.amount.to_string(), "$5.00");
        assert!(!assertion.total);
        assert_eq!(postings[1].amount.as_ref().unwrap().to_string(), "1 FOO");
        assert!(postings[1].assertion.is_none());
    }

    #[test]
    fn market_prices_with_and_without_times() {
        let text = "P 2024/1/1 € $1.35\nP 2024/1/2 12:00:00 \"DKK 2001\" 5.00 USD\n";
        let journal = parse_journal(text).unwrap();
        assert_eq!(journal.market_prices.len(), 2);
        assert_eq!(journal.market_prices[0].commodity, "€");
        assert_eq!(journal.market_prices[0].amount.to_string(), "$1.35");
        assert_eq!(journal.market_prices[1].date, ymd(2024, 1, 2));
        assert_eq!(journal.market_prices[1].commodity, "DKK 2001");
    }

    #[test]
    fn periodic_and_modifier_transactions() {
        let text = "\
~ monthly  set budget
    expenses:food  $400.00
    assets

= expenses:gifts
    budget:gifts  *-1
    assets
";
        let journal = parse_journal(text).unwrap();
        let p = &journal.periodic_transactions[0];
        assert_eq!(p.period_expression, "monthly");
        assert_eq!(p.description, "set budget");
        assert_eq!(p.postings.len(), 2);

        let m = &journal.modifier_transactions[0];
        assert_eq!(m.query, "expenses:gifts");
        assert!(m.postings[0].amount.as_ref().unwrap().is_multiplier);
    }

    #[test]
    fn comment_blocks_and_comment_lines_are_skipped() {
        let text = "\
# a file comment
; another
* and another
comment
2024/9/9 this is not parsed
end comment
2024/1/1 x
    a  $1.00
    b
";
        let journal = parse_journal(text).unwrap();
        assert_eq!(journal.transactions.len(), 1);
        assert_eq!(journal.transactions[0].date, ymd(2024, 1, 1));
    }

    #[test]
    fn account_directives_are_recorded() {
        let journal = parse_journal("account assets:bank  ; type: asset\n").unwrap();
        let declared = &journal.declared_accounts[0];
        assert_eq!(declared.name, "assets:bank");
        assert_eq!(declared.tags, vec![tag_pair("type", "asset")]);
    }

    #[test]
    fn ignored_ledger_directives_are_accepted() {
        let text = "N $\nC 1.00 Kb = 1024 bytes\ntag project\npop\n2024/1/1 x\n    a  $1.00\n    b\n";
        let journal = parse_journal(text).unwrap();
        assert_eq!(journal.transactions.len(), 1);
    }

    #[test]
    fn errors_carry_file_line_and_column() {
        let err = parse_journal("2016/1/32 oops\n").unwrap_err();
        assert_eq!(err.to_string(), "(string):1:1:\nbad date: 2016/1/32");

        let err = parse_journal("3/4 x\n").unwrap_err();
        assert!(err.message.contains("the current year is unknown"));
    }

    #[test]
    fn unrecognized_lines_name_their_position() {
        let err = parse_journal("2024/1/1 ok\n    a  $1.00\n    b\nnonsense here\n").unwrap_err();
        assert_eq!(err.line, 4);
        assert!(err.message.contains("transaction or directive"));
    }

    #[test]
    fn includes_pull_in_other_files() {
        let dir = std::env::temp_dir();
        let child = dir.join("journal_read_include_child.journal");
        std::fs::write(&child, "2024/1/2 child\n    a  $1.00\n    b\n").unwrap();

        let parent = dir.join("journal_read_include_parent.journal");
        let text = "include journal_read_include_child.journal\n2024/1/3 parent\n    c  $2.00\n    d\n";
        let journal = read_journal(&InputOpts::default(), &parent, text).unwrap();
        assert_eq!(journal.transactions.len(), 2);
        assert_eq!(journal.transactions[0].description, "child");
        assert_eq!(journal.files.len(), 2);
        assert_eq!(journal.files[0].0, parent);
        assert_eq!(journal.files[1].0, child);

        std::fs::remove_file(&child).ok();
    }

    #[test]
    fn included_directives_do_not_leak_out() {
        let dir = std::env::temp_dir();
        let child = dir.join("journal_read_isolation_child.journal");
        std::fs::write(&child, "Y 1999\n3/4 inner\n    a  $1.00\n    b\n").unwrap();

        let parent = dir.join("journal_read_isolation_parent.journal");
        let text = "Y 2024\ninclude journal_read_isolation_child.journal\n3/5 outer\n    c  $1.00\n    d\n";
        let journal = read_journal(&InputOpts::default(), &parent, text).unwrap();
        assert_eq!(journal.transactions[0].date, ymd(1999, 3, 4));
        assert_eq!(journal.transactions[1].date, ymd(2024, 3, 5));

        std::fs::remove_file(&child).ok();
    }

    #[test]
    fn include_cycles_are_fatal() {
        let dir = std::env::temp_dir();
        let path = dir.join("journal_read_cycle.journal");
        let text = "include journal_read_cycle.journal\n";
        let err = read_journal(&InputOpts::default(), &path, text).unwrap_err();
        assert!(err.contains("cyclic include"));
    }

    #[test]
    fn option_aliases_are_applied() {
        let opts = InputOpts {
            aliases: vec!["food = expenses:food".to_string()],
            ..InputOpts::default()
        };
        let text = "2024/1/1 x\n    food  $1.00\n    cash\n";
        let journal = read_journal(&opts, Path::new("t.journal"), text).unwrap();
        assert_eq!(journal.transactions[0].postings[0].account, "expenses:food");
    }

    #[test]
    fn reader_descriptor_names_the_format() {
        let r = reader();
        assert_eq!(r.format, "journal");
        assert!(r.extensions.contains(&"journal"));
        assert!(!r.experimental);
        let journal = (r.parse)(&InputOpts::default(), Path::new("t.journal"), "").unwrap();
        assert!(journal.transactions.is_empty());
        assert_eq!(journal.files.len(), 1);
    }

    #[test]
    fn parse_value_runs_bare_parsers() {
        let amount = parse_value(
            |i| amount(i, &ParseContext::default()),
            "$47.18",
        )
        .unwrap();
        assert_eq!(amount.to_string(), "$47.18");

        let err = parse_value(|i| date(i, &ParseContext::default()), "nope").unwrap_err();
        assert!(err.message.contains("expecting date"));
    }
}
