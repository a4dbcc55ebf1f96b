use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;

use nom::{
    branch::alt, bytes::complete::take_while1, character::complete::char, multi::many0,
    sequence::preceded,
};
use regex::{Captures, Regex, RegexBuilder};

use crate::amount::AmountStyle;
use crate::error::{fatal, Input, ParseResult};
use crate::journal::{
    account_name_with_kind, account_name_without_kind, concat_account_names, join_account_names,
    PostingKind,
};
use crate::util::{inline_spaces0, rest_of_line, single_space};

/// Mutable state threaded through the parse of one file: defaults that
/// directives establish and later lines consult. An included file inherits a
/// copy; only accumulated results flow back out.
#[derive(Debug, Clone, Default)]
pub struct ParseContext {
    default_year: Option<i32>,
    default_commodity: Option<(String, AmountStyle)>,
    commodity_styles: HashMap<String, AmountStyle>,
    /// Most recently declared first.
    aliases: Vec<AccountAlias>,
    /// Outermost `apply account` first; the innermost block is last.
    parent_accounts: Vec<String>,
    /// The file currently being parsed, for error reporting.
    pub path: PathBuf,
    /// Contents of every file read so far, top-level file first.
    pub files: Vec<(PathBuf, String)>,
    /// Paths of enclosing `include` directives, for cycle detection.
    pub include_stack: Vec<PathBuf>,
}

impl ParseContext {
    pub fn set_year(&mut self, year: i32) {
        self.default_year = Some(year);
    }

    pub fn year(&self) -> Option<i32> {
        self.default_year
    }

    pub fn set_default_commodity_and_style(
        &mut self,
        symbol: impl Into<String>,
        style: AmountStyle,
    ) {
        self.default_commodity = Some((symbol.into(), style));
    }

    pub fn default_commodity(&self) -> Option<(&str, &AmountStyle)> {
        self.default_commodity
            .as_ref()
            .map(|(symbol, style)| (symbol.as_str(), style))
    }

    pub fn set_commodity_style(&mut self, symbol: impl Into<String>, style: AmountStyle) {
        self.commodity_styles.insert(symbol.into(), style);
    }

    pub fn commodity_styles(&self) -> &HashMap<String, AmountStyle> {
        &self.commodity_styles
    }

    /// The style declared for `symbol`, else the default commodity's style
    /// whatever its symbol.
    pub fn amount_style(&self, symbol: &str) -> Option<&AmountStyle> {
        self.commodity_styles
            .get(symbol)
            .or_else(|| self.default_commodity.as_ref().map(|(_, style)| style))
    }

    pub fn push_parent_account(&mut self, name: impl Into<String>) {
        self.parent_accounts.push(name.into());
    }

    /// Pops the innermost parent account. `None` means the stack was empty,
    /// which callers report as a fatal unbalanced-block error.
    pub fn pop_parent_account(&mut self) -> Option<String> {
        self.parent_accounts.pop()
    }

    /// The active `apply account` prefix: the stack joined outermost first.
    pub fn parent_account(&self) -> String {
        concat_account_names(self.parent_accounts.iter().map(String::as_str))
    }

    pub fn add_account_alias(&mut self, alias: AccountAlias) {
        self.aliases.insert(0, alias);
    }

    pub fn clear_account_aliases(&mut self) {
        self.aliases.clear();
    }

    /// Rewrite `name` through every active alias, most recent first. All
    /// matching aliases apply in turn, so rewrites can chain. Virtual-posting
    /// punctuation survives the rewrite.
    pub fn apply_aliases(&self, name: &str) -> String {
        let kind = PostingKind::from_name(name);
        let mut bare = account_name_without_kind(name).to_string();
        for alias in &self.aliases {
            bare = alias.apply(&bare);
        }
        account_name_with_kind(kind, bare)
    }
}

/// An account rename rule from an `alias` directive or the command line.
#[derive(Debug, Clone)]
pub enum AccountAlias {
    /// `alias OLD = NEW`: replaces OLD when it is the whole account name or
    /// a prefix of it ending at a `:` boundary.
    Basic { old: String, new: String },
    /// `alias /RE/ = REPL`: case-insensitive regex replacement over the
    /// whole name, with `\N` group references in the replacement.
    Regex {
        pattern: Regex,
        replacement: String,
    },
}

impl AccountAlias {
    fn apply(&self, name: &str) -> String {
        match self {
            AccountAlias::Basic { old, new } => {
                let tail_at_boundary = name
                    .strip_prefix(old.as_str())
                    .map_or(false, |rest| rest.starts_with(':'));
                if name == old {
                    new.clone()
                } else if tail_at_boundary {
                    format!("{new}{}", &name[old.len()..])
                } else {
                    name.to_string()
                }
            }
            AccountAlias::Regex {
                pattern,
                replacement,
            } => pattern
                .replace_all(name, |caps: &Captures| expand_replacement(caps, replacement))
                .into_owned(),
        }
    }
}

impl FromStr for AccountAlias {
    type Err = String;

    /// Parses an alias given as a plain string, as from the command line.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        account_alias(Input::new(text))
            .map(|(_, alias)| alias)
            .map_err(|_| format!("could not parse account alias: {text}"))
    }
}

/// Substitute `\0`..`\9` group references; `\\` escapes a backslash.
fn expand_replacement(caps: &Captures, replacement: &str) -> String {
    let mut out = String::with_capacity(replacement.len());
    let mut chars = replacement.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(digit) if digit.is_ascii_digit() => {
                let index = digit as usize - '0' as usize;
                if let Some(group) = caps.get(index) {
                    out.push_str(group.as_str());
                }
            }
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// The body of an `alias` directive: `OLD = NEW` or `/REGEX/ = REPLACEMENT`.
/// Consumes the rest of the line.
pub fn account_alias(input: Input) -> ParseResult<AccountAlias> {
    alt((regex_alias, basic_alias))(input)
}

fn basic_alias(input: Input) -> ParseResult<AccountAlias> {
    let (input, old) = take_while1(|c| c != '=' && c != '\n' && c != '\r')(input)?;
    let (input, _) = char('=')(input)?;
    let (input, _) = inline_spaces0(input)?;
    let (input, new) = rest_of_line(input)?;
    let alias = AccountAlias::Basic {
        old: old.fragment().trim_end().to_string(),
        new: new.trim_end().to_string(),
    };
    Ok((input, alias))
}

fn regex_alias(input: Input) -> ParseResult<AccountAlias> {
    let (input, _) = char('/')(input)?;
    let (input, pattern) = take_while1(|c| c != '/' && c != '\n' && c != '\r')(input)?;
    let (input, _) = char('/')(input)?;
    let (input, _) = inline_spaces0(input)?;
    let (input, _) = char('=')(input)?;
    let (input, _) = inline_spaces0(input)?;
    let (input, replacement) = rest_of_line(input)?;

    let compiled = RegexBuilder::new(pattern.fragment())
        .case_insensitive(true)
        .build()
        .map_err(|err| fatal(pattern, format!("invalid account alias regexp: {err}")))?;
    let alias = AccountAlias::Regex {
        pattern: compiled,
        replacement: replacement.trim_end().to_string(),
    };
    Ok((input, alias))
}

/// An account name: non-space runs joined by single spaces. Two or more
/// spaces, or end of line, end the name.
pub fn account_name(input: Input) -> ParseResult<String> {
    let (input, first) = name_part(input)?;
    let (input, others) = many0(preceded(single_space, name_part))(input)?;

    let mut name = (*first.fragment()).to_string();
    for part in &others {
        name.push(' ');
        name.push_str(part.fragment());
    }
    Ok((input, name))
}

fn name_part(input: Input) -> ParseResult<Input> {
    take_while1(|c: char| !c.is_whitespace())(input)
}

/// Parse an account name, prefix it with the active parent account, then
/// apply the alias rules.
pub fn modified_account_name<'a>(
    input: Input<'a>,
    ctx: &ParseContext,
) -> ParseResult<'a, String> {
    let (input, name) = account_name(input)?;
    let name = join_account_names(&ctx.parent_account(), &name);
    Ok((input, ctx.apply_aliases(&name)))
}
