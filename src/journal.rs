use std::collections::HashMap;
use std::path::PathBuf;

use chrono::NaiveDate;

use crate::amount::{Amount, AmountStyle, BalanceAssertion};

/// The parsed representation of one or more journal files. Cross-file
/// verification (balance assertions, auto posting application) happens in a
/// later pass, not here.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    pub transactions: Vec<Transaction>,
    pub periodic_transactions: Vec<PeriodicTransaction>,
    pub modifier_transactions: Vec<ModifierTransaction>,
    pub market_prices: Vec<MarketPrice>,
    pub declared_accounts: Vec<AccountDeclaration>,
    pub commodity_styles: HashMap<String, AmountStyle>,
    /// Every file contributing to this journal, top-level file first.
    pub files: Vec<(PathBuf, String)>,
}

/// Cleared state marker following the date: '*' cleared, '!' pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    #[default]
    Unmarked,
    Pending,
    Cleared,
}

/// A `name:value` annotation from a comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub name: String,
    pub value: String,
}

/// One dated entry with its postings.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub date: NaiveDate,
    pub date2: Option<NaiveDate>,
    pub status: Status,
    pub code: String,
    pub description: String,
    pub comment: String,
    pub tags: Vec<Tag>,
    pub postings: Vec<Posting>,
}

impl Transaction {
    /// The description before a `|` separator, or all of it.
    pub fn payee(&self) -> &str {
        match self.description.split_once('|') {
            Some((payee, _)) => payee.trim_end(),
            None => self.description.as_str(),
        }
    }

    /// The description after a `|` separator, or all of it.
    pub fn note(&self) -> &str {
        match self.description.split_once('|') {
            Some((_, note)) => note.trim_start(),
            None => self.description.as_str(),
        }
    }
}

/// One account/amount line within a transaction. `account` holds the bare
/// name; virtual-posting parens or brackets are recorded in `kind`.
#[derive(Debug, Clone)]
pub struct Posting {
    pub status: Status,
    pub account: String,
    pub kind: PostingKind,
    pub amount: Option<Amount>,
    pub assertion: Option<BalanceAssertion>,
    pub comment: String,
    pub tags: Vec<Tag>,
    /// Posting-level date overrides from `date:`/`date2:` tags or bracketed
    /// dates in the comment.
    pub date: Option<NaiveDate>,
    pub date2: Option<NaiveDate>,
}

/// A `~ PERIOD` rule for generating recurring transactions downstream. The
/// period expression is kept as written.
#[derive(Debug, Clone)]
pub struct PeriodicTransaction {
    pub period_expression: String,
    pub description: String,
    pub comment: String,
    pub tags: Vec<Tag>,
    pub postings: Vec<Posting>,
}

/// An `= QUERY` auto posting rule, applied downstream when enabled.
#[derive(Debug, Clone)]
pub struct ModifierTransaction {
    pub query: String,
    pub postings: Vec<Posting>,
}

/// A `P DATE COMMODITY AMOUNT` market price declaration.
#[derive(Debug, Clone)]
pub struct MarketPrice {
    pub date: NaiveDate,
    pub commodity: String,
    pub amount: Amount,
}

/// An `account` directive: declares the account and keeps its comment tags.
#[derive(Debug, Clone)]
pub struct AccountDeclaration {
    pub name: String,
    pub comment: String,
    pub tags: Vec<Tag>,
}

/// How a posting participates in balancing, encoded in the account name's
/// surrounding punctuation: `(a)` virtual, `[a]` balanced virtual.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PostingKind {
    #[default]
    Regular,
    Virtual,
    BalancedVirtual,
}

impl PostingKind {
    pub fn from_name(name: &str) -> PostingKind {
        if name.len() >= 2 {
            if name.starts_with('(') && name.ends_with(')') {
                return PostingKind::Virtual;
            }
            if name.starts_with('[') && name.ends_with(']') {
                return PostingKind::BalancedVirtual;
            }
        }
        PostingKind::Regular
    }
}

/// The account name with any virtual-posting punctuation removed.
pub fn account_name_without_kind(name: &str) -> &str {
    match PostingKind::from_name(name) {
        PostingKind::Regular => name,
        _ => &name[1..name.len() - 1],
    }
}

/// Wrap a bare account name back in its virtual-posting punctuation.
pub fn account_name_with_kind(kind: PostingKind, name: String) -> String {
    match kind {
        PostingKind::Regular => name,
        PostingKind::Virtual => format!("({name})"),
        PostingKind::BalancedVirtual => format!("[{name}]"),
    }
}

/// Join account names with the `:` separator, skipping empty ones. Any
/// virtual-posting punctuation moves to surround the joined whole; the first
/// non-regular kind wins.
pub fn concat_account_names<'a, I>(names: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut kind = PostingKind::Regular;
    let mut joined = String::new();
    for name in names {
        if name.is_empty() {
            continue;
        }
        if kind == PostingKind::Regular {
            kind = PostingKind::from_name(name);
        }
        if !joined.is_empty() {
            joined.push(':');
        }
        joined.push_str(account_name_without_kind(name));
    }
    account_name_with_kind(kind, joined)
}

/// Prefix `name` with `parent`, keeping virtual-posting punctuation on the
/// outside of the result.
pub fn join_account_names(parent: &str, name: &str) -> String {
    concat_account_names([parent, name])
}
