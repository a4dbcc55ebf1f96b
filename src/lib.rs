//! Parsers for plain text accounting journal files.
//!
//! A journal is parsed top to bottom with a [`ParseContext`] carrying the
//! state that earlier lines establish for later ones: the default year,
//! account aliases, parent accounts, and the per-commodity display styles
//! that settle how ambiguous numbers read. [`read_journal`] is the full
//! pipeline; [`parse_journal`] parses bare text with no options and no
//! default year.

pub mod amount;
pub mod comment;
pub mod context;
pub mod date;
pub mod error;
pub mod journal;
mod number;
pub mod options;
pub mod reader;
mod util;

pub use crate::amount::{Amount, AmountStyle, BalanceAssertion, DigitGroupStyle, Price, Side};
pub use crate::context::{AccountAlias, ParseContext};
pub use crate::error::ParseError;
pub use crate::journal::{
    AccountDeclaration, Journal, MarketPrice, ModifierTransaction, PeriodicTransaction, Posting,
    PostingKind, Status, Tag, Transaction,
};
pub use crate::options::InputOpts;
pub use crate::reader::{parse_journal, parse_value, read_journal, reader, Reader};
