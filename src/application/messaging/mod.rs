//! Command handling - tokenizing, grammar matching and event routing

pub mod dispatcher;
pub mod parser;
pub mod tokenizer;

pub use dispatcher::{DispatchReport, Router, Worker};
pub use parser::{converters, CommandParser, ParseResult, ParsedCommand, SubcommandSpec, Value};
pub use tokenizer::{quote, tokenize};
