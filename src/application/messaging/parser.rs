//! Command grammar engine
//!
//! A [`CommandParser`] holds a set of [`SubcommandSpec`]s and matches
//! tokenized command text against them. Options always precede positional
//! arguments, take their value inline (`-n5`) and are never grouped. A
//! leading dash can be escaped (`\-x`) to force a positional token.

use super::tokenizer::tokenize;
use crate::application::errors::{ConversionError, GrammarError};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A converted argument or option value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Optional argument or valued option that was not supplied.
    None,
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<Value>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> bool {
        matches!(self, Value::Bool(true))
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Str(s) => write!(f, "{}", s),
            Value::List(items) => {
                let parts: Vec<String> = items.iter().map(Value::to_string).collect();
                write!(f, "{}", parts.join(" "))
            }
        }
    }
}

/// Typed converter from a raw token
pub type Converter = Arc<dyn Fn(&str) -> Result<Value, ConversionError> + Send + Sync>;

/// Stock converters
pub mod converters {
    use super::{Converter, Value};
    use crate::application::errors::ConversionError;
    use std::sync::Arc;

    pub fn string() -> Converter {
        Arc::new(|s: &str| Ok(Value::Str(s.to_string())))
    }

    pub fn integer() -> Converter {
        Arc::new(|s: &str| {
            s.parse::<i64>()
                .map(Value::Int)
                .map_err(|e| ConversionError::new(s, e.to_string()))
        })
    }

    /// Like [`integer`], but the empty string (a bare option) is accepted
    /// and yields [`Value::None`].
    pub fn optional_integer() -> Converter {
        let inner = integer();
        Arc::new(move |s: &str| if s.is_empty() { Ok(Value::None) } else { inner(s) })
    }

    /// Emoji name, given either bare or wrapped in colons.
    pub fn emoji() -> Converter {
        Arc::new(|s: &str| {
            let name = s.strip_prefix(':').and_then(|t| t.strip_suffix(':')).unwrap_or(s);
            let valid = !name.is_empty()
                && name
                    .chars()
                    .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '+'));
            if valid {
                Ok(Value::Str(name.to_string()))
            } else {
                Err(ConversionError::new(s, "not an emoji name"))
            }
        })
    }
}

/// Grammar of one named subcommand
#[derive(Clone)]
pub struct SubcommandSpec {
    name: String,
    args: Vec<(String, Converter)>,
    opts: Vec<(char, Option<Converter>)>,
    greedy: bool,
    optional: bool,
    description: Option<String>,
}

impl SubcommandSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            opts: Vec::new(),
            greedy: false,
            optional: false,
            description: None,
        }
    }

    /// Append a positional argument.
    pub fn arg(mut self, name: impl Into<String>, converter: Converter) -> Self {
        self.args.push((name.into(), converter));
        self
    }

    /// Declare a boolean flag.
    pub fn flag(mut self, option: char) -> Self {
        self.opts.push((option, None));
        self
    }

    /// Declare an option taking an inline value. The converter receives the
    /// empty string when the option is given bare.
    pub fn opt(mut self, option: char, converter: Converter) -> Self {
        self.opts.push((option, Some(converter)));
        self
    }

    /// The last positional argument absorbs all remaining tokens.
    pub fn greedy(mut self) -> Self {
        self.greedy = true;
        self
    }

    /// The last positional argument may be omitted.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self) -> Result<(), GrammarError> {
        if self.name.trim().is_empty() {
            return Err(GrammarError::EmptyName);
        }
        for (i, (arg, _)) in self.args.iter().enumerate() {
            if self.args[..i].iter().any(|(other, _)| other == arg) {
                return Err(GrammarError::DuplicateArgument {
                    subcommand: self.name.clone(),
                    argument: arg.clone(),
                });
            }
        }
        for (i, (opt, _)) in self.opts.iter().enumerate() {
            if *opt == '-' || opt.is_whitespace() {
                return Err(GrammarError::InvalidOption(*opt));
            }
            if self.opts[..i].iter().any(|(other, _)| other == opt) {
                return Err(GrammarError::DuplicateOption {
                    subcommand: self.name.clone(),
                    option: *opt,
                });
            }
        }
        Ok(())
    }

    fn syntax(&self) -> String {
        let mut parts = vec![self.name.clone()];
        for (opt, converter) in &self.opts {
            match converter {
                None => parts.push(format!("[-{}]", opt)),
                Some(_) => parts.push(format!("[-{}<value>]", opt)),
            }
        }
        let last = self.args.len().saturating_sub(1);
        for (i, (arg, _)) in self.args.iter().enumerate() {
            let is_last = i == last;
            let repeat = if is_last && self.greedy { "..." } else { "" };
            if is_last && self.optional {
                parts.push(format!("[{}{}]", arg, repeat));
            } else {
                parts.push(format!("<{}>{}", arg, repeat));
            }
        }
        parts.join(" ")
    }
}

impl fmt::Debug for SubcommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubcommandSpec")
            .field("syntax", &self.syntax())
            .finish()
    }
}

/// Successfully matched command
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCommand {
    pub name: String,
    /// Every declared option; absent flags are `Bool(false)`, absent valued
    /// options are `None`.
    pub opts: BTreeMap<char, Value>,
    /// Every declared positional argument.
    pub args: BTreeMap<String, Value>,
}

impl ParsedCommand {
    pub fn arg(&self, name: &str) -> &Value {
        self.args.get(name).unwrap_or(&Value::None)
    }

    pub fn opt(&self, option: char) -> &Value {
        self.opts.get(&option).unwrap_or(&Value::None)
    }

    pub fn str_arg(&self, name: &str) -> Option<&str> {
        self.arg(name).as_str()
    }

    pub fn flag(&self, option: char) -> bool {
        self.opt(option).as_bool()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParseResult {
    Matched(ParsedCommand),
    NoMatch,
}

impl ParseResult {
    pub fn matched(self) -> Option<ParsedCommand> {
        match self {
            ParseResult::Matched(cmd) => Some(cmd),
            ParseResult::NoMatch => None,
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, ParseResult::Matched(_))
    }
}

/// Registry of subcommand grammars
#[derive(Debug, Clone, Default)]
pub struct CommandParser {
    subcommands: Vec<SubcommandSpec>,
}

impl CommandParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_subcommand(&mut self, spec: SubcommandSpec) -> Result<(), GrammarError> {
        spec.validate()?;
        if self.get(spec.name()).is_some() {
            return Err(GrammarError::DuplicateSubcommand(spec.name.clone()));
        }
        self.subcommands.push(spec);
        Ok(())
    }

    /// Builder form of [`add_subcommand`](Self::add_subcommand).
    pub fn with(mut self, spec: SubcommandSpec) -> Result<Self, GrammarError> {
        self.add_subcommand(spec)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&SubcommandSpec> {
        self.subcommands.iter().find(|s| s.name == name)
    }

    pub fn subcommands(&self) -> impl Iterator<Item = &SubcommandSpec> {
        self.subcommands.iter()
    }

    /// Usage lines for every subcommand, in registration order.
    pub fn generate_syntax(&self) -> String {
        self.subcommands
            .iter()
            .map(SubcommandSpec::syntax)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn generate_description(&self) -> String {
        self.subcommands
            .iter()
            .filter_map(|s| {
                s.description
                    .as_ref()
                    .map(|d| format!("`{}`: {}", s.syntax(), d))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Match `input` against the registered grammars.
    pub fn parse(&self, input: &str) -> ParseResult {
        let tokens = match tokenize(input) {
            Ok(tokens) => tokens,
            Err(e) => {
                debug!(error = %e, "Tokenizing command failed");
                return ParseResult::NoMatch;
            }
        };
        let Some((first, rest)) = tokens.split_first() else {
            return ParseResult::NoMatch;
        };
        let Some(spec) = self.get(first) else {
            return ParseResult::NoMatch;
        };

        match Self::match_spec(spec, rest) {
            Ok(Some(cmd)) => ParseResult::Matched(cmd),
            Ok(None) => ParseResult::NoMatch,
            Err(e) => {
                debug!(subcommand = %spec.name, error = %e, "Conversion failed");
                ParseResult::NoMatch
            }
        }
    }

    fn match_spec(spec: &SubcommandSpec, tokens: &[String]) -> Result<Option<ParsedCommand>, ConversionError> {
        let mut opts: BTreeMap<char, Value> = spec
            .opts
            .iter()
            .map(|(c, conv)| (*c, if conv.is_some() { Value::None } else { Value::Bool(false) }))
            .collect();

        let mut idx = 0;
        while let Some(token) = tokens.get(idx) {
            if token == "--" {
                idx += 1;
                break;
            }
            let Some(body) = token.strip_prefix('-') else {
                break;
            };
            let mut chars = body.chars();
            let Some(option) = chars.next() else {
                // A lone dash is positional.
                break;
            };
            let inline = chars.as_str();
            match spec.opts.iter().find(|(c, _)| *c == option) {
                None => return Ok(None),
                Some((_, None)) if !inline.is_empty() => return Ok(None),
                Some((_, None)) => {
                    opts.insert(option, Value::Bool(true));
                }
                Some((_, Some(converter))) => {
                    opts.insert(option, converter(inline)?);
                }
            }
            idx += 1;
        }

        let mut positional = tokens[idx..].iter().map(|t| unescape_dash(t));
        let mut args = BTreeMap::new();
        let last = spec.args.len().saturating_sub(1);

        for (i, (name, converter)) in spec.args.iter().enumerate() {
            let is_last = i == last;
            if is_last && spec.greedy {
                let items = positional
                    .by_ref()
                    .map(|t| converter(t))
                    .collect::<Result<Vec<_>, _>>()?;
                if items.is_empty() && !spec.optional {
                    return Ok(None);
                }
                args.insert(name.clone(), Value::List(items));
            } else {
                match positional.next() {
                    Some(token) => {
                        args.insert(name.clone(), converter(token)?);
                    }
                    None if is_last && spec.optional => {
                        args.insert(name.clone(), Value::None);
                    }
                    None => return Ok(None),
                }
            }
        }

        if positional.next().is_some() {
            return Ok(None);
        }

        Ok(Some(ParsedCommand {
            name: spec.name.clone(),
            opts,
            args,
        }))
    }
}

fn unescape_dash(token: &str) -> &str {
    match token.strip_prefix('\\') {
        Some(rest) if rest.starts_with('-') => rest,
        _ => token,
    }
}

#[cfg(test)]
mod tests {
    use super::converters::{emoji, integer, optional_integer, string};
    use super::*;

    fn parser(spec: SubcommandSpec) -> CommandParser {
        CommandParser::new().with(spec).unwrap()
    }

    fn args(result: ParseResult) -> Option<BTreeMap<String, Value>> {
        result.matched().map(|cmd| cmd.args)
    }

    fn s(v: &str) -> Value {
        Value::Str(v.to_string())
    }

    fn map(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn no_subcommands_never_match() {
        assert_eq!(CommandParser::new().parse("some string"), ParseResult::NoMatch);
    }

    #[test]
    fn empty_input_does_not_match() {
        let p = parser(SubcommandSpec::new("test").arg("arg1", string()));
        assert_eq!(p.parse(""), ParseResult::NoMatch);
        assert_eq!(p.parse("   "), ParseResult::NoMatch);
    }

    #[test]
    fn subcommand_without_arguments() {
        let p = parser(SubcommandSpec::new("test1"));
        assert_eq!(args(p.parse("test1")), Some(BTreeMap::new()));
        assert_eq!(p.parse("test1 extra"), ParseResult::NoMatch);
    }

    #[test]
    fn two_string_arguments() {
        let p = parser(SubcommandSpec::new("add").arg("arg1", string()).arg("arg2", string()));
        assert_eq!(
            args(p.parse("add abc def")),
            Some(map(&[("arg1", s("abc")), ("arg2", s("def"))]))
        );
    }

    #[test]
    fn greedy_string_argument() {
        let p = parser(SubcommandSpec::new("add").arg("arg1", string()).greedy());
        assert_eq!(
            args(p.parse("add a b c")),
            Some(map(&[("arg1", Value::List(vec![s("a"), s("b"), s("c")]))]))
        );
        assert_eq!(p.parse("add"), ParseResult::NoMatch);
    }

    #[test]
    fn escaped_dash_is_positional() {
        let p = parser(SubcommandSpec::new("test").flag('a').arg("arg1", string()));
        let cmd = p.parse(r"test -a \\-b").matched().unwrap();
        assert_eq!(cmd.opt('a'), &Value::Bool(true));
        assert_eq!(cmd.arg("arg1"), &s("-b"));

        let cmd = p.parse(r"test \-b").matched().unwrap();
        assert_eq!(cmd.opt('a'), &Value::Bool(false));
        assert_eq!(cmd.arg("arg1"), &s("-b"));
    }

    #[test]
    fn integer_conversion() {
        let p = parser(SubcommandSpec::new("test").arg("arg1", integer()));
        assert_eq!(args(p.parse("test 42")), Some(map(&[("arg1", Value::Int(42))])));
        assert_eq!(p.parse("test abc"), ParseResult::NoMatch);
        assert_eq!(p.parse("test"), ParseResult::NoMatch);
        assert_eq!(p.parse("test 1 2"), ParseResult::NoMatch);
    }

    #[test]
    fn selects_subcommand_by_exact_name() {
        let mut p = CommandParser::new();
        p.add_subcommand(SubcommandSpec::new("test1").arg("arg1", integer())).unwrap();
        p.add_subcommand(SubcommandSpec::new("test2").arg("arg1", string()).arg("arg2", string()))
            .unwrap();
        assert_eq!(p.parse("test1 1").matched().unwrap().name, "test1");
        assert_eq!(p.parse("test2 a b").matched().unwrap().name, "test2");
        assert_eq!(p.parse("testN 1"), ParseResult::NoMatch);
        assert_eq!(p.parse("TEST1 1"), ParseResult::NoMatch);
    }

    #[test]
    fn greedy_integers_fail_as_a_whole() {
        let p = parser(
            SubcommandSpec::new("test")
                .arg("arg1", string())
                .arg("arg2", integer())
                .greedy(),
        );
        assert_eq!(
            args(p.parse("test abc 1 2 3")),
            Some(map(&[
                ("arg1", s("abc")),
                ("arg2", Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]))
            ]))
        );
        assert_eq!(p.parse("test abc 1 a 3"), ParseResult::NoMatch);
    }

    #[test]
    fn optional_last_argument() {
        let p = parser(
            SubcommandSpec::new("test")
                .arg("arg1", string())
                .arg("arg2", integer())
                .optional(),
        );
        assert_eq!(
            args(p.parse("test a")),
            Some(map(&[("arg1", s("a")), ("arg2", Value::None)]))
        );
        assert_eq!(
            args(p.parse("test a 1")),
            Some(map(&[("arg1", s("a")), ("arg2", Value::Int(1))]))
        );
        assert_eq!(p.parse("test a b"), ParseResult::NoMatch);
        assert_eq!(p.parse("test"), ParseResult::NoMatch);
    }

    #[test]
    fn greedy_optional_grows_monotonically() {
        let p = parser(SubcommandSpec::new("cmd").arg("items", string()).greedy().optional());
        let inputs = ["cmd", "cmd a", "cmd a b", "cmd a b c"];
        let expected = ["a", "b", "c"];
        for (n, input) in inputs.iter().enumerate() {
            let cmd = p.parse(input).matched().unwrap();
            let items = cmd.arg("items").as_list().unwrap();
            let want: Vec<Value> = expected[..n].iter().map(|v| s(v)).collect();
            assert_eq!(items, want.as_slice());
        }
    }

    #[test]
    fn required_only_needs_exact_count() {
        let p = parser(SubcommandSpec::new("cmd").arg("a", string()).arg("b", string()));
        assert_eq!(p.parse("cmd x"), ParseResult::NoMatch);
        assert_eq!(p.parse("cmd x y z"), ParseResult::NoMatch);
        let cmd = p.parse("cmd x y").matched().unwrap();
        assert!(cmd.args.values().all(|v| !v.is_none()));
    }

    #[test]
    fn quoted_arguments() {
        let p = parser(SubcommandSpec::new("test").arg("arg1", string()).arg("arg2", string()));
        assert_eq!(p.parse(r#"test "a b" c"#).matched().unwrap().arg("arg1"), &s("a b"));
        assert_eq!(p.parse(r#"test "a \" b" c"#).matched().unwrap().arg("arg1"), &s("a \" b"));
        assert_eq!(p.parse(r#"test 'a \" b' c"#).matched().unwrap().arg("arg1"), &s(r#"a \" b"#));
        assert_eq!(p.parse(r#"test "a b c"#), ParseResult::NoMatch);
        assert_eq!(p.parse(r#"test "a "b" c"#), ParseResult::NoMatch);
    }

    #[test]
    fn valued_options_take_inline_values() {
        let p = parser(
            SubcommandSpec::new("list")
                .opt('n', optional_integer())
                .flag('v')
                .arg("filter", string())
                .optional(),
        );
        let cmd = p.parse("list").matched().unwrap();
        assert_eq!(cmd.opt('n'), &Value::None);
        assert!(!cmd.flag('v'));

        let cmd = p.parse("list -n5 -v foo").matched().unwrap();
        assert_eq!(cmd.opt('n'), &Value::Int(5));
        assert!(cmd.flag('v'));
        assert_eq!(cmd.arg("filter"), &s("foo"));

        let cmd = p.parse("list -n").matched().unwrap();
        assert_eq!(cmd.opt('n'), &Value::None);

        assert_eq!(p.parse("list -nx"), ParseResult::NoMatch);
        assert_eq!(p.parse("list -vv"), ParseResult::NoMatch);
        assert_eq!(p.parse("list -q"), ParseResult::NoMatch);
    }

    #[test]
    fn options_end_at_first_positional() {
        let p = parser(SubcommandSpec::new("t").flag('a').arg("rest", string()).greedy());
        let cmd = p.parse("t x -a").matched().unwrap();
        assert!(!cmd.flag('a'));
        assert_eq!(cmd.arg("rest"), &Value::List(vec![s("x"), s("-a")]));

        let cmd = p.parse("t -- -a").matched().unwrap();
        assert_eq!(cmd.arg("rest"), &Value::List(vec![s("-a")]));

        let cmd = p.parse("t - x").matched().unwrap();
        assert_eq!(cmd.arg("rest"), &Value::List(vec![s("-"), s("x")]));
    }

    #[test]
    fn emoji_converter_accepts_colons() {
        let p = parser(SubcommandSpec::new("react").arg("emoji", emoji()));
        assert_eq!(p.parse("react :check:").matched().unwrap().arg("emoji"), &s("check"));
        assert_eq!(p.parse("react thumbs_up").matched().unwrap().arg("emoji"), &s("thumbs_up"));
        assert_eq!(p.parse("react ::"), ParseResult::NoMatch);
    }

    #[test]
    fn grammar_errors() {
        let mut p = CommandParser::new();
        assert_eq!(p.add_subcommand(SubcommandSpec::new("")), Err(GrammarError::EmptyName));
        p.add_subcommand(SubcommandSpec::new("a")).unwrap();
        assert_eq!(
            p.add_subcommand(SubcommandSpec::new("a")),
            Err(GrammarError::DuplicateSubcommand("a".into()))
        );
        assert!(matches!(
            p.add_subcommand(SubcommandSpec::new("b").arg("x", string()).arg("x", string())),
            Err(GrammarError::DuplicateArgument { .. })
        ));
        assert!(matches!(
            p.add_subcommand(SubcommandSpec::new("c").flag('x').opt('x', integer())),
            Err(GrammarError::DuplicateOption { option: 'x', .. })
        ));
        assert_eq!(
            p.add_subcommand(SubcommandSpec::new("d").flag('-')),
            Err(GrammarError::InvalidOption('-'))
        );
    }

    #[test]
    fn syntax_lines() {
        let mut p = CommandParser::new();
        p.add_subcommand(
            SubcommandSpec::new("add")
                .flag('p')
                .arg("timestamp", string())
                .arg("command", string())
                .greedy(),
        )
        .unwrap();
        p.add_subcommand(SubcommandSpec::new("list").opt('n', optional_integer())).unwrap();
        assert_eq!(
            p.generate_syntax(),
            "add [-p] <timestamp> <command>...\nlist [-n<value>]"
        );
    }
}
