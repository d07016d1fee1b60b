//! Shell-like tokenizer for command text
//!
//! Tokens are separated by unquoted whitespace. A token wrapped in matching
//! single or double quotes keeps its inner whitespace; inside such a token a
//! backslash escapes only the quote character that opened it. Outside quotes
//! `\\`, `\"` and `\'` stand for the escaped character and any other
//! backslash is kept as is, so `\-x` reaches the grammar engine untouched.

use crate::application::errors::TokenizeError;

/// Split `input` into tokens.
pub fn tokenize(input: &str) -> Result<Vec<String>, TokenizeError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        if c == '"' || c == '\'' {
            chars.next();
            let mut token = String::new();
            let mut closed = false;
            while let Some((_, ch)) = chars.next() {
                if ch == c {
                    closed = true;
                    break;
                }
                if ch == '\\' {
                    if let Some(&(_, next)) = chars.peek() {
                        if next == c {
                            chars.next();
                            token.push(c);
                            continue;
                        }
                    }
                }
                token.push(ch);
            }
            if !closed {
                return Err(TokenizeError::UnterminatedQuote(start));
            }
            // The closing quote must end the token.
            if let Some(&(pos, next)) = chars.peek() {
                if !next.is_whitespace() {
                    return Err(TokenizeError::MisplacedQuote(pos));
                }
            }
            tokens.push(token);
            continue;
        }

        let mut token = String::new();
        while let Some(&(pos, ch)) = chars.peek() {
            if ch.is_whitespace() {
                break;
            }
            chars.next();
            match ch {
                '"' | '\'' => return Err(TokenizeError::MisplacedQuote(pos)),
                '\\' => match chars.peek() {
                    Some(&(_, next @ ('\\' | '"' | '\''))) => {
                        chars.next();
                        token.push(next);
                    }
                    _ => token.push('\\'),
                },
                _ => token.push(ch),
            }
        }
        tokens.push(token);
    }

    Ok(tokens)
}

/// Render `token` so that tokenizing the result yields `token` again.
///
/// Tokens that need quoting and end in a backslash cannot be represented;
/// such a trailing backslash is doubled, which tokenizes to two backslashes.
pub fn quote(token: &str) -> String {
    let needs_quotes = token.is_empty() || token.chars().any(|c| c.is_whitespace() || c == '"' || c == '\'');
    if !needs_quotes {
        return token.replace('\\', "\\\\");
    }

    let mut out = String::with_capacity(token.len() + 2);
    out.push('"');
    for c in token.chars() {
        if c == '"' {
            out.push('\\');
        }
        out.push(c);
    }
    if token.ends_with('\\') {
        out.push('\\');
    }
    out.push('"');
    out
}

/// Join tokens into a command string using [`quote`].
pub fn join(tokens: &[String]) -> String {
    tokens.iter().map(|t| quote(t)).collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn toks(input: &str) -> Vec<String> {
        tokenize(input).unwrap()
    }

    #[test]
    fn empty_input_is_empty_sequence() {
        assert!(toks("").is_empty());
        assert!(toks("   \t ").is_empty());
    }

    #[test]
    fn splits_on_whitespace() {
        assert_eq!(toks("add  abc\tdef "), vec!["add", "abc", "def"]);
    }

    #[test]
    fn quoted_tokens_keep_whitespace() {
        assert_eq!(toks(r#"test "a b" c"#), vec!["test", "a b", "c"]);
        assert_eq!(toks("test 'a b' c"), vec!["test", "a b", "c"]);
        assert_eq!(toks(r#"test 'a " b' c"#), vec!["test", "a \" b", "c"]);
    }

    #[test]
    fn same_quote_escape_is_consumed() {
        assert_eq!(toks(r#"test "a \" b" c"#), vec!["test", "a \" b", "c"]);
        assert_eq!(toks(r"test 'a \' b' c"), vec!["test", "a ' b", "c"]);
    }

    #[test]
    fn other_escapes_keep_backslash() {
        assert_eq!(toks(r#"test "a \' b" c"#), vec!["test", r"a \' b", "c"]);
        assert_eq!(toks(r#"test 'a \" b' c"#), vec!["test", r#"a \" b"#, "c"]);
        assert_eq!(toks(r#""x\ny""#), vec![r"x\ny"]);
    }

    #[test]
    fn unquoted_escapes() {
        assert_eq!(toks(r"\-b"), vec![r"\-b"]);
        assert_eq!(toks(r"\\-b"), vec![r"\-b"]);
        assert_eq!(toks(r#"it\'s"#), vec!["it's"]);
    }

    #[test]
    fn unterminated_quote_fails() {
        assert_eq!(tokenize(r#"test "a b c"#), Err(TokenizeError::UnterminatedQuote(5)));
        assert_eq!(tokenize("test a 'b c"), Err(TokenizeError::UnterminatedQuote(7)));
    }

    #[test]
    fn quote_touching_text_fails() {
        assert!(matches!(
            tokenize(r#"test "a "b" c"#),
            Err(TokenizeError::MisplacedQuote(_))
        ));
        assert!(matches!(
            tokenize("test 'a 'b' c"),
            Err(TokenizeError::MisplacedQuote(_))
        ));
        assert!(matches!(tokenize("ab\"c\""), Err(TokenizeError::MisplacedQuote(2))));
    }

    #[test]
    fn empty_quotes_give_empty_token() {
        assert_eq!(toks(r#"set key """#), vec!["set", "key", ""]);
    }

    #[test]
    fn quote_round_trips_awkward_tokens() {
        for token in ["plain", "", "a b", "say \"hi\"", "it's", r"back\slash", r"\-x", r#"a\"b"#] {
            assert_eq!(toks(&quote(token)), vec![token.to_string()], "token {:?}", token);
        }
    }

    fn token_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            "[a-z0-9-]{1,6}",
            "[a-z \"]{0,8}",
            "[a-z ']{0,8}",
        ]
    }

    proptest! {
        #[test]
        fn joining_and_retokenizing_is_stable(tokens in prop::collection::vec(token_strategy(), 0..6)) {
            let first = tokenize(&join(&tokens)).unwrap();
            prop_assert_eq!(&first, &tokens);
            let second = tokenize(&join(&first)).unwrap();
            prop_assert_eq!(second, first);
        }
    }
}
