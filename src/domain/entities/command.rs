use serde::{Deserialize, Serialize};

/// The command line derived from a message addressed to the bot.
///
/// `line` is the message text with the mention stripped, `name` its first
/// whitespace-delimited word (empty if there is none) and `text` everything
/// after that word.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandLine {
    pub line: String,
    pub name: String,
    pub text: String,
}

impl CommandLine {
    /// Split a command line into its name and the remaining text.
    pub fn split(line: &str) -> Self {
        let line = line.trim();
        let (name, text) = match line.find(char::is_whitespace) {
            Some(pos) => (&line[..pos], line[pos..].trim_start()),
            None => (line, ""),
        };
        Self {
            line: line.to_string(),
            name: name.to_string(),
            text: text.to_string(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
    }
}
