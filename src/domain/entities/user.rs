use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents a user of the chat platform
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub full_name: String,
    pub email: Option<String>,
    pub is_bot: bool,
}

impl User {
    pub fn new(id: i64, full_name: impl Into<String>) -> Self {
        Self {
            id,
            full_name: full_name.into(),
            email: None,
            is_bot: false,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn display_name(&self) -> String {
        if self.full_name.is_empty() {
            self.id.to_string()
        } else {
            self.full_name.clone()
        }
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// The bot's own identity on the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotIdentity {
    pub user_id: i64,
    pub full_name: String,
    mention: String,
}

impl BotIdentity {
    pub fn new(user_id: i64, full_name: impl Into<String>) -> Self {
        let full_name = full_name.into();
        let mention = format!("@**{}**", full_name);
        Self {
            user_id,
            full_name,
            mention,
        }
    }

    /// The exact token a message has to start with to address the bot.
    pub fn mention(&self) -> &str {
        &self.mention
    }

    pub fn as_user(&self) -> User {
        User {
            id: self.user_id,
            full_name: self.full_name.clone(),
            email: None,
            is_bot: true,
        }
    }
}
