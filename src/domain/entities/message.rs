use super::CommandLine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a message was posted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageKind {
    /// Private conversation; `recipients` includes the sender.
    Private { recipients: Vec<i64> },
    /// Channel message under a topic.
    Stream { stream: String, topic: String },
}

/// A chat message as delivered by the platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub sender_id: i64,
    pub sender_full_name: String,
    pub content: String,
    pub kind: MessageKind,
    #[serde(default)]
    pub flags: Vec<String>,
    pub timestamp: DateTime<Utc>,
    /// Attached by the router when the message addresses the bot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<CommandLine>,
}

impl Message {
    pub fn private(id: i64, sender_id: i64, recipients: Vec<i64>, content: impl Into<String>) -> Self {
        Self {
            id,
            sender_id,
            sender_full_name: String::new(),
            content: content.into(),
            kind: MessageKind::Private { recipients },
            flags: Vec::new(),
            timestamp: Utc::now(),
            command: None,
        }
    }

    pub fn stream(
        id: i64,
        sender_id: i64,
        stream: impl Into<String>,
        topic: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id,
            sender_id,
            sender_full_name: String::new(),
            content: content.into(),
            kind: MessageKind::Stream {
                stream: stream.into(),
                topic: topic.into(),
            },
            flags: Vec::new(),
            timestamp: Utc::now(),
            command: None,
        }
    }

    pub fn with_sender_name(mut self, name: impl Into<String>) -> Self {
        self.sender_full_name = name.into();
        self
    }

    pub fn with_flag(mut self, flag: impl Into<String>) -> Self {
        self.flags.push(flag.into());
        self
    }

    pub fn is_private(&self) -> bool {
        matches!(self.kind, MessageKind::Private { .. })
    }

    /// True if the only recipient besides the sender is `user_id`.
    pub fn is_only_private_recipient(&self, user_id: i64) -> bool {
        match &self.kind {
            MessageKind::Private { recipients } => {
                recipients.contains(&user_id)
                    && recipients
                        .iter()
                        .all(|r| *r == user_id || *r == self.sender_id)
            }
            MessageKind::Stream { .. } => false,
        }
    }

    /// Name of the command the router derived, if the bot was addressed.
    pub fn command_name(&self) -> Option<&str> {
        self.command.as_ref().map(|c| c.name.as_str())
    }

    /// Text following the command name, if the bot was addressed.
    pub fn command_text(&self) -> Option<&str> {
        self.command.as_ref().map(|c| c.text.as_str())
    }

    pub fn is_addressed(&self) -> bool {
        self.command.is_some()
    }

    /// Copy of this message turned into a private message from the same
    /// sender to the bot, carrying `command` as its content.
    pub fn redirected_command(&self, bot_id: i64, command: &str) -> Message {
        let mut recipients = vec![self.sender_id];
        if bot_id != self.sender_id {
            recipients.push(bot_id);
        }
        Message {
            content: command.to_string(),
            kind: MessageKind::Private { recipients },
            command: None,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_recipient_check() {
        let msg = Message::private(1, 10, vec![10, 99], "hi");
        assert!(msg.is_only_private_recipient(99));
        let group = Message::private(1, 10, vec![10, 99, 11], "hi");
        assert!(!group.is_only_private_recipient(99));
        let stream = Message::stream(1, 10, "s", "t", "hi");
        assert!(!stream.is_only_private_recipient(99));
    }

    #[test]
    fn redirected_command_drops_derived_fields() {
        let mut msg = Message::stream(5, 10, "s", "t", "@**bot** jobs add x y").with_sender_name("Ada");
        msg.command = Some(CommandLine::split("jobs add x y"));
        let fake = msg.redirected_command(99, "conf list");
        assert_eq!(fake.content, "conf list");
        assert_eq!(fake.command, None);
        assert_eq!(fake.sender_full_name, "Ada");
        assert!(fake.is_only_private_recipient(99));
    }
}
