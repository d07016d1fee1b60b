//! Outbound responses produced by plugin handlers

use super::{Message, MessageKind};
use serde::{Deserialize, Serialize};

pub const OK_EMOJI: &str = "ok";
pub const NO_EMOJI: &str = "cross_mark";
pub const GREET_EMOJI: &str = "wave";
pub const APPROVE_EMOJI: &str = "check";

/// Target of an outbound message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Destination {
    Private { recipients: Vec<i64> },
    Stream { stream: String, topic: String },
}

impl Destination {
    /// Same conversation the message was posted in.
    pub fn of(message: &Message) -> Self {
        match &message.kind {
            MessageKind::Private { recipients } => Destination::Private {
                recipients: recipients.clone(),
            },
            MessageKind::Stream { stream, topic } => Destination::Stream {
                stream: stream.clone(),
                topic: topic.clone(),
            },
        }
    }

    pub fn user(user_id: i64) -> Self {
        Destination::Private {
            recipients: vec![user_id],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Message {
        destination: Destination,
        content: String,
    },
    Reaction {
        message_id: i64,
        emoji: String,
    },
    None,
}

impl Response {
    /// Reply in the conversation `message` came from.
    pub fn reply(message: &Message, content: impl Into<String>) -> Self {
        Response::Message {
            destination: Destination::of(message),
            content: content.into(),
        }
    }

    pub fn private(user_id: i64, content: impl Into<String>) -> Self {
        Response::Message {
            destination: Destination::user(user_id),
            content: content.into(),
        }
    }

    pub fn reaction(message_id: i64, emoji: impl Into<String>) -> Self {
        Response::Reaction {
            message_id,
            emoji: emoji.into(),
        }
    }

    pub fn ok(message: &Message) -> Self {
        Self::reaction(message.id, OK_EMOJI)
    }

    pub fn no(message: &Message) -> Self {
        Self::reaction(message.id, NO_EMOJI)
    }

    pub fn greet(message: &Message) -> Self {
        Self::reply(message, format!("Hi {}! :-)", message.sender_full_name))
    }

    pub fn privilege_error(message: &Message) -> Self {
        Self::reply(
            message,
            format!(
                "Hi {}!\nYou don't have sufficient privileges to execute this command.",
                message.sender_full_name
            ),
        )
    }

    /// Generic failure notice, always sent privately to the sender.
    pub fn internal_error(message: &Message) -> Self {
        Self::private(
            message.sender_id,
            format!(
                "Hi {}!\nAn internal error occurred while executing your request.",
                message.sender_full_name
            ),
        )
    }

    pub fn command_not_found(message: &Message) -> Self {
        Self::private(
            message.sender_id,
            format!(
                "Hi {}!\nUnfortunately, I currently cannot understand what you wrote to me.\n\
                 Try \"help\" to get a glimpse of what I am capable of. :-)",
                message.sender_full_name
            ),
        )
    }

    /// Ask the sender to confirm `command` by reacting with `emoji` to the reply.
    pub fn approval_request(message: &Message, command: &str, emoji: &str) -> Self {
        Self::reply(
            message,
            format!(
                "Hi {}!\nYour input would lead to the execution of the following command.\n\
                 Do you want to execute this? If yes, please react with :{}: to this message.\n\
                 original_message_id: {}\ncommand: {}",
                message.sender_full_name, emoji, message.id, command
            ),
        )
    }

    pub fn none() -> Self {
        Response::None
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Response::None)
    }
}
