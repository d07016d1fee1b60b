//! Console adapter for development/testing
//!
//! Every stdin line becomes a private message from the configured operator
//! to the bot. A few slash commands produce other event kinds:
//!
//! - `/stream <text>` posts `<text>` to the `general` stream
//! - `/react <id> <emoji>` and `/unreact <id> <emoji>` add or remove a reaction

use crate::application::errors::TransportError;
use crate::domain::entities::{
    BotIdentity, Destination, Message, MessageKind, PlatformEvent, Reaction, ReactionOp,
};
use crate::domain::traits::Transport;
use crate::infrastructure::config::ConsoleConfig;
use crate::plugins::builtin::greet::MENTIONED_FLAG;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

const STREAM: &str = "general";
const TOPIC: &str = "console";

struct Inner {
    config: ConsoleConfig,
    identity: BotIdentity,
    input: tokio::sync::Mutex<Lines<BufReader<Stdin>>>,
    history: Mutex<HashMap<i64, Message>>,
    next_id: AtomicI64,
}

/// Console transport for local development
#[derive(Clone)]
pub struct ConsoleAdapter {
    inner: Arc<Inner>,
}

impl ConsoleAdapter {
    pub fn new(bot_name: &str, config: ConsoleConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                identity: BotIdentity::new(config.bot_id, bot_name),
                config,
                input: tokio::sync::Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
                history: Mutex::new(HashMap::new()),
                next_id: AtomicI64::new(1),
            }),
        }
    }

    fn next_id(&self) -> i64 {
        self.inner.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn remember(&self, message: Message) {
        if let Ok(mut history) = self.inner.history.lock() {
            history.insert(message.id, message);
        }
    }

    /// Turn one input line into a platform event.
    pub fn parse_line(&self, line: &str) -> Option<PlatformEvent> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return None;
        }
        let config = &self.inner.config;

        let reaction = line
            .strip_prefix("/react ")
            .map(|args| (ReactionOp::Add, args))
            .or_else(|| line.strip_prefix("/unreact ").map(|args| (ReactionOp::Remove, args)));
        if let Some((op, args)) = reaction {
            let mut parts = args.split_whitespace();
            let message_id = parts.next()?.trim_start_matches('#').parse().ok()?;
            let emoji_name = parts.next()?.trim_matches(':').to_string();
            return Some(PlatformEvent::Reaction(Reaction {
                op,
                message_id,
                user_id: config.operator_id,
                emoji_name,
            }));
        }

        let id = self.next_id();
        let mut message = match line.strip_prefix("/stream ") {
            Some(text) => {
                let message = Message::stream(id, config.operator_id, STREAM, TOPIC, text);
                if text.contains(self.inner.identity.mention()) {
                    message.with_flag(MENTIONED_FLAG)
                } else {
                    message
                }
            }
            None => Message::private(id, config.operator_id, vec![config.operator_id, config.bot_id], line),
        };
        message.sender_full_name = config.operator_name.clone();
        println!("(message #{})", id);
        self.remember(message.clone());
        Some(PlatformEvent::Message(message))
    }
}

fn describe(destination: &Destination) -> String {
    match destination {
        Destination::Private { recipients } => format!(
            "private to {}",
            recipients.iter().map(i64::to_string).collect::<Vec<_>>().join(",")
        ),
        Destination::Stream { stream, topic } => format!("{} > {}", stream, topic),
    }
}

#[async_trait]
impl Transport for ConsoleAdapter {
    fn identity(&self) -> BotIdentity {
        self.inner.identity.clone()
    }

    async fn next_events(&self) -> Result<Vec<PlatformEvent>, TransportError> {
        let mut input = self.inner.input.lock().await;
        loop {
            match input.next_line().await {
                Ok(Some(line)) => {
                    if let Some(event) = self.parse_line(&line) {
                        return Ok(vec![event]);
                    }
                }
                Ok(None) => return Err(TransportError::Closed),
                Err(e) => return Err(TransportError::Network(e.to_string())),
            }
        }
    }

    async fn send_message(&self, destination: &Destination, content: &str) -> Result<i64, TransportError> {
        let id = self.next_id();
        let identity = &self.inner.identity;
        println!("[#{}] {} ({}):\n{}", id, identity.full_name, describe(destination), content);
        let kind = match destination {
            Destination::Private { recipients } => MessageKind::Private {
                recipients: recipients.clone(),
            },
            Destination::Stream { stream, topic } => MessageKind::Stream {
                stream: stream.clone(),
                topic: topic.clone(),
            },
        };
        self.remember(Message {
            id,
            sender_id: identity.user_id,
            sender_full_name: identity.full_name.clone(),
            content: content.to_string(),
            kind,
            flags: Vec::new(),
            timestamp: Utc::now(),
            command: None,
        });
        Ok(id)
    }

    async fn add_reaction(&self, message_id: i64, emoji: &str) -> Result<(), TransportError> {
        println!("[#{}] {} reacted :{}:", message_id, self.inner.identity.full_name, emoji);
        Ok(())
    }

    async fn remove_reaction(&self, message_id: i64, emoji: &str) -> Result<(), TransportError> {
        println!("[#{}] {} removed :{}:", message_id, self.inner.identity.full_name, emoji);
        Ok(())
    }

    async fn get_message(&self, message_id: i64) -> Result<Message, TransportError> {
        self.inner
            .history
            .lock()
            .ok()
            .and_then(|history| history.get(&message_id).cloned())
            .ok_or_else(|| TransportError::NotFound(format!("message {}", message_id)))
    }

    async fn user_is_privileged(&self, user_id: i64) -> Result<bool, TransportError> {
        let config = &self.inner.config;
        Ok(config.operator_is_admin && user_id == config.operator_id)
    }

    async fn connect_isolated(&self) -> Result<Arc<dyn Transport>, TransportError> {
        Ok(Arc::new(self.clone()))
    }
}
