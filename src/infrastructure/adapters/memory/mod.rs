//! In-memory transport recording every outbound call

use crate::application::errors::TransportError;
use crate::domain::entities::{BotIdentity, Destination, Message, MessageKind, PlatformEvent};
use crate::domain::traits::Transport;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Message {
        id: i64,
        destination: Destination,
        content: String,
    },
    Reaction {
        message_id: i64,
        emoji: String,
    },
    RemoveReaction {
        message_id: i64,
        emoji: String,
    },
}

#[derive(Default)]
struct State {
    inbound: VecDeque<Vec<PlatformEvent>>,
    outbound: Vec<Outbound>,
    messages: HashMap<i64, Message>,
    privileged: HashSet<i64>,
    failures: VecDeque<TransportError>,
    next_id: i64,
    isolated_connections: usize,
}

#[derive(Clone)]
pub struct MemoryTransport {
    identity: BotIdentity,
    state: Arc<Mutex<State>>,
}

impl MemoryTransport {
    pub fn new(identity: BotIdentity) -> Self {
        Self {
            identity,
            state: Arc::new(Mutex::new(State {
                next_id: 1000,
                ..State::default()
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn push_events(&self, events: Vec<PlatformEvent>) {
        self.state().inbound.push_back(events);
    }

    /// Make a message retrievable through `get_message`.
    pub fn store_message(&self, message: Message) {
        self.state().messages.insert(message.id, message);
    }

    pub fn grant_privilege(&self, user_id: i64) {
        self.state().privileged.insert(user_id);
    }

    /// The next outbound calls fail with these errors, in order.
    pub fn fail_next(&self, errors: Vec<TransportError>) {
        self.state().failures.extend(errors);
    }

    pub fn outbound(&self) -> Vec<Outbound> {
        self.state().outbound.clone()
    }

    pub fn sent_messages(&self) -> Vec<(Destination, String)> {
        self.outbound()
            .into_iter()
            .filter_map(|o| match o {
                Outbound::Message { destination, content, .. } => Some((destination, content)),
                _ => None,
            })
            .collect()
    }

    pub fn reactions(&self) -> Vec<(i64, String)> {
        self.outbound()
            .into_iter()
            .filter_map(|o| match o {
                Outbound::Reaction { message_id, emoji } => Some((message_id, emoji)),
                _ => None,
            })
            .collect()
    }

    pub fn isolated_connections(&self) -> usize {
        self.state().isolated_connections
    }

    fn take_failure(&self) -> Result<(), TransportError> {
        match self.state().failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn identity(&self) -> BotIdentity {
        self.identity.clone()
    }

    async fn next_events(&self) -> Result<Vec<PlatformEvent>, TransportError> {
        self.state().inbound.pop_front().ok_or(TransportError::Closed)
    }

    async fn send_message(&self, destination: &Destination, content: &str) -> Result<i64, TransportError> {
        self.take_failure()?;
        let mut state = self.state();
        state.next_id += 1;
        let id = state.next_id;
        let kind = match destination {
            Destination::Private { recipients } => MessageKind::Private {
                recipients: recipients.clone(),
            },
            Destination::Stream { stream, topic } => MessageKind::Stream {
                stream: stream.clone(),
                topic: topic.clone(),
            },
        };
        state.messages.insert(
            id,
            Message {
                id,
                sender_id: self.identity.user_id,
                sender_full_name: self.identity.full_name.clone(),
                content: content.to_string(),
                kind,
                flags: Vec::new(),
                timestamp: Utc::now(),
                command: None,
            },
        );
        state.outbound.push(Outbound::Message {
            id,
            destination: destination.clone(),
            content: content.to_string(),
        });
        Ok(id)
    }

    async fn add_reaction(&self, message_id: i64, emoji: &str) -> Result<(), TransportError> {
        self.take_failure()?;
        self.state().outbound.push(Outbound::Reaction {
            message_id,
            emoji: emoji.to_string(),
        });
        Ok(())
    }

    async fn remove_reaction(&self, message_id: i64, emoji: &str) -> Result<(), TransportError> {
        self.take_failure()?;
        self.state().outbound.push(Outbound::RemoveReaction {
            message_id,
            emoji: emoji.to_string(),
        });
        Ok(())
    }

    async fn get_message(&self, message_id: i64) -> Result<Message, TransportError> {
        self.state()
            .messages
            .get(&message_id)
            .cloned()
            .ok_or_else(|| TransportError::NotFound(format!("message {}", message_id)))
    }

    async fn user_is_privileged(&self, user_id: i64) -> Result<bool, TransportError> {
        Ok(self.state().privileged.contains(&user_id))
    }

    async fn connect_isolated(&self) -> Result<Arc<dyn Transport>, TransportError> {
        self.state().isolated_connections += 1;
        Ok(Arc::new(self.clone()))
    }
}
