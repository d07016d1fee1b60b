use crate::application::errors::TransportError;
use crate::domain::entities::{BotIdentity, Destination, Message, PlatformEvent};
use async_trait::async_trait;
use std::sync::Arc;

/// Transport trait - abstraction for the chat platform connection
#[async_trait]
pub trait Transport: Send + Sync {
    /// The bot's own identity on the platform
    fn identity(&self) -> BotIdentity;

    /// Long-poll the platform for the next batch of events.
    ///
    /// Returns [`TransportError::Closed`] once the event source is exhausted.
    async fn next_events(&self) -> Result<Vec<PlatformEvent>, TransportError>;

    /// Send a message, returning the id the platform assigned to it
    async fn send_message(&self, destination: &Destination, content: &str) -> Result<i64, TransportError>;

    async fn add_reaction(&self, message_id: i64, emoji: &str) -> Result<(), TransportError>;

    async fn remove_reaction(&self, message_id: i64, emoji: &str) -> Result<(), TransportError>;

    /// Fetch a previously posted message
    async fn get_message(&self, message_id: i64) -> Result<Message, TransportError>;

    /// Whether the platform grants the user administrative rights
    async fn user_is_privileged(&self, user_id: i64) -> Result<bool, TransportError>;

    /// Open a separate connection for a plugin that must not share fate
    /// with the main one.
    async fn connect_isolated(&self) -> Result<Arc<dyn Transport>, TransportError>;
}
