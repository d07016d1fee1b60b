//! `greet` - answer a bare mention

use crate::application::errors::PluginError;
use crate::domain::entities::response::GREET_EMOJI;
use crate::domain::entities::{BotIdentity, Event, EventKind, Response};
use crate::plugins::trait_def::{ConcurrencyMode, Plugin, PluginContext, PluginDefinition, PluginDescriptor};
use async_trait::async_trait;

/// Platform flag set on messages that mention the receiving user.
pub const MENTIONED_FLAG: &str = "mentioned";

static DESCRIPTOR: PluginDescriptor = PluginDescriptor {
    name: "greet",
    description: "Wave back when mentioned without a command.",
    events: &[EventKind::Message],
    dependencies: &[],
    mode: ConcurrencyMode::SharedWorker,
};

pub struct GreetPlugin;

impl PluginDefinition for GreetPlugin {
    fn descriptor(&self) -> &PluginDescriptor {
        &DESCRIPTOR
    }

    /// Addressed messages with an empty command, and messages that only
    /// mention the bot somewhere in the text.
    fn is_responsible(&self, event: &Event, identity: &BotIdentity) -> bool {
        let Some(message) = event.message() else {
            return false;
        };
        if message.sender_id == identity.user_id {
            return false;
        }
        match message.command_name() {
            Some(name) => name.is_empty(),
            None => message.flags.iter().any(|f| f == MENTIONED_FLAG),
        }
    }

    fn instantiate(&self, _ctx: PluginContext) -> Result<Box<dyn Plugin>, PluginError> {
        Ok(Box::new(Greeter))
    }
}

struct Greeter;

#[async_trait]
impl Plugin for Greeter {
    async fn handle_event(&mut self, event: &Event) -> Result<Vec<Response>, PluginError> {
        let Some(message) = event.message() else {
            return Ok(Vec::new());
        };
        let mut responses = vec![Response::reaction(message.id, GREET_EMOJI)];
        if message.is_addressed() {
            responses.push(Response::greet(message));
        }
        Ok(responses)
    }
}
