//! Shared fixtures for unit tests

use crate::application::loopback::{self, EventQueue, LoopbackHandle};
use crate::application::messaging::dispatcher::{Router, Worker};
use crate::application::services::MessageService;
use crate::domain::entities::{BotIdentity, Event, Message, PlatformEvent};
use crate::infrastructure::adapters::memory::MemoryTransport;
use crate::infrastructure::database::Storage;
use crate::plugins::registry::PluginRegistry;
use crate::plugins::trait_def::{PluginContext, PluginDefinition};
use std::sync::Arc;
use tempfile::TempDir;

pub const BOT_ID: i64 = 99;
pub const BOT_NAME: &str = "Keel";
pub const USER_ID: i64 = 10;
pub const USER_NAME: &str = "Ada";

pub struct Harness {
    _dir: TempDir,
    pub identity: BotIdentity,
    pub transport: MemoryTransport,
    pub storage: Storage,
    pub loopback: LoopbackHandle,
    pub queue: EventQueue,
}

impl Harness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let identity = BotIdentity::new(BOT_ID, BOT_NAME);
        let storage = Storage::new(dir.path().join("bot.db"));
        let (loopback, queue) = loopback::channel();
        Self {
            _dir: dir,
            transport: MemoryTransport::new(identity.clone()),
            identity,
            storage,
            loopback,
            queue,
        }
    }

    pub fn context(&self) -> PluginContext {
        PluginContext {
            identity: self.identity.clone(),
            transport: Arc::new(self.transport.clone()),
            storage: self.storage.clone(),
            loopback: self.loopback.clone(),
        }
    }

    /// Private message from the default user to the bot.
    pub fn private(&self, id: i64, content: &str) -> Message {
        Message::private(id, USER_ID, vec![USER_ID, BOT_ID], content).with_sender_name(USER_NAME)
    }

    /// Stream message from the default user mentioning the bot.
    pub fn mention(&self, id: i64, content: &str) -> Message {
        Message::stream(id, USER_ID, "general", "bots", format!("{} {}", self.identity.mention(), content))
            .with_sender_name(USER_NAME)
    }

    /// Private message event, already marked as addressed.
    pub fn command_event(&self, id: i64, content: &str) -> Event {
        crate::application::messaging::dispatcher::preprocess(
            Event::platform(PlatformEvent::Message(self.private(id, content))),
            &self.identity,
        )
    }

    pub fn router(&self, definitions: Vec<Arc<dyn PluginDefinition>>) -> Arc<Router> {
        let mut registry = PluginRegistry::new();
        for definition in definitions {
            registry.register(definition).expect("register");
        }
        let registry = registry.into_start_order().expect("start order");
        for name in registry.names() {
            registry.set_running(name, true).expect("running");
        }
        Arc::new(Router::new(
            Arc::new(registry),
            self.identity.clone(),
            MessageService::new(Arc::new(self.transport.clone())),
        ))
    }

    pub fn worker(&self, definitions: Vec<Arc<dyn PluginDefinition>>) -> Worker {
        let mut worker = Worker::new(0, self.router(definitions), self.context());
        worker.init().expect("worker init");
        worker
    }

    /// Drain the loopback queue.
    pub fn looped(&self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Some(event) = self.queue.try_recv() {
            events.push(event);
        }
        events
    }
}
