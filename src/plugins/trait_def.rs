//! Plugin trait definitions

use crate::application::errors::PluginError;
use crate::application::loopback::LoopbackHandle;
use crate::domain::entities::{BotIdentity, Event, EventKind, Response};
use crate::domain::traits::Transport;
use crate::infrastructure::database::Storage;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Execution context a plugin is started in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConcurrencyMode {
    /// One instance per shared worker
    SharedWorker,
    /// A single instance on its own thread
    DedicatedThread,
    /// A single instance on its own thread with its own transport connection
    DedicatedProcess,
}

impl ConcurrencyMode {
    pub fn is_dedicated(&self) -> bool {
        !matches!(self, ConcurrencyMode::SharedWorker)
    }
}

impl fmt::Display for ConcurrencyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConcurrencyMode::SharedWorker => write!(f, "shared-worker"),
            ConcurrencyMode::DedicatedThread => write!(f, "dedicated-thread"),
            ConcurrencyMode::DedicatedProcess => write!(f, "dedicated-process"),
        }
    }
}

/// Static metadata of a plugin
#[derive(Debug, Clone)]
pub struct PluginDescriptor {
    /// Unique, stable identifier; also the command name for command plugins
    pub name: &'static str,
    pub description: &'static str,
    pub events: &'static [EventKind],
    /// Plugins that have to be started first
    pub dependencies: &'static [&'static str],
    pub mode: ConcurrencyMode,
}

/// Everything an instance needs from the runtime
#[derive(Clone)]
pub struct PluginContext {
    pub identity: BotIdentity,
    pub transport: Arc<dyn Transport>,
    pub storage: Storage,
    pub loopback: LoopbackHandle,
}

impl PluginContext {
    pub fn with_transport(&self, transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            ..self.clone()
        }
    }

    /// Whether `user_id` may use privileged commands.
    ///
    /// Platform administrators and the configured `bot_owner` qualify.
    pub async fn user_is_privileged(&self, user_id: i64) -> Result<bool, PluginError> {
        if self.transport.user_is_privileged(user_id).await? {
            return Ok(true);
        }
        let conf = crate::infrastructure::database::Conf::new(&self.storage)?;
        Ok(conf.get("bot_owner")?.as_deref() == Some(user_id.to_string().as_str()))
    }
}

/// A plugin type known to the registry.
///
/// The definition is shared by every execution context; instances created
/// by [`instantiate`](PluginDefinition::instantiate) hold the mutable state.
pub trait PluginDefinition: Send + Sync {
    fn descriptor(&self) -> &PluginDescriptor;

    fn name(&self) -> &'static str {
        self.descriptor().name
    }

    /// Usage lines shown by `help`
    fn syntax(&self) -> String {
        String::new()
    }

    /// Responsibility predicate.
    ///
    /// By default a plugin is responsible for the event kinds it declared,
    /// and for messages only when the derived command name equals its name.
    fn is_responsible(&self, event: &Event, _identity: &BotIdentity) -> bool {
        let descriptor = self.descriptor();
        let Some(kind) = event.kind() else {
            return false;
        };
        if !descriptor.events.contains(&kind) {
            return false;
        }
        match kind {
            EventKind::Message => event.command_name() == Some(descriptor.name),
            _ => true,
        }
    }

    /// Run the plugin's initialization routine and return a fresh instance.
    fn instantiate(&self, ctx: PluginContext) -> Result<Box<dyn Plugin>, PluginError>;
}

/// A running plugin instance
#[async_trait]
pub trait Plugin: Send {
    async fn handle_event(&mut self, event: &Event) -> Result<Vec<Response>, PluginError>;

    /// Deadline of the next timed action, if any
    fn next_wakeup(&self) -> Option<DateTime<Utc>> {
        None
    }

    /// Called once the deadline from [`next_wakeup`](Plugin::next_wakeup) passed
    async fn handle_timeout(&mut self) -> Result<Vec<Response>, PluginError> {
        Ok(Vec::new())
    }
}
