//! Event router - preprocesses events and dispatches them to plugins

use crate::application::errors::{PluginError, RegistryError};
use crate::application::loopback::EventQueue;
use crate::application::services::MessageService;
use crate::domain::entities::{BotIdentity, CommandLine, Event, Message, PlatformEvent, Response};
use crate::plugins::registry::{PluginRegistry, RegisteredPlugin};
use crate::plugins::trait_def::{Plugin, PluginContext, PluginDefinition};
use futures::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Mark messages that address the bot and derive their command line.
///
/// A message addresses the bot if it is a stream message starting with the
/// bot's mention, or a private message to the bot alone that does not start
/// with the mention. The bot's own messages never do.
pub fn preprocess(mut event: Event, identity: &BotIdentity) -> Event {
    if let Some(PlatformEvent::Message(message)) = event.platform_event_mut() {
        mark_addressed(message, identity);
    }
    event
}

fn mark_addressed(message: &mut Message, identity: &BotIdentity) {
    message.command = None;
    if message.sender_id == identity.user_id {
        return;
    }

    let mention = identity.mention();
    let starts_with_mention = message.content.starts_with(mention);
    let addressed = if message.is_private() {
        !starts_with_mention && message.is_only_private_recipient(identity.user_id)
    } else {
        starts_with_mention
    };
    if !addressed {
        return;
    }
    let line = if starts_with_mention {
        &message.content[mention.len()..]
    } else {
        message.content.as_str()
    };
    let command = CommandLine::split(line);
    debug!(command = %command.name, "Message addresses the bot");
    message.command = Some(command);
}

pub(crate) fn panic_message(payload: &Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run a plugin's initialization routine with panics contained.
pub(crate) fn instantiate_guarded(
    definition: &dyn PluginDefinition,
    ctx: PluginContext,
) -> Result<Box<dyn Plugin>, PluginError> {
    match panic::catch_unwind(AssertUnwindSafe(|| definition.instantiate(ctx))) {
        Ok(result) => result,
        Err(payload) => Err(PluginError::Panic(panic_message(&payload))),
    }
}

/// Run a handler future with panics contained.
pub(crate) async fn handle_guarded(
    plugin: &mut Box<dyn Plugin>,
    event: &Event,
) -> Result<Vec<Response>, PluginError> {
    match AssertUnwindSafe(plugin.handle_event(event)).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(PluginError::Panic(panic_message(&payload))),
    }
}

/// Shared by every copy of one dispatched event. Whichever execution
/// context fails first sends the generic error reply; the others stay quiet.
#[derive(Debug, Clone, Default)]
pub struct ErrorReply(Arc<AtomicBool>);

impl ErrorReply {
    /// True for the first caller only.
    pub fn claim(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }
}

/// An event queued for a dedicated plugin
#[derive(Debug, Clone)]
pub struct Routed {
    pub event: Event,
    pub error_reply: ErrorReply,
}

impl From<Event> for Routed {
    fn from(event: Event) -> Self {
        Self {
            event,
            error_reply: ErrorReply::default(),
        }
    }
}

/// Routes events to the plugins that are responsible for them
pub struct Router {
    registry: Arc<PluginRegistry>,
    identity: BotIdentity,
    delivery: MessageService,
    dedicated: RwLock<HashMap<&'static str, mpsc::Sender<Routed>>>,
}

impl Router {
    pub fn new(registry: Arc<PluginRegistry>, identity: BotIdentity, delivery: MessageService) -> Self {
        Self {
            registry,
            identity,
            delivery,
            dedicated: RwLock::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    pub fn identity(&self) -> &BotIdentity {
        &self.identity
    }

    pub fn delivery(&self) -> &MessageService {
        &self.delivery
    }

    /// Route events for a dedicated plugin into its queue.
    pub fn attach_dedicated(&self, name: &'static str, tx: mpsc::Sender<Routed>) {
        if let Ok(mut dedicated) = self.dedicated.write() {
            dedicated.insert(name, tx);
        }
    }

    pub fn detach_all(&self) {
        if let Ok(mut dedicated) = self.dedicated.write() {
            dedicated.clear();
        }
    }

    pub fn preprocess(&self, event: Event) -> Event {
        preprocess(event, &self.identity)
    }

    /// Apply a control event to the registry and let a dedicated target
    /// know about it.
    pub fn apply_control(&self, event: &Event) -> Result<(), RegistryError> {
        let Some(control) = event.control_event() else {
            return Ok(());
        };
        info!(event_id = %event.id, sender = %event.sender, action = control.action(), plugin = %control.target(), "Control event");
        self.registry.apply(control)?;
        if self.is_dedicated(control.target()) {
            if let Err(e) = self.forward(control.target(), event.clone().into()) {
                warn!(plugin = %control.target(), error = %e, "Dedicated plugin missed control event");
            }
        }
        Ok(())
    }

    fn is_dedicated(&self, name: &str) -> bool {
        self.dedicated
            .read()
            .map(|d| d.contains_key(name))
            .unwrap_or(false)
    }

    fn forward(&self, name: &str, routed: Routed) -> Result<(), PluginError> {
        let tx = self
            .dedicated
            .read()
            .ok()
            .and_then(|d| d.get(name).cloned())
            .ok_or(PluginError::QueueClosed)?;
        tx.try_send(routed).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => PluginError::QueueFull(name.to_string()),
            mpsc::error::TrySendError::Closed(_) => PluginError::QueueClosed,
        })
    }

    /// Evaluate a responsibility predicate with panics contained.
    fn check_responsible(&self, entry: &RegisteredPlugin, event: &Event) -> Result<bool, PluginError> {
        let definition = entry.definition();
        panic::catch_unwind(AssertUnwindSafe(|| definition.is_responsible(event, &self.identity)))
            .map_err(|payload| PluginError::Panic(panic_message(&payload)))
    }
}

/// Outcome of one dispatch pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    /// Plugins whose predicate accepted the event
    pub claimed: Vec<&'static str>,
    /// Plugins whose predicate or handler failed
    pub failed: Vec<&'static str>,
    /// Responses that reached the transport
    pub delivered: usize,
}

struct Instance {
    generation: u64,
    plugin: Box<dyn Plugin>,
}

/// Addressed messages always get an answer, and at most one generic error.
async fn reply_fallback(router: &Router, message: &Message, report: &DispatchReport, error_reply: &ErrorReply) -> usize {
    let response = if !report.failed.is_empty() {
        if !error_reply.claim() {
            return 0;
        }
        Response::internal_error(message)
    } else if report.claimed.is_empty() {
        debug!(command = ?message.command_name(), "No plugin claimed the command");
        Response::command_not_found(message)
    } else {
        return 0;
    };
    router.delivery().deliver(vec![response]).await
}

/// A shared worker. Owns its own instance of every shared-mode plugin.
pub struct Worker {
    id: usize,
    router: Arc<Router>,
    context: PluginContext,
    instances: HashMap<&'static str, Instance>,
}

impl Worker {
    pub fn new(id: usize, router: Arc<Router>, context: PluginContext) -> Self {
        Self {
            id,
            router,
            context,
            instances: HashMap::new(),
        }
    }

    /// Instantiate every shared plugin in start order.
    pub fn init(&mut self) -> Result<(), PluginError> {
        let router = Arc::clone(&self.router);
        for entry in router.registry().iter() {
            self.prepare(entry)?;
        }
        debug!(worker = self.id, plugins = self.instances.len(), "Worker initialized");
        Ok(())
    }

    /// Instantiate one shared plugin; dedicated plugins are skipped.
    pub fn prepare(&mut self, entry: &RegisteredPlugin) -> Result<(), PluginError> {
        if !entry.descriptor().mode.is_dedicated() {
            self.instance(entry)?;
        }
        Ok(())
    }

    fn instance(&mut self, entry: &RegisteredPlugin) -> Result<&mut Box<dyn Plugin>, PluginError> {
        let name = entry.name();
        let generation = entry.state().generation();
        let stale = self
            .instances
            .get(name)
            .map_or(true, |i| i.generation != generation);
        if stale {
            debug!(worker = self.id, plugin = %name, generation, "Instantiating plugin");
            let plugin = instantiate_guarded(entry.definition().as_ref(), self.context.clone())?;
            self.instances.insert(name, Instance { generation, plugin });
        }
        self.instances
            .get_mut(name)
            .map(|i| &mut i.plugin)
            .ok_or_else(|| PluginError::Init(format!("no instance of {}", name)))
    }

    /// Preprocess and dispatch one event.
    pub async fn dispatch(&mut self, event: Event) -> DispatchReport {
        let mut report = DispatchReport::default();
        if event.control_event().is_some() {
            if let Err(e) = self.router.apply_control(&event) {
                warn!(event_id = %event.id, error = %e, "Control event rejected");
            }
            return report;
        }

        let router = Arc::clone(&self.router);
        let event = router.preprocess(event);
        let error_reply = ErrorReply::default();
        debug!(worker = self.id, event_id = %event.id, sender = %event.sender, kind = ?event.kind(), "Dispatching");

        for entry in router.registry().iter() {
            let name = entry.name();
            if !entry.state().is_running() || event.sender == name {
                continue;
            }
            match router.check_responsible(entry, &event) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    error!(plugin = %name, event_id = %event.id, error = %e, "Responsibility check failed");
                    report.failed.push(name);
                    continue;
                }
            }
            report.claimed.push(name);

            if entry.descriptor().mode.is_dedicated() {
                let routed = Routed {
                    event: event.clone(),
                    error_reply: error_reply.clone(),
                };
                if let Err(e) = router.forward(name, routed) {
                    error!(plugin = %name, event_id = %event.id, error = %e, "Forwarding to dedicated plugin failed");
                    report.failed.push(name);
                }
                continue;
            }

            match self.handle(entry, &event).await {
                Ok(responses) => report.delivered += router.delivery().deliver(responses).await,
                Err(e) => {
                    error!(plugin = %name, event_id = %event.id, error = %e, "Plugin handler failed");
                    report.failed.push(name);
                }
            }
        }

        if let Some(message) = event.message().filter(|m| m.is_addressed()) {
            report.delivered += reply_fallback(&router, message, &report, &error_reply).await;
        }
        report
    }

    async fn handle(&mut self, entry: &RegisteredPlugin, event: &Event) -> Result<Vec<Response>, PluginError> {
        let plugin = self.instance(entry)?;
        let result = handle_guarded(plugin, event).await;
        if let Err(PluginError::Panic(_)) = result {
            // Rebuild on next use; the instance may be half-updated.
            self.instances.remove(entry.name());
        }
        result
    }

    /// Pull events from the shared queue until shutdown, then dispatch what
    /// is still queued.
    pub async fn run(mut self, queue: EventQueue, mut shutdown: watch::Receiver<bool>) {
        info!(worker = self.id, "Worker started");
        loop {
            let event = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                event = queue.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            self.dispatch(event).await;
        }
        while let Some(event) = queue.try_recv() {
            self.dispatch(event).await;
        }
        info!(worker = self.id, "Worker stopped");
    }
}
