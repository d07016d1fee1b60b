//! Dedicated execution contexts
//!
//! A dedicated plugin owns a single instance that lives on its own OS thread
//! with a single-threaded runtime. The router feeds it through a bounded
//! queue. In process mode the instance also gets its own transport
//! connection.

use super::registry::{PluginState, RegisteredPlugin};
use super::trait_def::{ConcurrencyMode, Plugin, PluginContext, PluginDefinition};
use crate::application::errors::PluginError;
use crate::application::messaging::dispatcher::{handle_guarded, instantiate_guarded, panic_message, Routed};
use crate::application::services::MessageService;
use crate::domain::entities::{ControlEvent, Event, Response};
use chrono::Utc;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

/// Pause before retrying a timeout whose handler failed.
const TIMEOUT_RETRY: Duration = Duration::from_secs(5);

/// A running dedicated context
pub struct RunnerHandle {
    name: &'static str,
    sender: mpsc::Sender<Routed>,
    thread: JoinHandle<()>,
}

impl RunnerHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn sender(&self) -> mpsc::Sender<Routed> {
        self.sender.clone()
    }

    /// Wait for the thread to finish. Call after signalling shutdown.
    pub fn join(self) {
        if self.thread.join().is_err() {
            error!(plugin = %self.name, "Dedicated thread panicked");
        }
    }
}

/// Start the dedicated context of `entry` and wait until its instance is
/// initialized.
pub async fn spawn(
    entry: &RegisteredPlugin,
    context: PluginContext,
    queue_limit: usize,
    shutdown: watch::Receiver<bool>,
) -> Result<RunnerHandle, PluginError> {
    let name = entry.name();
    let definition = Arc::clone(entry.definition());
    let state = Arc::clone(entry.state());
    let (tx, rx) = mpsc::channel(queue_limit.max(1));
    let (ack_tx, ack_rx) = oneshot::channel::<Result<(), PluginError>>();

    let thread = std::thread::Builder::new()
        .name(format!("plugin-{}", name))
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                Ok(runtime) => runtime,
                Err(e) => {
                    let _ = ack_tx.send(Err(PluginError::Init(e.to_string())));
                    return;
                }
            };
            runtime.block_on(async move {
                match DedicatedRunner::start(definition, state, context).await {
                    Ok(runner) => {
                        let _ = ack_tx.send(Ok(()));
                        runner.run(rx, shutdown).await;
                    }
                    Err(e) => {
                        let _ = ack_tx.send(Err(e));
                    }
                }
            });
        })
        .map_err(|e| PluginError::Init(e.to_string()))?;

    match ack_rx.await {
        Ok(Ok(())) => {
            info!(plugin = %name, "Dedicated context started");
            Ok(RunnerHandle {
                name,
                sender: tx,
                thread,
            })
        }
        Ok(Err(e)) => {
            let _ = thread.join();
            Err(e)
        }
        Err(_) => {
            let _ = thread.join();
            Err(PluginError::Init(format!("{} exited during initialization", name)))
        }
    }
}

async fn sleep_for(delay: Option<Duration>) {
    match delay {
        Some(delay) => tokio::time::sleep(delay).await,
        None => std::future::pending().await,
    }
}

/// The single instance of a dedicated plugin and its event loop
pub struct DedicatedRunner {
    definition: Arc<dyn PluginDefinition>,
    state: Arc<PluginState>,
    context: PluginContext,
    delivery: MessageService,
    instance: Option<(u64, Box<dyn Plugin>)>,
    retry_at: Option<Instant>,
}

impl DedicatedRunner {
    /// Prepare the context and run the initialization routine.
    pub async fn start(
        definition: Arc<dyn PluginDefinition>,
        state: Arc<PluginState>,
        context: PluginContext,
    ) -> Result<Self, PluginError> {
        let context = if definition.descriptor().mode == ConcurrencyMode::DedicatedProcess {
            let transport = context.transport.connect_isolated().await?;
            debug!(plugin = %definition.name(), "Opened isolated transport connection");
            context.with_transport(transport)
        } else {
            context
        };
        let mut runner = Self {
            delivery: MessageService::new(Arc::clone(&context.transport)),
            definition,
            state,
            context,
            instance: None,
            retry_at: None,
        };
        runner.ensure_instance()?;
        Ok(runner)
    }

    fn name(&self) -> &'static str {
        self.definition.name()
    }

    fn ensure_instance(&mut self) -> Result<&mut Box<dyn Plugin>, PluginError> {
        let generation = self.state.generation();
        if self.instance.as_ref().map_or(true, |(g, _)| *g != generation) {
            debug!(plugin = %self.name(), generation, "Instantiating plugin");
            let plugin = instantiate_guarded(self.definition.as_ref(), self.context.clone())?;
            self.instance = Some((generation, plugin));
        }
        self.instance
            .as_mut()
            .map(|(_, plugin)| plugin)
            .ok_or_else(|| PluginError::Init(format!("no instance of {}", self.definition.name())))
    }

    /// Replace an instance that panicked.
    fn recover(&mut self) {
        self.instance = None;
        if let Err(e) = self.ensure_instance() {
            error!(plugin = %self.name(), error = %e, "Re-instantiation failed");
        }
    }

    /// Time left until the instance wants a timeout; `None` while stopped.
    ///
    /// After a failed timeout the next attempt waits at least [`TIMEOUT_RETRY`].
    pub fn next_wakeup(&self) -> Option<Duration> {
        if !self.state.is_running() {
            return None;
        }
        let (_, plugin) = self.instance.as_ref()?;
        let at = plugin.next_wakeup()?;
        let delay = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        Some(match self.retry_at {
            Some(retry_at) => delay.max(retry_at.saturating_duration_since(Instant::now())),
            None => delay,
        })
    }

    /// Handle one event taken from the queue.
    pub async fn process(&mut self, routed: Routed) {
        let Routed { event, error_reply } = routed;
        if let Some(control) = event.control_event() {
            if let ControlEvent::Reload(_) = control {
                self.instance = None;
                match self.ensure_instance() {
                    Ok(_) => info!(plugin = %self.name(), "Plugin reloaded"),
                    Err(e) => error!(plugin = %self.name(), error = %e, "Reload failed"),
                }
            }
            return;
        }
        if !self.state.is_running() {
            debug!(plugin = %self.name(), event_id = %event.id, "Plugin stopped, dropping event");
            return;
        }

        let result = match self.ensure_instance() {
            Ok(plugin) => handle_guarded(plugin, &event).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(responses) => {
                self.delivery.deliver(responses).await;
            }
            Err(e) => {
                error!(plugin = %self.name(), event_id = %event.id, error = %e, "Plugin handler failed");
                if let PluginError::Panic(_) = e {
                    self.recover();
                }
                if let Some(message) = event.message().filter(|m| m.is_addressed()) {
                    if error_reply.claim() {
                        self.delivery.deliver(vec![Response::internal_error(message)]).await;
                    }
                }
            }
        }
    }

    /// Run the instance's timed action.
    pub async fn timeout(&mut self) {
        let result = match self.ensure_instance() {
            Ok(plugin) => match AssertUnwindSafe(plugin.handle_timeout()).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => Err(PluginError::Panic(panic_message(&payload))),
            },
            Err(e) => Err(e),
        };
        match result {
            Ok(responses) => {
                self.retry_at = None;
                self.delivery.deliver(responses).await;
            }
            Err(e) => {
                error!(plugin = %self.name(), error = %e, retry_in = ?TIMEOUT_RETRY, "Timeout handler failed");
                self.retry_at = Some(Instant::now() + TIMEOUT_RETRY);
                if let PluginError::Panic(_) = e {
                    self.recover();
                }
            }
        }
    }

    pub async fn run(mut self, mut rx: mpsc::Receiver<Routed>, mut shutdown: watch::Receiver<bool>) {
        info!(plugin = %self.name(), "Dedicated runner started");
        loop {
            let wakeup = self.next_wakeup();
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                routed = rx.recv() => match routed {
                    Some(routed) => self.process(routed).await,
                    None => {
                        warn!(plugin = %self.name(), "Event queue closed");
                        break;
                    }
                },
                _ = sleep_for(wakeup) => self.timeout().await,
            }
        }
        while let Ok(routed) = rx.try_recv() {
            self.process(routed).await;
        }
        info!(plugin = %self.name(), "Dedicated runner stopped");
    }
}
