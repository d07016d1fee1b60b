//! Plugin manager - handles plugin lifecycle and the runtime around it

use super::registry::PluginRegistry;
use super::runner::{self, RunnerHandle};
use super::trait_def::{ConcurrencyMode, PluginContext, PluginDefinition};
use crate::application::errors::{BotError, RegistryError, TransportError};
use crate::application::loopback::{self, LoopbackHandle};
use crate::application::messaging::{Router, Worker};
use crate::application::services::{MessageService, PluginCatalog};
use crate::domain::entities::Event;
use crate::domain::traits::Transport;
use crate::infrastructure::config::RuntimeConfig;
use crate::infrastructure::database::Storage;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Summary of a registered plugin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginInfo {
    pub name: String,
    pub description: String,
    pub mode: ConcurrencyMode,
    pub dependencies: Vec<String>,
    pub running: bool,
}

/// Manages all plugins for the bot
pub struct PluginManager {
    registry: Arc<PluginRegistry>,
}

impl PluginManager {
    /// Register `definitions` in dependency order. Every plugin starts
    /// running unless it is listed in `disabled`.
    pub fn new(definitions: Vec<Arc<dyn PluginDefinition>>, disabled: &[String]) -> Result<Self, RegistryError> {
        let mut registry = PluginRegistry::new();
        for definition in definitions {
            debug!(plugin = %definition.name(), "Registering plugin");
            registry.register(definition)?;
        }
        let registry = registry.into_start_order()?;

        for name in disabled {
            if registry.get(name).is_none() {
                warn!(plugin = %name, "Disabled plugin is not registered");
            }
        }
        for name in registry.names() {
            registry.set_running(name, !disabled.iter().any(|d| d == name))?;
        }
        Ok(Self {
            registry: Arc::new(registry),
        })
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    /// List all registered plugins in start order
    pub fn list_plugins(&self) -> Vec<PluginInfo> {
        self.registry
            .iter()
            .map(|entry| {
                let descriptor = entry.descriptor();
                PluginInfo {
                    name: entry.name().to_string(),
                    description: descriptor.description.to_string(),
                    mode: descriptor.mode,
                    dependencies: descriptor.dependencies.iter().map(|d| d.to_string()).collect(),
                    running: entry.state().is_running(),
                }
            })
            .collect()
    }

    /// Run until Ctrl-C or until the transport closes.
    pub async fn run(
        &self,
        transport: Arc<dyn Transport>,
        storage: Storage,
        runtime: &RuntimeConfig,
    ) -> Result<(), BotError> {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Cannot listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        };
        self.run_until(transport, storage, runtime, ctrl_c).await
    }

    /// Run until `stop` completes or until the transport closes.
    ///
    /// Plugins are instantiated in start order; each dedicated context has
    /// finished its initialization before the next plugin is started.
    pub async fn run_until(
        &self,
        transport: Arc<dyn Transport>,
        storage: Storage,
        runtime: &RuntimeConfig,
        stop: impl Future<Output = ()>,
    ) -> Result<(), BotError> {
        let identity = transport.identity();
        info!(bot = %identity.full_name, plugins = self.registry.len(), workers = runtime.workers, "Starting bot");
        PluginCatalog::new(&storage)?.publish(&self.registry)?;

        let (loopback, queue) = loopback::channel();
        let context = PluginContext {
            identity: identity.clone(),
            transport: Arc::clone(&transport),
            storage,
            loopback: loopback.clone(),
        };
        let router = Arc::new(Router::new(
            Arc::clone(&self.registry),
            identity,
            MessageService::new(Arc::clone(&transport)),
        ));

        let (runner_stop_tx, runner_stop_rx) = watch::channel(false);
        let mut workers: Vec<Worker> = (0..runtime.workers)
            .map(|id| Worker::new(id, Arc::clone(&router), context.clone()))
            .collect();
        let mut runners: Vec<RunnerHandle> = Vec::new();

        for entry in self.registry.iter() {
            let started = if entry.descriptor().mode.is_dedicated() {
                runner::spawn(entry, context.clone(), runtime.queue_limit, runner_stop_rx.clone())
                    .await
                    .map(|handle| {
                        router.attach_dedicated(entry.name(), handle.sender());
                        runners.push(handle);
                    })
            } else {
                workers.iter_mut().try_for_each(|worker| worker.prepare(entry))
            };
            if let Err(e) = started {
                error!(plugin = %entry.name(), error = %e, "Plugin failed to start");
                let _ = runner_stop_tx.send(true);
                router.detach_all();
                join_runners(runners).await;
                return Err(e.into());
            }
            info!(
                plugin = %entry.name(),
                mode = %entry.descriptor().mode,
                running = entry.state().is_running(),
                "Plugin ready"
            );
        }

        let (worker_stop_tx, worker_stop_rx) = watch::channel(false);
        let worker_tasks: Vec<_> = workers
            .into_iter()
            .map(|worker| tokio::spawn(worker.run(queue.clone(), worker_stop_rx.clone())))
            .collect();

        let (pump_stop_tx, pump_stop_rx) = watch::channel(false);
        let mut pump = tokio::spawn(pump_events(Arc::clone(&transport), loopback, pump_stop_rx));
        let stopped = tokio::select! {
            _ = stop => true,
            result = &mut pump => {
                if let Err(e) = result {
                    error!(error = %e, "Event pump panicked");
                }
                false
            }
        };
        if stopped {
            info!("Shutdown requested");
            let _ = pump_stop_tx.send(true);
            if let Err(e) = pump.await {
                error!(error = %e, "Event pump panicked");
            }
        }

        let _ = worker_stop_tx.send(true);
        for task in worker_tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Worker panicked");
            }
        }
        let _ = runner_stop_tx.send(true);
        router.detach_all();
        join_runners(runners).await;
        info!("Bot stopped");
        Ok(())
    }
}

async fn join_runners(runners: Vec<RunnerHandle>) {
    if runners.is_empty() {
        return;
    }
    let joined = tokio::task::spawn_blocking(move || {
        for handle in runners {
            debug!(plugin = %handle.name(), "Waiting for dedicated context");
            handle.join();
        }
    })
    .await;
    if let Err(e) = joined {
        error!(error = %e, "Joining dedicated contexts failed");
    }
}

/// Long-poll the transport and queue every platform event.
async fn pump_events(transport: Arc<dyn Transport>, loopback: LoopbackHandle, mut stop: watch::Receiver<bool>) {
    let mut backoff = INITIAL_BACKOFF;
    loop {
        let polled = tokio::select! {
            biased;
            _ = stop.changed() => return,
            polled = transport.next_events() => polled,
        };
        let wait = match polled {
            Ok(events) => {
                backoff = INITIAL_BACKOFF;
                for event in events {
                    if loopback.push(Event::platform(event)).is_err() {
                        warn!("Event queue closed, stopping event pump");
                        return;
                    }
                }
                continue;
            }
            Err(TransportError::Closed) => {
                info!("Transport closed");
                return;
            }
            Err(TransportError::RateLimited { retry_after }) => retry_after,
            Err(e) => {
                let wait = backoff;
                backoff = (backoff * 2).min(MAX_BACKOFF);
                warn!(error = %e, retry_in = ?wait, "Polling events failed");
                wait
            }
        };
        tokio::select! {
            biased;
            _ = stop.changed() => return,
            _ = tokio::time::sleep(wait) => {}
        }
    }
}
