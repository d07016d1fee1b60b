//! Plugin registry - static plugin definitions plus their running state

use super::trait_def::{PluginDefinition, PluginDescriptor};
use crate::application::errors::RegistryError;
use crate::domain::entities::ControlEvent;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

/// Mutable lifecycle state of one plugin
#[derive(Debug)]
pub struct PluginState {
    running: AtomicBool,
    generation: AtomicU64,
}

impl PluginState {
    fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Incremented on every reload; instances built for an older generation
    /// are stale.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

pub struct RegisteredPlugin {
    definition: Arc<dyn PluginDefinition>,
    state: Arc<PluginState>,
}

impl RegisteredPlugin {
    pub fn name(&self) -> &'static str {
        self.definition.name()
    }

    pub fn descriptor(&self) -> &PluginDescriptor {
        self.definition.descriptor()
    }

    pub fn definition(&self) -> &Arc<dyn PluginDefinition> {
        &self.definition
    }

    pub fn state(&self) -> &Arc<PluginState> {
        &self.state
    }
}

/// Registry of all plugins known to the process
///
/// Built once at startup; afterwards only the per-plugin state changes.
#[derive(Default)]
pub struct PluginRegistry {
    entries: Vec<RegisteredPlugin>,
    index: HashMap<&'static str, usize>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, definition: Arc<dyn PluginDefinition>) -> Result<(), RegistryError> {
        let name = definition.name();
        if self.index.contains_key(name) {
            return Err(RegistryError::Duplicate(name.to_string()));
        }
        self.index.insert(name, self.entries.len());
        self.entries.push(RegisteredPlugin {
            definition,
            state: Arc::new(PluginState::new()),
        });
        Ok(())
    }

    /// Dependency order over all registered plugins.
    ///
    /// Kahn's algorithm; among plugins whose dependencies are satisfied the
    /// one registered first goes first, so the order is stable.
    pub fn resolve_start_order(&self) -> Result<Vec<&'static str>, RegistryError> {
        let n = self.entries.len();
        let mut in_degree = vec![0usize; n];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];

        for (i, entry) in self.entries.iter().enumerate() {
            for dep in entry.descriptor().dependencies {
                let Some(&j) = self.index.get(dep) else {
                    return Err(RegistryError::UnknownDependency {
                        plugin: entry.name().to_string(),
                        dependency: dep.to_string(),
                    });
                };
                dependents[j].push(i);
                in_degree[i] += 1;
            }
        }

        let mut ready: BTreeSet<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(i) = ready.pop_first() {
            order.push(self.entries[i].name());
            for &j in &dependents[i] {
                in_degree[j] -= 1;
                if in_degree[j] == 0 {
                    ready.insert(j);
                }
            }
        }

        if order.len() != n {
            let cycle = (0..n)
                .filter(|&i| in_degree[i] > 0)
                .map(|i| self.entries[i].name().to_string())
                .collect();
            return Err(RegistryError::DependencyCycle(cycle));
        }
        Ok(order)
    }

    /// Reorder the entries into start order, which is also dispatch order.
    pub fn into_start_order(mut self) -> Result<Self, RegistryError> {
        let order = self.resolve_start_order()?;
        let rank: HashMap<&str, usize> = order.iter().enumerate().map(|(i, n)| (*n, i)).collect();
        self.entries.sort_by_key(|e| rank.get(e.name()).copied().unwrap_or(usize::MAX));
        self.index = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.name(), i))
            .collect();
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredPlugin> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredPlugin> {
        self.entries.iter()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(RegisteredPlugin::name).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.get(name).map(|e| e.state.is_running()).unwrap_or(false)
    }

    /// Set the running flag, returning the previous value.
    pub fn set_running(&self, name: &str, running: bool) -> Result<bool, RegistryError> {
        let entry = self
            .get(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        Ok(entry.state.running.swap(running, Ordering::AcqRel))
    }

    /// Invalidate every instance of the plugin, returning the new generation.
    pub fn bump_generation(&self, name: &str) -> Result<u64, RegistryError> {
        let entry = self
            .get(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        Ok(entry.state.generation.fetch_add(1, Ordering::AcqRel) + 1)
    }

    /// Apply a lifecycle command to the registry state.
    pub fn apply(&self, control: &ControlEvent) -> Result<(), RegistryError> {
        match control {
            ControlEvent::Start(name) => {
                if !self.set_running(name, true)? {
                    info!(plugin = %name, "Plugin started");
                }
            }
            ControlEvent::Stop(name) => {
                if self.set_running(name, false)? {
                    info!(plugin = %name, "Plugin stopped");
                }
            }
            ControlEvent::Reload(name) => {
                let generation = self.bump_generation(name)?;
                info!(plugin = %name, generation, "Plugin reload requested");
            }
        }
        Ok(())
    }
}
