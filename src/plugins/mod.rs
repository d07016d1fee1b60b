//! Plugin system for keel-bot
//!
//! Plugins are registered once at startup and run either on the shared
//! workers or in a dedicated context of their own.

pub mod builtin;
pub mod manager;
pub mod registry;
pub mod runner;
pub mod trait_def;

pub use manager::{PluginInfo, PluginManager};
pub use registry::PluginRegistry;
pub use trait_def::{ConcurrencyMode, Plugin, PluginContext, PluginDefinition, PluginDescriptor};
