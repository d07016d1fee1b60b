//! Plugins shipped with the bot

pub mod conf;
pub mod exec_prompt;
pub mod greet;
pub mod help;
pub mod jobs;
pub mod plugin_control;

use super::trait_def::PluginDefinition;
use crate::application::messaging::CommandParser;
use std::sync::Arc;

/// Every built-in plugin, in registration order.
pub fn builtins() -> Vec<Arc<dyn PluginDefinition>> {
    vec![
        Arc::new(conf::ConfPlugin),
        Arc::new(plugin_control::PluginControl),
        Arc::new(help::HelpPlugin),
        Arc::new(greet::GreetPlugin),
        Arc::new(jobs::JobsPlugin),
        Arc::new(exec_prompt::ExecPromptPlugin),
    ]
}

/// Usage lines of a command plugin, each prefixed with the command name.
pub(crate) fn command_syntax(command: &str, grammar: &CommandParser) -> String {
    grammar
        .generate_syntax()
        .lines()
        .map(|line| format!("{} {}", command, line))
        .collect::<Vec<_>>()
        .join("\n")
}
