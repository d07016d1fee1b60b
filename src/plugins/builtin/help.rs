//! `help` - usage information rendered from the plugin catalog

use crate::application::errors::PluginError;
use crate::application::messaging::tokenize;
use crate::application::services::PluginCatalog;
use crate::domain::entities::{Event, EventKind, Response};
use crate::plugins::trait_def::{ConcurrencyMode, Plugin, PluginContext, PluginDefinition, PluginDescriptor};
use async_trait::async_trait;

static DESCRIPTOR: PluginDescriptor = PluginDescriptor {
    name: "help",
    description: "Post a help message to the requesting user.",
    events: &[EventKind::Message],
    dependencies: &[],
    mode: ConcurrencyMode::SharedWorker,
};

pub struct HelpPlugin;

impl PluginDefinition for HelpPlugin {
    fn descriptor(&self) -> &PluginDescriptor {
        &DESCRIPTOR
    }

    fn syntax(&self) -> String {
        "help [<command>]".to_string()
    }

    fn instantiate(&self, ctx: PluginContext) -> Result<Box<dyn Plugin>, PluginError> {
        Ok(Box::new(HelpInstance {
            catalog: PluginCatalog::new(&ctx.storage)?,
        }))
    }
}

struct HelpInstance {
    catalog: PluginCatalog,
}

#[async_trait]
impl Plugin for HelpInstance {
    async fn handle_event(&mut self, event: &Event) -> Result<Vec<Response>, PluginError> {
        let Some(message) = event.message() else {
            return Ok(Vec::new());
        };
        let args = tokenize(message.command_text().unwrap_or_default()).unwrap_or_default();
        let text = match args.as_slice() {
            [] => Some(self.catalog.render_overview(&message.sender_full_name)?),
            [command] => self.catalog.render_command(command)?,
            _ => None,
        };
        Ok(vec![match text {
            Some(text) => Response::private(message.sender_id, text),
            None => Response::command_not_found(message),
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::Destination;
    use crate::plugins::builtin::builtins;
    use crate::plugins::registry::PluginRegistry;
    use crate::test_support::{Harness, USER_ID};

    async fn help(content: &str) -> Response {
        let h = Harness::new();
        let mut registry = PluginRegistry::new();
        for def in builtins() {
            registry.register(def).unwrap();
        }
        PluginCatalog::new(&h.storage).unwrap().publish(&registry).unwrap();

        let mut plugin = HelpPlugin.instantiate(h.context()).unwrap();
        let mut responses = plugin.handle_event(&h.command_event(4, content)).await.unwrap();
        assert_eq!(responses.len(), 1);
        responses.remove(0)
    }

    #[tokio::test]
    async fn overview_lists_command_plugins_privately() {
        let Response::Message { destination, content } = help("help").await else {
            panic!("expected message");
        };
        assert_eq!(destination, Destination::user(USER_ID));
        assert!(content.starts_with("Hi Ada!"));
        assert!(content.contains("- conf\n"));
        assert!(content.contains("- jobs\n"));
        // Plugins without a syntax are not commands.
        assert!(!content.contains("- greet"));
        assert!(!content.contains("- exec_prompt"));
    }

    #[tokio::test]
    async fn command_help_shows_syntax_and_description() {
        let Response::Message { content, .. } = help("help conf").await else {
            panic!("expected message");
        };
        assert!(content.contains("conf set <key> <value>"));
        assert!(content.contains("Privileged."));
    }

    #[tokio::test]
    async fn unknown_command() {
        let Response::Message { content, .. } = help("help ghost").await else {
            panic!("expected message");
        };
        assert!(content.contains("cannot understand"));
    }
}
