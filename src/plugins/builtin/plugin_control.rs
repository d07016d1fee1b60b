//! `plugin` - start, stop and reload plugins at runtime

use super::command_syntax;
use crate::application::errors::{GrammarError, PluginError};
use crate::application::messaging::{converters, CommandParser, SubcommandSpec};
use crate::application::services::PluginCatalog;
use crate::domain::entities::{ControlEvent, Event, EventKind, Response};
use crate::plugins::trait_def::{ConcurrencyMode, Plugin, PluginContext, PluginDefinition, PluginDescriptor};
use async_trait::async_trait;

const NAME: &str = "plugin";

static DESCRIPTOR: PluginDescriptor = PluginDescriptor {
    name: NAME,
    description: "Start, stop or reload a plugin. Privileged.",
    events: &[EventKind::Message],
    dependencies: &[],
    mode: ConcurrencyMode::SharedWorker,
};

fn grammar() -> Result<CommandParser, GrammarError> {
    let mut parser = CommandParser::new();
    for (action, text) in [
        ("reload", "Re-run the plugin's initialization."),
        ("start", "Resume event delivery to the plugin."),
        ("stop", "Stop delivering events to the plugin."),
    ] {
        parser.add_subcommand(
            SubcommandSpec::new(action)
                .arg("plugin", converters::string())
                .description(text),
        )?;
    }
    Ok(parser)
}

pub struct PluginControl;

impl PluginDefinition for PluginControl {
    fn descriptor(&self) -> &PluginDescriptor {
        &DESCRIPTOR
    }

    fn syntax(&self) -> String {
        grammar().map(|g| command_syntax(NAME, &g)).unwrap_or_default()
    }

    fn instantiate(&self, ctx: PluginContext) -> Result<Box<dyn Plugin>, PluginError> {
        Ok(Box::new(PluginControlInstance {
            catalog: PluginCatalog::new(&ctx.storage)?,
            grammar: grammar()?,
            ctx,
        }))
    }
}

struct PluginControlInstance {
    ctx: PluginContext,
    catalog: PluginCatalog,
    grammar: CommandParser,
}

#[async_trait]
impl Plugin for PluginControlInstance {
    async fn handle_event(&mut self, event: &Event) -> Result<Vec<Response>, PluginError> {
        let Some(message) = event.message() else {
            return Ok(Vec::new());
        };
        if !self.ctx.user_is_privileged(message.sender_id).await? {
            return Ok(vec![Response::privilege_error(message)]);
        }
        let Some(cmd) = self.grammar.parse(message.command_text().unwrap_or_default()).matched() else {
            return Ok(vec![Response::command_not_found(message)]);
        };

        let target = cmd.str_arg("plugin").unwrap_or_default().to_string();
        if !self.catalog.contains(&target)? {
            return Ok(vec![Response::reply(message, format!("There is no plugin named `{}`.", target))]);
        }
        let control = match cmd.name.as_str() {
            "start" => ControlEvent::Start(target),
            "stop" if target == NAME => {
                return Ok(vec![Response::reply(message, "I refuse to stop the plugin that could start me again.")]);
            }
            "stop" => ControlEvent::Stop(target),
            _ => ControlEvent::Reload(target),
        };
        self.ctx.loopback.push(Event::control(NAME, control))?;
        Ok(vec![Response::ok(message)])
    }
}
