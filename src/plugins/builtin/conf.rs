//! `conf` - manage the key/value configuration table

use super::command_syntax;
use crate::application::errors::{GrammarError, PluginError};
use crate::application::messaging::{converters, CommandParser, SubcommandSpec};
use crate::domain::entities::{Event, EventKind, Message, Response};
use crate::infrastructure::database::Conf;
use crate::plugins::trait_def::{ConcurrencyMode, Plugin, PluginContext, PluginDefinition, PluginDescriptor};
use async_trait::async_trait;
use tracing::info;

static DESCRIPTOR: PluginDescriptor = PluginDescriptor {
    name: "conf",
    description: "Set, remove and list configuration values. Privileged.",
    events: &[EventKind::Message],
    dependencies: &[],
    mode: ConcurrencyMode::SharedWorker,
};

fn grammar() -> Result<CommandParser, GrammarError> {
    CommandParser::new()
        .with(
            SubcommandSpec::new("set")
                .arg("key", converters::string())
                .arg("value", converters::string())
                .description("Set `key` to `value`."),
        )?
        .with(
            SubcommandSpec::new("remove")
                .arg("key", converters::string())
                .description("Remove `key`."),
        )?
        .with(SubcommandSpec::new("list").description("List all values."))
}

pub struct ConfPlugin;

impl PluginDefinition for ConfPlugin {
    fn descriptor(&self) -> &PluginDescriptor {
        &DESCRIPTOR
    }

    fn syntax(&self) -> String {
        grammar()
            .map(|g| command_syntax(DESCRIPTOR.name, &g))
            .unwrap_or_default()
    }

    fn instantiate(&self, ctx: PluginContext) -> Result<Box<dyn Plugin>, PluginError> {
        Ok(Box::new(ConfInstance {
            conf: Conf::new(&ctx.storage)?,
            grammar: grammar()?,
            ctx,
        }))
    }
}

struct ConfInstance {
    ctx: PluginContext,
    conf: Conf,
    grammar: CommandParser,
}

impl ConfInstance {
    fn render_list(&self, message: &Message) -> Result<Response, PluginError> {
        let entries = self.conf.list()?;
        if entries.is_empty() {
            return Ok(Response::reply(message, "No configuration values set."));
        }
        let rows: Vec<String> = entries.iter().map(|(k, v)| format!("{} = {}", k, v)).collect();
        Ok(Response::reply(message, format!("```text\n{}\n```", rows.join("\n"))))
    }
}

#[async_trait]
impl Plugin for ConfInstance {
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

        let key = cmd.str_arg("key").unwrap_or_default();
        let response = match cmd.name.as_str() {
            "set" => {
                let value = cmd.str_arg("value").unwrap_or_default();
                self.conf.set(key, value)?;
                info!(key = %key, user = message.sender_id, "Configuration value set");
                Response::ok(message)
            }
            "remove" => {
                if self.conf.remove(key)? {
                    info!(key = %key, user = message.sender_id, "Configuration value removed");
                }
                Response::ok(message)
            }
            _ => self.render_list(message)?,
        };
        Ok(vec![response])
    }
}
