//! `jobs` - schedule commands for later execution

use super::command_syntax;
use super::exec_prompt::approve_emoji;
use crate::application::errors::{ConversionError, GrammarError, PluginError, StorageError};
use crate::application::messaging::tokenizer::{join, quote};
use crate::application::messaging::parser::Converter;
use crate::application::messaging::{converters, CommandParser, ParsedCommand, SubcommandSpec, Value};
use crate::application::scheduler::{canonical_timestamp, parse_timestamp, Job, JobStore, Scheduler};
use crate::domain::entities::{Event, EventKind, Message, PlatformEvent, Response};
use crate::plugins::trait_def::{ConcurrencyMode, Plugin, PluginContext, PluginDefinition, PluginDescriptor};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

const NAME: &str = "jobs";
const DEFAULT_LIST_LIMIT: i64 = 10;
/// Sender of fired jobs. Differs from [`NAME`] so a scheduled `jobs` command
/// still reaches this plugin.
const FIRED_SENDER: &str = "jobs:fire";

static DESCRIPTOR: PluginDescriptor = PluginDescriptor {
    name: NAME,
    description: "Schedule a command for execution at a given time (ISO 8601, e.g. \
                  `2030-01-31 14:00`, local time unless an offset is given). Privileged.",
    events: &[EventKind::Message],
    dependencies: &["conf"],
    mode: ConcurrencyMode::DedicatedThread,
};

fn limit() -> Converter {
    Arc::new(|s: &str| {
        if s.is_empty() {
            return Ok(Value::Int(DEFAULT_LIST_LIMIT));
        }
        match s.parse::<i64>() {
            Ok(n) if n > 0 => Ok(Value::Int(n)),
            _ => Err(ConversionError::new(s, "expected a positive number")),
        }
    })
}

fn grammar() -> Result<CommandParser, GrammarError> {
    CommandParser::new()
        .with(
            SubcommandSpec::new("add")
                .flag('p')
                .arg("timestamp", converters::string())
                .arg("command", converters::string())
                .greedy()
                .description("Schedule `command`; with `-p`, ask for approval first."),
        )?
        .with(
            SubcommandSpec::new("remove")
                .arg("timestamp", converters::string())
                .description("Remove the job scheduled at `timestamp`."),
        )?
        .with(
            SubcommandSpec::new("list")
                .opt('n', limit())
                .description("List the jobs, or only the last ones with `-n`."),
        )
}

pub struct JobsPlugin;

impl PluginDefinition for JobsPlugin {
    fn descriptor(&self) -> &PluginDescriptor {
        &DESCRIPTOR
    }

    fn syntax(&self) -> String {
        grammar().map(|g| command_syntax(NAME, &g)).unwrap_or_default()
    }

    fn instantiate(&self, ctx: PluginContext) -> Result<Box<dyn Plugin>, PluginError> {
        let mut scheduler = Scheduler::new(JobStore::new(&ctx.storage)?, ctx.loopback.clone(), FIRED_SENDER);
        scheduler.reload(Utc::now())?;
        Ok(Box::new(Jobs {
            grammar: grammar()?,
            scheduler,
            ctx,
        }))
    }
}

struct Jobs {
    ctx: PluginContext,
    grammar: CommandParser,
    scheduler: Scheduler,
}

fn describe(job: &Job) -> String {
    let command = serde_json::from_str::<PlatformEvent>(&job.fabricated_event)
        .ok()
        .and_then(|event| match event {
            PlatformEvent::Message(message) => Some(message.content),
            _ => None,
        })
        .unwrap_or_else(|| "?".to_string());
    format!("{}  {}  {}", job.timestamp, job.result, command)
}

impl Jobs {
    fn add(&mut self, message: &Message, cmd: &ParsedCommand, now: DateTime<Utc>) -> Result<Response, PluginError> {
        let timestamp = cmd.str_arg("timestamp").unwrap_or_default();
        let tokens: Vec<String> = cmd
            .arg("command")
            .as_list()
            .unwrap_or_default()
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();
        let command = join(&tokens);

        let at = match parse_timestamp(timestamp) {
            Ok(at) => at,
            Err(_) => {
                return Ok(Response::reply(
                    message,
                    format!("`{}` is not a valid time. Try e.g. `2030-01-31 14:00`.", timestamp),
                ))
            }
        };
        if at < now {
            return Ok(Response::reply(message, format!("{} has already passed.", canonical_timestamp(at))));
        }

        if cmd.flag('p') {
            let request = format!("{} add {} {}", NAME, quote(timestamp), command);
            return Ok(Response::approval_request(message, &request, &approve_emoji(&self.ctx.storage)?));
        }

        let fabricated = message.redirected_command(self.ctx.identity.user_id, &command);
        match self
            .scheduler
            .add(at, &PlatformEvent::Message(fabricated), message.sender_id, now)
        {
            Ok(_) => Ok(Response::ok(message)),
            Err(StorageError::Conflict(reason)) => Ok(Response::reply(message, format!("{}.", reason))),
            Err(e) => Err(e.into()),
        }
    }

    fn remove(&mut self, message: &Message, cmd: &ParsedCommand, now: DateTime<Utc>) -> Result<Response, PluginError> {
        let raw = cmd.str_arg("timestamp").unwrap_or_default();
        let timestamp = parse_timestamp(raw)
            .map(canonical_timestamp)
            .unwrap_or_else(|_| raw.to_string());
        if self.scheduler.remove(&timestamp, now)? {
            Ok(Response::ok(message))
        } else {
            Ok(Response::reply(message, format!("There is no job at {}.", timestamp)))
        }
    }

    fn list(&self, message: &Message, cmd: &ParsedCommand) -> Result<Response, PluginError> {
        let jobs = self.scheduler.store().list()?;
        if jobs.is_empty() {
            return Ok(Response::reply(message, "No jobs scheduled."));
        }
        let skip = match cmd.opt('n') {
            Value::Int(n) => jobs.len().saturating_sub(*n as usize),
            _ => 0,
        };
        let rows: Vec<String> = jobs.iter().skip(skip).map(describe).collect();
        Ok(Response::reply(message, format!("```text\n{}\n```", rows.join("\n"))))
    }
}

#[async_trait]
impl Plugin for Jobs {
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
        let now = Utc::now();
        let response = match cmd.name.as_str() {
            "add" => self.add(message, &cmd, now)?,
            "remove" => self.remove(message, &cmd, now)?,
            _ => self.list(message, &cmd)?,
        };
        Ok(vec![response])
    }

    fn next_wakeup(&self) -> Option<DateTime<Utc>> {
        self.scheduler.next_wakeup()
    }

    async fn handle_timeout(&mut self) -> Result<Vec<Response>, PluginError> {
        self.scheduler.fire(Utc::now())?;
        Ok(Vec::new())
    }
}
