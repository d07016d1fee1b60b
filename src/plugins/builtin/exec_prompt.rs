//! `exec_prompt` - run a command once its requester approved it
//!
//! Commands that need confirmation are posted back as an approval request
//! (see [`Response::approval_request`]). When the original requester reacts
//! to that request with the approval emoji, the command is injected as if
//! they had sent it.

use crate::application::errors::{PluginError, StorageError, TransportError};
use crate::domain::entities::response::APPROVE_EMOJI;
use crate::domain::entities::{BotIdentity, Event, EventKind, PlatformEvent, ReactionOp, Response};
use crate::infrastructure::database::{Conf, Storage};
use crate::plugins::trait_def::{ConcurrencyMode, Plugin, PluginContext, PluginDefinition, PluginDescriptor};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex_lite::Regex;
use tracing::{debug, info, warn};

const NAME: &str = "exec_prompt";

/// Conf key overriding the approval emoji
pub const APPROVE_EMOJI_KEY: &str = "approve_emoji";

static ORIGINAL_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^original_message_id: (\d+)$").expect("valid regex"));
static COMMAND: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?ms)^command: (.+)").expect("valid regex"));

static DESCRIPTOR: PluginDescriptor = PluginDescriptor {
    name: NAME,
    description: "Execute commands whose execution was approved by reaction.",
    events: &[EventKind::Reaction],
    dependencies: &["conf"],
    mode: ConcurrencyMode::DedicatedProcess,
};

/// Emoji that approves a request.
pub fn approve_emoji(storage: &Storage) -> Result<String, StorageError> {
    Ok(Conf::new(storage)?
        .get(APPROVE_EMOJI_KEY)?
        .unwrap_or_else(|| APPROVE_EMOJI.to_string()))
}

/// Extract `(original_message_id, command)` from an approval request.
fn parse_request(content: &str) -> Option<(i64, String)> {
    let id = ORIGINAL_ID.captures(content)?.get(1)?.as_str().parse().ok()?;
    let command = COMMAND.captures(content)?.get(1)?.as_str().trim().to_string();
    Some((id, command))
}

pub struct ExecPromptPlugin;

impl PluginDefinition for ExecPromptPlugin {
    fn descriptor(&self) -> &PluginDescriptor {
        &DESCRIPTOR
    }

    fn is_responsible(&self, event: &Event, identity: &BotIdentity) -> bool {
        event
            .reaction()
            .map_or(false, |r| r.op == ReactionOp::Add && r.user_id != identity.user_id)
    }

    fn instantiate(&self, ctx: PluginContext) -> Result<Box<dyn Plugin>, PluginError> {
        // Fail early if the Conf table is unusable.
        approve_emoji(&ctx.storage)?;
        Ok(Box::new(ExecPrompt { ctx }))
    }
}

struct ExecPrompt {
    ctx: PluginContext,
}

#[async_trait]
impl Plugin for ExecPrompt {
    async fn handle_event(&mut self, event: &Event) -> Result<Vec<Response>, PluginError> {
        let Some(reaction) = event.reaction() else {
            return Ok(Vec::new());
        };
        if reaction.emoji_name != approve_emoji(&self.ctx.storage)? {
            return Ok(Vec::new());
        }

        let request = match self.ctx.transport.get_message(reaction.message_id).await {
            Ok(message) => message,
            Err(TransportError::NotFound(_)) => {
                debug!(message_id = reaction.message_id, "Reacted message is gone");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };
        if request.sender_id != self.ctx.identity.user_id {
            return Ok(Vec::new());
        }
        let Some((original_id, command)) = parse_request(&request.content) else {
            return Ok(Vec::new());
        };

        let original = self.ctx.transport.get_message(original_id).await?;
        if original.sender_id != reaction.user_id {
            warn!(
                user = reaction.user_id,
                requester = original.sender_id,
                "Approval by someone other than the requester ignored"
            );
            return Ok(Vec::new());
        }

        info!(user = reaction.user_id, command = %command, "Executing approved command");
        let fabricated = original.redirected_command(self.ctx.identity.user_id, &command);
        self.ctx
            .loopback
            .push(Event::loopback(NAME, PlatformEvent::Message(fabricated)))?;
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{Message, Reaction};
    use crate::test_support::{Harness, BOT_ID, USER_ID};

    fn reaction(message_id: i64, user_id: i64, emoji: &str) -> Event {
        Event::platform(PlatformEvent::Reaction(Reaction {
            op: ReactionOp::Add,
            message_id,
            user_id,
            emoji_name: emoji.to_string(),
        }))
    }

    /// Post the original request and the bot's approval request; returns the
    /// id of the latter.
    async fn prepare(h: &Harness) -> i64 {
        let original = h.private(50, "jobs add -p '2030-01-01 10:00' conf list");
        h.transport.store_message(original.clone());
        let Response::Message { destination, content } =
            Response::approval_request(&original, "jobs add \"2030-01-01 10:00\" conf list", APPROVE_EMOJI)
        else {
            panic!("expected message");
        };
        crate::domain::traits::Transport::send_message(&h.transport, &destination, &content)
            .await
            .unwrap()
    }

    #[test]
    fn parses_request() {
        let content = "Hi Ada!\nDo you want this?\noriginal_message_id: 17\ncommand: conf set a \"b c\"";
        assert_eq!(parse_request(content), Some((17, "conf set a \"b c\"".to_string())));
        assert_eq!(parse_request("command: x"), None);
    }

    #[test]
    fn ignores_own_and_removed_reactions() {
        let h = Harness::new();
        assert!(ExecPromptPlugin.is_responsible(&reaction(1, USER_ID, "check"), &h.identity));
        assert!(!ExecPromptPlugin.is_responsible(&reaction(1, BOT_ID, "check"), &h.identity));
        let removed = Event::platform(PlatformEvent::Reaction(Reaction {
            op: ReactionOp::Remove,
            message_id: 1,
            user_id: USER_ID,
            emoji_name: "check".into(),
        }));
        assert!(!ExecPromptPlugin.is_responsible(&removed, &h.identity));
    }

    #[tokio::test]
    async fn approval_by_requester_injects_command() {
        let h = Harness::new();
        let request_id = prepare(&h).await;
        let mut plugin = ExecPromptPlugin.instantiate(h.context()).unwrap();

        let responses = plugin.handle_event(&reaction(request_id, USER_ID, "check")).await.unwrap();
        assert!(responses.is_empty());

        let looped = h.looped();
        assert_eq!(looped.len(), 1);
        assert_eq!(looped[0].sender, "exec_prompt");
        let message: &Message = looped[0].message().unwrap();
        assert_eq!(message.content, "jobs add \"2030-01-01 10:00\" conf list");
        assert_eq!(message.sender_id, USER_ID);
        assert!(message.is_only_private_recipient(BOT_ID));
    }

    #[tokio::test]
    async fn approval_by_someone_else_is_ignored() {
        let h = Harness::new();
        let request_id = prepare(&h).await;
        let mut plugin = ExecPromptPlugin.instantiate(h.context()).unwrap();

        plugin.handle_event(&reaction(request_id, 77, "check")).await.unwrap();
        assert!(h.looped().is_empty());
    }

    #[tokio::test]
    async fn other_emoji_is_ignored_unless_configured() {
        let h = Harness::new();
        let request_id = prepare(&h).await;
        let mut plugin = ExecPromptPlugin.instantiate(h.context()).unwrap();

        plugin.handle_event(&reaction(request_id, USER_ID, "thumbs_up")).await.unwrap();
        assert!(h.looped().is_empty());

        Conf::new(&h.storage).unwrap().set(APPROVE_EMOJI_KEY, "thumbs_up").unwrap();
        plugin.handle_event(&reaction(request_id, USER_ID, "thumbs_up")).await.unwrap();
        assert_eq!(h.looped().len(), 1);
    }

    #[tokio::test]
    async fn reaction_to_foreign_message_is_ignored() {
        let h = Harness::new();
        h.transport.store_message(
            Message::private(60, USER_ID, vec![USER_ID, BOT_ID], "original_message_id: 50\ncommand: conf list"),
        );
        let mut plugin = ExecPromptPlugin.instantiate(h.context()).unwrap();

        plugin.handle_event(&reaction(60, USER_ID, "check")).await.unwrap();
        assert!(h.looped().is_empty());
    }
}
