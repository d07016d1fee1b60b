use super::Message;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Sender name carried by externally sourced events.
pub const ROUTER_SENDER: &str = "router";

/// Coarse event type plugins declare interest in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Message,
    Reaction,
    Stream,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Message => write!(f, "message"),
            EventKind::Reaction => write!(f, "reaction"),
            EventKind::Stream => write!(f, "stream"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionOp {
    Add,
    Remove,
}

/// An emoji reaction added to or removed from a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub op: ReactionOp,
    pub message_id: i64,
    pub user_id: i64,
    pub emoji_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamOp {
    Create,
    Delete,
    Update,
}

/// A channel lifecycle change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamChange {
    pub op: StreamOp,
    pub stream_id: i64,
    pub name: String,
}

/// Raw event shape as produced by the transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlatformEvent {
    Message(Message),
    Reaction(Reaction),
    Stream(StreamChange),
}

impl PlatformEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            PlatformEvent::Message(_) => EventKind::Message,
            PlatformEvent::Reaction(_) => EventKind::Reaction,
            PlatformEvent::Stream(_) => EventKind::Stream,
        }
    }
}

/// Lifecycle command for a named plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "plugin", rename_all = "snake_case")]
pub enum ControlEvent {
    Start(String),
    Stop(String),
    Reload(String),
}

impl ControlEvent {
    pub fn target(&self) -> &str {
        match self {
            ControlEvent::Start(name) | ControlEvent::Stop(name) | ControlEvent::Reload(name) => name,
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            ControlEvent::Start(_) => "start",
            ControlEvent::Stop(_) => "stop",
            ControlEvent::Reload(_) => "reload",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", content = "event", rename_all = "snake_case")]
pub enum EventPayload {
    Platform(PlatformEvent),
    Control(ControlEvent),
    /// Platform-shaped event fabricated by a plugin.
    Loopback(PlatformEvent),
}

/// Unit of work flowing through the router
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    /// Plugin that produced the event, or [`ROUTER_SENDER`].
    pub sender: String,
    pub payload: EventPayload,
}

impl Event {
    pub fn platform(event: PlatformEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender: ROUTER_SENDER.to_string(),
            payload: EventPayload::Platform(event),
        }
    }

    pub fn loopback(sender: impl Into<String>, event: PlatformEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender: sender.into(),
            payload: EventPayload::Loopback(event),
        }
    }

    pub fn control(sender: impl Into<String>, control: ControlEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender: sender.into(),
            payload: EventPayload::Control(control),
        }
    }

    /// The platform-shaped body, for external and loopback events alike.
    pub fn platform_event(&self) -> Option<&PlatformEvent> {
        match &self.payload {
            EventPayload::Platform(ev) | EventPayload::Loopback(ev) => Some(ev),
            EventPayload::Control(_) => None,
        }
    }

    pub fn platform_event_mut(&mut self) -> Option<&mut PlatformEvent> {
        match &mut self.payload {
            EventPayload::Platform(ev) | EventPayload::Loopback(ev) => Some(ev),
            EventPayload::Control(_) => None,
        }
    }

    pub fn kind(&self) -> Option<EventKind> {
        self.platform_event().map(PlatformEvent::kind)
    }

    pub fn message(&self) -> Option<&Message> {
        match self.platform_event() {
            Some(PlatformEvent::Message(msg)) => Some(msg),
            _ => None,
        }
    }

    pub fn reaction(&self) -> Option<&Reaction> {
        match self.platform_event() {
            Some(PlatformEvent::Reaction(reaction)) => Some(reaction),
            _ => None,
        }
    }

    pub fn control_event(&self) -> Option<&ControlEvent> {
        match &self.payload {
            EventPayload::Control(control) => Some(control),
            _ => None,
        }
    }

    /// Derived command name if this is a message addressed to the bot.
    pub fn command_name(&self) -> Option<&str> {
        self.message().and_then(Message::command_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_exposes_platform_body() {
        let msg = Message::private(7, 1, vec![1, 2], "hello");
        let event = Event::loopback("jobs", PlatformEvent::Message(msg.clone()));
        assert_eq!(event.sender, "jobs");
        assert_eq!(event.kind(), Some(EventKind::Message));
        assert_eq!(event.message(), Some(&msg));
    }

    #[test]
    fn control_has_no_kind() {
        let event = Event::control("plugin", ControlEvent::Stop("greet".into()));
        assert_eq!(event.kind(), None);
        assert_eq!(event.control_event().map(ControlEvent::target), Some("greet"));
    }

    #[test]
    fn serialized_loopback_keeps_shape() {
        let reaction = Reaction {
            op: ReactionOp::Add,
            message_id: 3,
            user_id: 4,
            emoji_name: "check".into(),
        };
        let event = Event::loopback("exec_prompt", PlatformEvent::Reaction(reaction));
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
