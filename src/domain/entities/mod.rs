//! Domain entities - Core business objects with no external dependencies

pub mod command;
pub mod event;
pub mod message;
pub mod response;
pub mod user;

pub use command::CommandLine;
pub use event::{
    ControlEvent, Event, EventKind, EventPayload, PlatformEvent, Reaction, ReactionOp,
    StreamChange, StreamOp, ROUTER_SENDER,
};
pub use message::{Message, MessageKind};
pub use response::{Destination, Response};
pub use user::{BotIdentity, User};
