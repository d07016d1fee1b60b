//! Domain layer - Core types with no knowledge of the runtime
//!
//! This layer contains:
//! - Entities: messages, events, responses, identities
//! - Traits: the transport abstraction the runtime talks to

pub mod entities;
pub mod traits;
