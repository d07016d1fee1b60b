//! Application layer - Use cases and business logic
//!
//! This layer contains:
//! - Errors: Domain-specific errors
//! - Messaging: Tokenizing, grammar matching and event routing
//! - Services: Response delivery and the plugin catalog
//! - Loopback and Scheduler: events the bot sends to itself

pub mod errors;
pub mod loopback;
pub mod messaging;
pub mod scheduler;
pub mod services;
