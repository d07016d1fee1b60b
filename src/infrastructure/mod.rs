//! Infrastructure layer - External concerns
//!
//! This layer contains:
//! - Config: Configuration loading
//! - Database: SQLite persistence
//! - Adapters: Platform integrations

pub mod adapters;
pub mod config;
pub mod database;
