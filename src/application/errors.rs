//! Application layer errors

use std::time::Duration;
use thiserror::Error;

/// General bot errors
#[derive(Error, Debug)]
pub enum BotError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Plugin error: {0}")]
    Plugin(#[from] PluginError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors raised while building a command grammar.
///
/// These are configuration failures: a plugin whose grammar cannot be built
/// refuses to start.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GrammarError {
    #[error("Subcommand name must not be empty")]
    EmptyName,

    #[error("Subcommand '{0}' is already defined")]
    DuplicateSubcommand(String),

    #[error("Argument '{argument}' is declared twice in subcommand '{subcommand}'")]
    DuplicateArgument { subcommand: String, argument: String },

    #[error("Option '-{option}' is declared twice in subcommand '{subcommand}'")]
    DuplicateOption { subcommand: String, option: char },

    #[error("Option character '{0}' is not allowed")]
    InvalidOption(char),
}

/// Tokenizer failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenizeError {
    #[error("Unterminated quote opened at byte {0}")]
    UnterminatedQuote(usize),

    #[error("Quote at byte {0} touches an unquoted character")]
    MisplacedQuote(usize),
}

/// A typed converter rejected its input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Cannot convert '{input}': {reason}")]
pub struct ConversionError {
    pub input: String,
    pub reason: String,
}

impl ConversionError {
    pub fn new(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            reason: reason.into(),
        }
    }
}

/// Plugin registration and ordering errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Plugin '{0}' already registered")]
    Duplicate(String),

    #[error("Plugin '{plugin}' depends on unknown plugin '{dependency}'")]
    UnknownDependency { plugin: String, dependency: String },

    #[error("Plugin dependency cycle detected among: {}", .0.join(", "))]
    DependencyCycle(Vec<String>),

    #[error("Plugin '{0}' not found")]
    NotFound(String),
}

/// Plugin execution errors
#[derive(Error, Debug)]
pub enum PluginError {
    #[error("Initialization failed: {0}")]
    Init(String),

    #[error("Handler failed: {0}")]
    Handler(String),

    #[error("Handler panicked: {0}")]
    Panic(String),

    #[error("Grammar error: {0}")]
    Grammar(#[from] GrammarError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Event queue closed")]
    QueueClosed,

    #[error("Event queue of '{0}' is full")]
    QueueFull(String),
}

/// Transport collaborator errors
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Connection closed")]
    Closed,
}

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Conflict: {0}")]
    Conflict(String),
}

impl StorageError {
    /// Whether the error is a unique/primary key violation.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            StorageError::Sqlite(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation
        )
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Parse error: {0}")]
    Parse(String),
}
