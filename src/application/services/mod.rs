//! Application services - Delivery and help catalog

pub mod catalog;
pub mod message_service;

pub use catalog::PluginCatalog;
pub use message_service::MessageService;
