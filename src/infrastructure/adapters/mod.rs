//! Platform adapters implementing [`Transport`](crate::domain::traits::Transport)

pub mod console;
#[cfg(test)]
pub mod memory;

pub use console::ConsoleAdapter;
