//! Plugins table - usage records used for help text

use crate::application::errors::StorageError;
use crate::infrastructure::database::{Database, Storage};
use crate::plugins::registry::PluginRegistry;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub name: String,
    pub syntax: String,
    pub description: String,
}

pub struct PluginCatalog {
    db: Database,
}

impl PluginCatalog {
    const TABLE: &'static str = "Plugins";
    const SCHEMA: &'static str = "Name TEXT PRIMARY KEY, Syntax TEXT, Description TEXT";

    pub fn new(storage: &Storage) -> Result<Self, StorageError> {
        let db = storage.connect()?;
        db.checkout_table(Self::TABLE, Self::SCHEMA)?;
        Ok(Self { db })
    }

    /// Replace the table contents with the registered plugins.
    pub fn publish(&mut self, registry: &PluginRegistry) -> Result<(), StorageError> {
        let entries: Vec<CatalogEntry> = registry
            .iter()
            .map(|p| CatalogEntry {
                name: p.name().to_string(),
                syntax: p.definition().syntax(),
                description: p.descriptor().description.to_string(),
            })
            .collect();
        debug!(count = entries.len(), "Publishing plugin catalog");
        self.db.transaction(|tx| {
            tx.execute("DELETE FROM Plugins", [])?;
            for entry in &entries {
                tx.execute(
                    "INSERT INTO Plugins (Name, Syntax, Description) VALUES (?1, ?2, ?3)",
                    [&entry.name, &entry.syntax, &entry.description],
                )?;
            }
            Ok(())
        })
    }

    pub fn entries(&self) -> Result<Vec<CatalogEntry>, StorageError> {
        self.db.query(
            "SELECT Name, COALESCE(Syntax, ''), COALESCE(Description, '') FROM Plugins ORDER BY Name",
            [],
            |row| {
                Ok(CatalogEntry {
                    name: row.get(0)?,
                    syntax: row.get(1)?,
                    description: row.get(2)?,
                })
            },
        )
    }

    pub fn get(&self, name: &str) -> Result<Option<CatalogEntry>, StorageError> {
        self.db.query_opt(
            "SELECT Name, COALESCE(Syntax, ''), COALESCE(Description, '') FROM Plugins WHERE Name = ?1",
            [name],
            |row| {
                Ok(CatalogEntry {
                    name: row.get(0)?,
                    syntax: row.get(1)?,
                    description: row.get(2)?,
                })
            },
        )
    }

    pub fn contains(&self, name: &str) -> Result<bool, StorageError> {
        Ok(self.get(name)?.is_some())
    }

    /// Overview of every command plugin, i.e. every plugin with a syntax.
    pub fn render_overview(&self, user_name: &str) -> Result<String, StorageError> {
        let commands: Vec<String> = self
            .entries()?
            .into_iter()
            .filter(|e| !e.syntax.is_empty())
            .map(|e| format!("- {}", e.name))
            .collect();
        Ok(format!(
            "Hi {}!\n\nUse `help <command name>` to get more information about a certain command.\n\
             Arguments containing whitespace need to be quoted, as in a POSIX shell.\n\n\
             Currently, I understand the following commands:\n\n{}\n\nHave a nice day! :-)",
            user_name,
            commands.join("\n")
        ))
    }

    /// Syntax and description of one plugin.
    pub fn render_command(&self, name: &str) -> Result<Option<String>, StorageError> {
        Ok(self.get(name)?.map(|e| {
            format!("```text\n{}\n```\n{}", e.syntax.trim(), e.description.trim())
        }))
    }
}
