//! Command registry
//!
//! Centralized registry for all available commands. Built once when the node
//! starts and shared read-only (behind an `Arc`) by every database afterwards.

use super::{admin, key, string, Command};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of all available commands
pub struct CommandRegistry {
    commands: HashMap<String, Arc<dyn Command>>,
}

impl CommandRegistry {
    /// Create a registry holding the full command catalogue
    pub fn new() -> Self {
        let mut registry = CommandRegistry::empty();

        // Connection / server commands
        registry.register(Arc::new(admin::PingCommand));
        registry.register(Arc::new(admin::FlushDbCommand));
        registry.register(Arc::new(admin::DbSizeCommand));

        // Key commands
        registry.register(Arc::new(key::DelCommand));
        registry.register(Arc::new(key::ExistsCommand));
        registry.register(Arc::new(key::TypeCommand));
        registry.register(Arc::new(key::RenameCommand));
        registry.register(Arc::new(key::RenameNxCommand));
        registry.register(Arc::new(key::KeysCommand));
        registry.register(Arc::new(key::RandomKeyCommand));

        // String commands
        registry.register(Arc::new(string::SetCommand));
        registry.register(Arc::new(string::SetNxCommand));
        registry.register(Arc::new(string::GetCommand));
        registry.register(Arc::new(string::GetSetCommand));
        registry.register(Arc::new(string::StrLenCommand));

        registry
    }

    /// Create a registry without any command
    pub fn empty() -> Self {
        CommandRegistry {
            commands: HashMap::new(),
        }
    }

    /// Register a command; a later registration under the same name wins
    pub fn register(&mut self, command: Arc<dyn Command>) {
        let name = command.name().to_lowercase();
        self.commands.insert(name, command);
    }

    /// Get a command by name (case-insensitive)
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Command>> {
        self.commands.get(&name.to_lowercase())
    }

    /// Check if a command exists
    pub fn has_command(&self, name: &str) -> bool {
        self.commands.contains_key(&name.to_lowercase())
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}
