// Discord layer - commands and event handlers.

#[path = "commands/command_catalog.rs"]
pub mod commands;

#[path = "experience/level_up_announcements.rs"]
pub mod level_up_announcements;

#[path = "role_notifier/events.rs"]
pub mod role_notifier;

// Re-export command types for convenience
pub use commands::experience::{Data, Error};
