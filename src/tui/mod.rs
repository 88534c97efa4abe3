//! Terminal User Interface module
//!
//! Renders the conversation, the loading indicator and the saved-messages
//! panel, and turns keystrokes into session operations.

mod app;
mod input;
mod shimmer;
mod slash_commands;
mod theme;
mod widgets;

pub use app::{render, App, AppState};
pub use slash_commands::{parse_command, ChatCommand, ParsedCommand, SlashPopup};
pub use theme::Theme;
