//! Command handling module.
//!
//! Turns user messages into replies: slash commands, main menu buttons and
//! the city → storage → size subscription dialog.

mod dialog;
mod handler;
mod types;

pub use dialog::DialogState;
pub use handler::{CommandHandler, DIALOG_TTL};
pub use types::{BotCommand, CommandResult, Keyboard, LIST_SUBSCRIPTIONS, NEW_SUBSCRIPTION, RETURN};
