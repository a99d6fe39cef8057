//! Bot API update loop.
//!
//! Converts incoming private messages into [`CommandHandler`] calls and
//! the returned [`CommandResult`] into a reply with a keyboard.

use std::sync::Arc;

use teloxide::dispatching::UpdateFilterExt;
use teloxide::prelude::*;
use teloxide::types::{BotCommand as MenuCommand, KeyboardButton, KeyboardMarkup};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::RateLimiter;
use crate::commands::{BotCommand, CommandHandler, CommandResult, Keyboard};
use crate::store::NewUser;

/// Runs the update loop until `cancel` fires.
pub async fn run_bot(
    bot: Bot,
    handler: Arc<CommandHandler>,
    limiter: Arc<RateLimiter>,
    cancel: CancellationToken,
) {
    if let Err(e) = register_commands(&bot).await {
        warn!("Failed to register bot commands with Telegram: {}", e);
    }

    let schema = Update::filter_message().endpoint(on_message);
    let mut dispatcher = Dispatcher::builder(bot, schema)
        .dependencies(dptree::deps![handler, limiter])
        .default_handler(|_| async {})
        .build();
    let shutdown = dispatcher.shutdown_token();

    info!("Bot update loop started");

    let dispatch = dispatcher.dispatch();
    tokio::pin!(dispatch);

    tokio::select! {
        () = &mut dispatch => {
            warn!("Bot update loop exited on its own");
            return;
        }
        () = cancel.cancelled() => {}
    }

    match shutdown.shutdown() {
        // The dispatcher finishes in-flight updates, then `dispatch` returns.
        Ok(_done) => dispatch.await,
        Err(e) => debug!("Dispatcher was not running: {}", e),
    }

    info!("Bot update loop stopped");
}

async fn on_message(
    bot: Bot,
    msg: Message,
    handler: Arc<CommandHandler>,
    limiter: Arc<RateLimiter>,
) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };

    if !msg.chat.is_private() {
        debug!(chat_id = msg.chat.id.0, "Ignoring message from non-private chat");
        return Ok(());
    }

    // In a private chat the chat ID is the user's Telegram ID.
    let sender = NewUser {
        telegram_id: msg.chat.id.0,
        username: msg.chat.username().map(str::to_owned),
        first_name: msg.chat.first_name().map(str::to_owned),
        last_name: msg.chat.last_name().map(str::to_owned),
    };

    let result = handler.handle(sender, text).await;
    reply(&bot, &limiter, msg.chat.id, result).await;
    Ok(())
}

async fn reply(bot: &Bot, limiter: &RateLimiter, chat_id: ChatId, result: CommandResult) {
    limiter.wait_and_acquire().await;

    let request = bot.send_message(chat_id, result.message);
    let sent = match result.keyboard {
        Some(keyboard) => request.reply_markup(to_markup(keyboard)).await,
        None => request.await,
    };

    if let Err(e) = sent {
        error!(chat_id = chat_id.0, "Failed to send reply: {}", e);
    }
}

fn to_markup(keyboard: Keyboard) -> KeyboardMarkup {
    KeyboardMarkup::new(
        keyboard
            .rows
            .into_iter()
            .map(|row| row.into_iter().map(KeyboardButton::new).collect::<Vec<_>>()),
    )
}

/// Publishes the slash commands so they appear in the "/" menu.
async fn register_commands(bot: &Bot) -> Result<(), teloxide::RequestError> {
    let commands: Vec<MenuCommand> = BotCommand::all_commands()
        .into_iter()
        .filter_map(|(usage, desc)| {
            let name = usage.trim_start_matches('/').split_whitespace().next()?;
            Some(MenuCommand::new(name, desc))
        })
        .collect();

    bot.set_my_commands(commands).await?;
    info!("Registered bot commands with Telegram");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_markup_keeps_rows() {
        let markup = to_markup(Keyboard::choices(&["Kazan".to_owned(), "Moscow".to_owned()]));
        assert_eq!(markup.keyboard.len(), 2);
        assert_eq!(markup.keyboard[0][0].text, "Kazan");
        assert_eq!(markup.keyboard[1][0].text, "Return");
    }
}
