//! Command handler implementation.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info};

use super::dialog::{DialogState, Step};
use super::types::{BotCommand, CommandResult, Keyboard};
use crate::store::{NewUser, StoreError, SubscriptionStore, UnitCatalog, User};

const APOLOGY: &str = "⚠️ Something went wrong on our side. Please try again later.";

/// Dialogs untouched for this long are dropped.
pub const DIALOG_TTL: Duration = Duration::from_secs(30 * 60);

struct OpenDialog {
    state: DialogState,
    touched: Instant,
}

impl OpenDialog {
    fn is_fresh(&self) -> bool {
        self.touched.elapsed() < DIALOG_TTL
    }
}

/// Handles bot commands and the subscription dialog, independent of the
/// transport that delivered the message.
pub struct CommandHandler {
    catalog: Arc<dyn UnitCatalog>,
    subscriptions: Arc<dyn SubscriptionStore>,

    /// Open dialogs keyed by Telegram user ID.
    dialogs: Mutex<HashMap<i64, OpenDialog>>,
}

impl CommandHandler {
    /// Creates a new command handler.
    #[must_use]
    pub fn new(catalog: Arc<dyn UnitCatalog>, subscriptions: Arc<dyn SubscriptionStore>) -> Self {
        Self {
            catalog,
            subscriptions,
            dialogs: Mutex::new(HashMap::new()),
        }
    }

    /// Handles one text message from `sender`.
    pub async fn handle(&self, sender: NewUser, text: &str) -> CommandResult {
        let telegram_id = sender.telegram_id;

        let outcome = match BotCommand::parse(text) {
            Some(command) => {
                debug!(telegram_id, "Handling command: {}", command);
                // Commands close any open dialog.
                self.dialogs.lock().await.remove(&telegram_id);
                self.execute(sender, command).await
            }
            None => {
                // Taken out while the answer is checked; put back on a bad choice.
                let state = self
                    .dialogs
                    .lock()
                    .await
                    .remove(&telegram_id)
                    .filter(OpenDialog::is_fresh)
                    .map(|dialog| dialog.state);
                match state {
                    Some(state) => self.continue_dialog(sender, state, text.trim()).await,
                    None => Ok(CommandResult::error(
                        "I didn't understand that. Use the menu below or /help.",
                    )
                    .with_keyboard(Keyboard::main_menu())),
                }
            }
        };

        let result = outcome.unwrap_or_else(|e| {
            error!(telegram_id, "Storage error while handling message: {}", e);
            CommandResult::error(APOLOGY).with_keyboard(Keyboard::main_menu())
        });

        info!(telegram_id, success = result.success, "Command handled");
        result
    }

    /// Whether the user is in the middle of a subscription dialog.
    pub async fn dialog_state(&self, telegram_id: i64) -> Option<DialogState> {
        self.dialogs
            .lock()
            .await
            .get(&telegram_id)
            .filter(|dialog| dialog.is_fresh())
            .map(|dialog| dialog.state.clone())
    }

    /// Number of dialogs currently held in memory.
    pub async fn open_dialogs(&self) -> usize {
        self.dialogs.lock().await.len()
    }

    /// Stores `state` for the user and drops every expired dialog.
    async fn remember(&self, telegram_id: i64, state: DialogState) {
        let mut dialogs = self.dialogs.lock().await;
        let before = dialogs.len();
        dialogs.retain(|_, dialog| dialog.is_fresh());
        if dialogs.len() < before {
            debug!(expired = before - dialogs.len(), "Dropped abandoned dialogs");
        }
        dialogs.insert(
            telegram_id,
            OpenDialog {
                state,
                touched: Instant::now(),
            },
        );
    }

    async fn execute(&self, sender: NewUser, command: BotCommand) -> Result<CommandResult, StoreError> {
        match command {
            BotCommand::Start => self.handle_start(sender).await,
            BotCommand::Help => Ok(handle_help()),
            BotCommand::Subscribe => self.handle_subscribe(sender.telegram_id).await,
            BotCommand::List => self.handle_list(sender.telegram_id).await,
            BotCommand::Unsubscribe(Some(id)) => self.handle_unsubscribe(sender.telegram_id, id).await,
            BotCommand::Unsubscribe(None) => Ok(CommandResult::error(
                "Usage: /unsubscribe <id>. Use /list to see your subscription IDs.",
            )),
            BotCommand::Cancel => Ok(CommandResult::success("Back to the main menu.")
                .with_keyboard(Keyboard::main_menu())),
        }
    }

    async fn handle_start(&self, sender: NewUser) -> Result<CommandResult, StoreError> {
        let user = self.subscriptions.register_user(sender).await?;
        info!(user_id = user.id, telegram_id = user.telegram_id, "User registered");

        Ok(CommandResult::success(format!(
            "👋 Hi, {}! I watch storage unit listings and tell you when a unit \
             you are interested in becomes available.\n\nChoose an option below.",
            user.display_name()
        ))
        .with_keyboard(Keyboard::main_menu()))
    }

    async fn handle_subscribe(&self, telegram_id: i64) -> Result<CommandResult, StoreError> {
        self.open_step(telegram_id, DialogState::ChoosingCity).await
    }

    async fn handle_list(&self, telegram_id: i64) -> Result<CommandResult, StoreError> {
        let Some(user) = self.known_user(telegram_id).await? else {
            return Ok(not_registered());
        };

        let subscriptions = self.subscriptions.subscriptions_for_user(user.id).await?;
        if subscriptions.is_empty() {
            return Ok(CommandResult::success(
                "You have no active subscriptions. Tap \"New Subscription\" to add one.",
            )
            .with_keyboard(Keyboard::main_menu()));
        }

        let mut text = format!("📋 Your subscriptions ({}):\n", subscriptions.len());
        for subscription in &subscriptions {
            let _ = write!(text, "\n#{}  {}", subscription.id, subscription.criteria);
        }
        text.push_str("\n\nUse /unsubscribe <id> to stop watching one.");

        Ok(CommandResult::success(text).with_keyboard(Keyboard::main_menu()))
    }

    async fn handle_unsubscribe(&self, telegram_id: i64, id: i64) -> Result<CommandResult, StoreError> {
        let Some(user) = self.known_user(telegram_id).await? else {
            return Ok(not_registered());
        };

        if self.subscriptions.deactivate_subscription(user.id, id).await? {
            info!(user_id = user.id, subscription_id = id, "Subscription deactivated");
            Ok(CommandResult::success(format!("✓ Subscription #{id} removed.")))
        } else {
            Ok(CommandResult::error(format!(
                "You have no active subscription #{id}. Use /list to see your subscriptions."
            )))
        }
    }

    async fn continue_dialog(
        &self,
        sender: NewUser,
        state: DialogState,
        choice: &str,
    ) -> Result<CommandResult, StoreError> {
        let telegram_id = sender.telegram_id;
        let options = self.options_for(&state).await?;

        if !options.iter().any(|o| o == choice) {
            let prompt = state.prompt();
            self.remember(telegram_id, state).await;
            return Ok(CommandResult::error(format!(
                "Please pick one of the buttons below.\n{prompt}"
            ))
            .with_keyboard(Keyboard::choices(&options)));
        }

        match state.advance(choice.to_owned()) {
            Step::Next(next) => self.open_step(telegram_id, next).await,
            Step::Complete(criteria) => {
                let user = self.subscriptions.register_user(sender).await?;
                let subscription = self.subscriptions.subscribe(user.id, criteria).await?;
                info!(
                    user_id = user.id,
                    subscription_id = subscription.id,
                    unit = %subscription.criteria,
                    "Subscription created"
                );

                Ok(CommandResult::success(format!(
                    "✅ Subscribed to {} (#{}).\nI'll message you when it becomes available.",
                    subscription.criteria, subscription.id
                ))
                .with_keyboard(Keyboard::main_menu()))
            }
        }
    }

    /// Shows the options for `state` and remembers it, or returns to the
    /// main menu when the catalog offers nothing to choose from.
    async fn open_step(&self, telegram_id: i64, state: DialogState) -> Result<CommandResult, StoreError> {
        let options = self.options_for(&state).await?;
        if options.is_empty() {
            return Ok(CommandResult::error(
                "There are no storage units to choose from right now. Please try again later.",
            )
            .with_keyboard(Keyboard::main_menu()));
        }

        let prompt = state.prompt();
        self.remember(telegram_id, state).await;
        Ok(CommandResult::success(prompt).with_keyboard(Keyboard::choices(&options)))
    }

    async fn options_for(&self, state: &DialogState) -> Result<Vec<String>, StoreError> {
        match state {
            DialogState::ChoosingCity => self.catalog.cities().await,
            DialogState::ChoosingStorage { city } => self.catalog.storages_in(city).await,
            DialogState::ChoosingSize { city, storage_name } => {
                self.catalog.sizes_in(city, storage_name).await
            }
        }
    }

    async fn known_user(&self, telegram_id: i64) -> Result<Option<User>, StoreError> {
        self.subscriptions.find_user_by_telegram_id(telegram_id).await
    }
}

fn handle_help() -> CommandResult {
    let mut lines = vec!["Storage Watch Bot commands:".to_owned(), String::new()];

    for (cmd, desc) in BotCommand::all_commands() {
        lines.push(format!("  {cmd} - {desc}"));
    }

    lines.push(String::new());
    lines.push(
        "Pick a city, a storage and a unit size, and I'll notify you when such a unit is free."
            .to_owned(),
    );

    CommandResult::success(lines.join("\n"))
}

fn not_registered() -> CommandResult {
    CommandResult::error("I don't know you yet. Send /start first.")
}

impl std::fmt::Debug for CommandHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandHandler").finish_non_exhaustive()
    }
}
