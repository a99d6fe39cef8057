//! Subscription dialog state.

use crate::store::UnitKey;

/// Where a user is in the city → storage → size selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogState {
    ChoosingCity,
    ChoosingStorage { city: String },
    ChoosingSize { city: String, storage_name: String },
}

/// What a valid answer leads to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Next(DialogState),
    Complete(UnitKey),
}

impl DialogState {
    /// Advances the dialog with a choice the caller has already validated.
    #[must_use]
    pub fn advance(self, choice: String) -> Step {
        match self {
            Self::ChoosingCity => Step::Next(Self::ChoosingStorage { city: choice }),
            Self::ChoosingStorage { city } => Step::Next(Self::ChoosingSize {
                city,
                storage_name: choice,
            }),
            Self::ChoosingSize { city, storage_name } => {
                Step::Complete(UnitKey::new(city, storage_name, choice))
            }
        }
    }

    /// Prompt shown with the options of this step.
    #[must_use]
    pub fn prompt(&self) -> String {
        match self {
            Self::ChoosingCity => "🏙 Choose a city:".to_owned(),
            Self::ChoosingStorage { city } => format!("🏢 Choose a storage in {city}:"),
            Self::ChoosingSize { storage_name, .. } => {
                format!("📦 Choose a unit size at {storage_name}:")
            }
        }
    }
}
