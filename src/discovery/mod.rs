//! Subscription and resource group discovery

pub mod azure_cli;
pub mod matcher;
pub mod selection;

pub use azure_cli::AzureCli;
pub use matcher::ExclusionMatcher;
pub use selection::{SelectionOptions, select_subscriptions};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    Enabled,
    Disabled,
    Other,
}

impl SubscriptionState {
    pub fn parse(state: &str) -> Self {
        match state.trim().to_lowercase().as_str() {
            "enabled" => SubscriptionState::Enabled,
            "disabled" => SubscriptionState::Disabled,
            _ => SubscriptionState::Other,
        }
    }
}

/// A subscription as reported by the cloud CLI; `id` is the identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subscription {
    pub id: String,
    pub name: String,
    pub state: SubscriptionState,
}

impl Subscription {
    #[cfg(test)]
    pub fn enabled(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            state: SubscriptionState::Enabled,
        }
    }
}

/// Resource groups admitted to the work set, and those excluded with the
/// pattern that excluded them
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceGroupListing {
    pub included: Vec<String>,
    pub excluded: Vec<(String, String)>,
}

impl ResourceGroupListing {
    pub fn total(&self) -> usize {
        self.included.len() + self.excluded.len()
    }
}
