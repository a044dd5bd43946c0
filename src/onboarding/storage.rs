//! Durable per-device draft storage.
//!
//! Drafts are captured before the user has an identity (the sign-up redirect
//! happens mid-wizard), so storage is scoped by a device id the front end
//! generates once and keeps across reloads.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::DatabaseError;

/// Storage keys for every draft format the wizard has ever written.
pub mod keys {
    /// Current versioned envelope: `{"version": 2, "draft": {...}}`.
    pub const PRIMARY: &str = "onboarding_draft:v2";
    /// Step-keyed object written by the first wizard.
    pub const LEGACY: &str = "onboardingData";
    /// Flat camelCase object written by the second wizard.
    pub const NEW_FORMAT: &str = "onboarding_data_new";
    /// Separately stored fragments from before drafts were consolidated.
    pub const BUSINESS_FRAGMENT: &str = "business";
    pub const PLAN_FRAGMENT: &str = "selectedPlan";
    pub const FAQ_FRAGMENT: &str = "faqAnswers";

    /// Every key cleared once setup succeeds.
    pub const ALL: &[&str] = &[
        PRIMARY,
        LEGACY,
        NEW_FORMAT,
        BUSINESS_FRAGMENT,
        PLAN_FRAGMENT,
        FAQ_FRAGMENT,
    ];
}

/// Key/value storage that survives process restarts and page reloads.
#[async_trait]
pub trait DraftStorage: Send + Sync {
    /// Read a stored value.
    async fn get_item(
        &self,
        device_id: &str,
        key: &str,
    ) -> Result<Option<serde_json::Value>, DatabaseError>;

    /// Write a value, replacing any previous one.
    async fn set_item(
        &self,
        device_id: &str,
        key: &str,
        value: &serde_json::Value,
    ) -> Result<(), DatabaseError>;

    /// Remove a value. Returns whether anything was removed.
    async fn remove_item(&self, device_id: &str, key: &str) -> Result<bool, DatabaseError>;
}

/// In-process storage, used in tests and for ephemeral runs.
#[derive(Default)]
pub struct MemoryDraftStorage {
    items: RwLock<HashMap<(String, String), serde_json::Value>>,
}

impl MemoryDraftStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored items across all devices.
    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }
}

#[async_trait]
impl DraftStorage for MemoryDraftStorage {
    async fn get_item(
        &self,
        device_id: &str,
        key: &str,
    ) -> Result<Option<serde_json::Value>, DatabaseError> {
        let items = self.items.read().await;
        Ok(items.get(&(device_id.to_string(), key.to_string())).cloned())
    }

    async fn set_item(
        &self,
        device_id: &str,
        key: &str,
        value: &serde_json::Value,
    ) -> Result<(), DatabaseError> {
        let mut items = self.items.write().await;
        items.insert((device_id.to_string(), key.to_string()), value.clone());
        Ok(())
    }

    async fn remove_item(&self, device_id: &str, key: &str) -> Result<bool, DatabaseError> {
        let mut items = self.items.write().await;
        Ok(items
            .remove(&(device_id.to_string(), key.to_string()))
            .is_some())
    }
}
