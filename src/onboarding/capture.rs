//! Draft capture: in-memory wizard state with write-through to storage.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::draft::{DraftUpdate, OnboardingDraft};
use super::recovery::{self, RecoveredDraft};
use super::storage::{DraftStorage, keys};
use crate::error::DraftError;

/// Holds each device's draft in memory and mirrors it to durable storage.
///
/// The in-memory copy is lost when the process (or, on the client, the page)
/// goes away; the stored copy is what survives the sign-up redirect.
pub struct DraftStore {
    storage: Arc<dyn DraftStorage>,
    drafts: RwLock<HashMap<String, OnboardingDraft>>,
}

impl DraftStore {
    pub fn new(storage: Arc<dyn DraftStorage>) -> Self {
        Self {
            storage,
            drafts: RwLock::new(HashMap::new()),
        }
    }

    /// Apply one wizard update and write the result through to storage.
    ///
    /// Starts from the recovered draft when nothing is held in memory, so a
    /// wizard resumed after a reload keeps its earlier answers. The write
    /// lock is held until the draft is persisted, so concurrent updates for
    /// a device apply one after the other.
    pub async fn dispatch(
        &self,
        device_id: &str,
        update: DraftUpdate,
    ) -> Result<OnboardingDraft, DraftError> {
        let kind = update.kind();
        let mut drafts = self.drafts.write().await;

        let mut draft = match drafts.get(device_id) {
            Some(draft) => draft.clone(),
            None => recovery::recover(self.storage.as_ref(), device_id)
                .await?
                .map(|r| r.draft)
                .unwrap_or_default(),
        };
        draft.apply(update);

        let encoded = recovery::encode_versioned(&draft)?;
        self.storage
            .set_item(device_id, keys::PRIMARY, &encoded)
            .await?;

        drafts.insert(device_id.to_string(), draft.clone());
        debug!(device = device_id, update = kind, "Draft updated");
        Ok(draft)
    }

    /// The draft held in memory, if any.
    pub async fn in_memory(&self, device_id: &str) -> Option<OnboardingDraft> {
        self.drafts.read().await.get(device_id).cloned()
    }

    /// Load a draft: memory first, then the storage recovery chain.
    ///
    /// A draft recovered from an older format is rewritten under the primary
    /// key and cached in memory.
    pub async fn load(&self, device_id: &str) -> Result<Option<RecoveredDraft>, DraftError> {
        if let Some(draft) = self.in_memory(device_id).await {
            return Ok(Some(RecoveredDraft {
                draft,
                source: "memory",
            }));
        }

        let mut drafts = self.drafts.write().await;
        // A dispatch may have filled memory while we waited for the lock.
        if let Some(draft) = drafts.get(device_id) {
            return Ok(Some(RecoveredDraft {
                draft: draft.clone(),
                source: "memory",
            }));
        }

        let Some(recovered) = recovery::recover(self.storage.as_ref(), device_id).await? else {
            return Ok(None);
        };

        if recovered.source != "versioned_v2" {
            info!(
                device = device_id,
                source = recovered.source,
                "Upgrading stored draft to current format"
            );
            let encoded = recovery::encode_versioned(&recovered.draft)?;
            if let Err(e) = self
                .storage
                .set_item(device_id, keys::PRIMARY, &encoded)
                .await
            {
                warn!(device = device_id, error = %e, "Failed to rewrite upgraded draft");
            }
        }

        drafts.insert(device_id.to_string(), recovered.draft.clone());
        Ok(Some(recovered))
    }

    /// Drop the in-memory draft and every stored draft key for a device.
    pub async fn clear(&self, device_id: &str) -> Result<(), DraftError> {
        let mut drafts = self.drafts.write().await;
        drafts.remove(device_id);
        for key in keys::ALL {
            self.storage.remove_item(device_id, key).await?;
        }
        debug!(device = device_id, "Draft cleared");
        Ok(())
    }
}
