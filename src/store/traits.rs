//! `AccountStore` trait: the relational store's contract as seen by setup.
//!
//! Every write is an upsert keyed by the account, so repeating a write leaves
//! the same row behind.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::session::Identity;

/// The identity mirror row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountRow {
    /// Internal account id; every other record references it.
    pub id: Uuid,
    pub external_id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessProfile {
    pub user_id: Uuid,
    pub business_name: String,
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub hours: String,
    pub category: String,
    pub category_answers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallPreferencesRecord {
    pub user_id: Uuid,
    pub voicemail_enabled: bool,
    pub scheduling_enabled: bool,
    pub faq_enabled: bool,
    pub schedule_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_schedule: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub user_id: Uuid,
    pub plan_name: String,
    pub price: Decimal,
    pub billing_cycle: String,
    pub start_date: DateTime<Utc>,
    pub status: String,
}

/// Voice agent details returned by the training webhook.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentAssignment {
    pub agent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
}

/// Archived copy of the completed onboarding draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnboardingAudit {
    pub user_id: Uuid,
    pub draft: serde_json::Value,
    pub call_handling: Vec<String>,
    pub call_schedule: String,
    pub is_completed: bool,
    pub completed_at: DateTime<Utc>,
}

/// The committed result of setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisionedAccount {
    pub account: AccountRow,
    pub business_profile: Option<BusinessProfile>,
    pub call_preferences: Option<CallPreferencesRecord>,
    pub subscription: Option<Subscription>,
    pub agent_id: Option<String>,
    pub agent_name: Option<String>,
    pub agent_status: Option<String>,
    pub phone_number_id: Option<String>,
    pub assigned_phone_number: Option<String>,
}

impl ProvisionedAccount {
    /// Complete once the three required records are written. The agent is optional.
    pub fn is_complete(&self) -> bool {
        self.business_profile.is_some()
            && self.call_preferences.is_some()
            && self.subscription.is_some()
    }
}

/// Backend-agnostic account storage.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Mirror an identity, returning the existing row if it is already there.
    async fn ensure_identity(&self, identity: &Identity) -> Result<AccountRow, DatabaseError>;

    async fn upsert_business_profile(&self, profile: &BusinessProfile)
    -> Result<(), DatabaseError>;

    async fn upsert_call_preferences(
        &self,
        prefs: &CallPreferencesRecord,
    ) -> Result<(), DatabaseError>;

    async fn upsert_subscription(&self, subscription: &Subscription) -> Result<(), DatabaseError>;

    /// Record the trained agent on the account.
    async fn update_agent(
        &self,
        user_id: Uuid,
        agent: &AgentAssignment,
    ) -> Result<(), DatabaseError>;

    async fn upsert_onboarding_audit(&self, audit: &OnboardingAudit) -> Result<(), DatabaseError>;

    async fn get_account(&self, user_id: Uuid) -> Result<Option<ProvisionedAccount>, DatabaseError>;

    async fn find_account_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<ProvisionedAccount>, DatabaseError>;
}
