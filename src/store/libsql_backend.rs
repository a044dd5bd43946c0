//! libSQL backend: async `AccountStore` and `DraftStorage` implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::onboarding::DraftStorage;
use crate::session::Identity;
use crate::store::migrations;
use crate::store::traits::{
    AccountRow, AccountStore, AgentAssignment, BusinessProfile, CallPreferencesRecord,
    OnboardingAudit, ProvisionedAccount, Subscription,
};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(backend.conn()).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(backend.conn()).await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Insert a `users` row for an identity the pre-check did not find.
    ///
    /// Another writer may have inserted it in between; a unique-constraint
    /// conflict then re-reads the existing row.
    async fn insert_identity(&self, identity: &Identity) -> Result<AccountRow, DatabaseError> {
        let id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();
        let inserted = self
            .conn()
            .execute(
                "INSERT INTO users (id, external_id, email, display_name, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![
                    id.to_string(),
                    identity.external_id.as_str(),
                    identity.email.as_str(),
                    opt_text(identity.display_name.as_deref()),
                    now,
                ],
            )
            .await;

        match inserted {
            Ok(_) => debug!(external_id = %identity.external_id, account = %id, "Identity mirrored"),
            // Lost a race with another writer: the row exists now, read it back.
            Err(e) if is_unique_violation(&e) => {
                debug!(external_id = %identity.external_id, "Identity already mirrored, re-reading");
            }
            Err(e) => return Err(DatabaseError::Query(format!("ensure_identity: {e}"))),
        }

        self.query_user("external_id", identity.external_id.clone())
            .await?
            .map(|u| u.account)
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "user".into(),
                id: identity.external_id.clone(),
            })
    }

    async fn query_user(
        &self,
        column: &str,
        value: String,
    ) -> Result<Option<UserRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1"),
                params![value],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("query_user: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_user(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("query_user: {e}"))),
        }
    }

    async fn load_account(&self, user: UserRecord) -> Result<ProvisionedAccount, DatabaseError> {
        let id = user.account.id;
        let business_profile = self.get_business_profile(id).await?;
        let call_preferences = self.get_call_preferences(id).await?;
        let subscription = self.get_subscription(id).await?;
        let agent = user.agent;

        Ok(ProvisionedAccount {
            account: user.account,
            business_profile,
            call_preferences,
            subscription,
            agent_id: agent.as_ref().map(|a| a.agent_id.clone()),
            agent_name: agent.as_ref().and_then(|a| a.agent_name.clone()),
            agent_status: agent.as_ref().and_then(|a| a.agent_status.clone()),
            phone_number_id: agent.as_ref().and_then(|a| a.phone_number_id.clone()),
            assigned_phone_number: agent.and_then(|a| a.phone_number),
        })
    }

    async fn get_business_profile(
        &self,
        user_id: Uuid,
    ) -> Result<Option<BusinessProfile>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT user_id, business_name, address, phone, hours, category, category_answers
                 FROM business_profiles WHERE user_id = ?1",
                params![user_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_business_profile: {e}")))?;

        let Some(row) = next_row(&mut rows, "get_business_profile").await? else {
            return Ok(None);
        };
        let answers: String = row.get(6).map_err(row_err)?;
        Ok(Some(BusinessProfile {
            user_id: parse_uuid(&row.get::<String>(0).map_err(row_err)?)?,
            business_name: row.get(1).map_err(row_err)?,
            address: row.get(2).map_err(row_err)?,
            phone: row.get(3).ok(),
            hours: row.get(4).map_err(row_err)?,
            category: row.get(5).map_err(row_err)?,
            category_answers: serde_json::from_str(&answers).map_err(|e| {
                DatabaseError::Serialization(format!("category_answers for {user_id}: {e}"))
            })?,
        }))
    }

    async fn get_call_preferences(
        &self,
        user_id: Uuid,
    ) -> Result<Option<CallPreferencesRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT user_id, voicemail_enabled, scheduling_enabled, faq_enabled,
                        schedule_type, custom_schedule
                 FROM call_preferences WHERE user_id = ?1",
                params![user_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_call_preferences: {e}")))?;

        let Some(row) = next_row(&mut rows, "get_call_preferences").await? else {
            return Ok(None);
        };
        let custom: Option<String> = row.get(5).ok();
        Ok(Some(CallPreferencesRecord {
            user_id: parse_uuid(&row.get::<String>(0).map_err(row_err)?)?,
            voicemail_enabled: row.get::<i64>(1).map_err(row_err)? != 0,
            scheduling_enabled: row.get::<i64>(2).map_err(row_err)? != 0,
            faq_enabled: row.get::<i64>(3).map_err(row_err)? != 0,
            schedule_type: row.get(4).map_err(row_err)?,
            custom_schedule: custom.and_then(|s| serde_json::from_str(&s).ok()),
        }))
    }

    async fn get_subscription(&self, user_id: Uuid) -> Result<Option<Subscription>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT user_id, plan_name, price, billing_cycle, start_date, status
                 FROM subscriptions WHERE user_id = ?1",
                params![user_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_subscription: {e}")))?;

        let Some(row) = next_row(&mut rows, "get_subscription").await? else {
            return Ok(None);
        };
        let price: String = row.get(2).map_err(row_err)?;
        let start: String = row.get(4).map_err(row_err)?;
        Ok(Some(Subscription {
            user_id: parse_uuid(&row.get::<String>(0).map_err(row_err)?)?,
            plan_name: row.get(1).map_err(row_err)?,
            price: price
                .parse::<Decimal>()
                .map_err(|e| DatabaseError::Serialization(format!("price {price}: {e}")))?,
            billing_cycle: row.get(3).map_err(row_err)?,
            start_date: parse_datetime(&start),
            status: row.get(5).map_err(row_err)?,
        }))
    }
}

// ── Helper functions ────────────────────────────────────────────────

const USER_COLUMNS: &str = "id, external_id, email, display_name, agent_id, agent_name, \
    agent_status, phone_number_id, phone_number, created_at, updated_at";

/// A `users` row: the identity mirror plus the agent columns.
struct UserRecord {
    account: AccountRow,
    agent: Option<AgentAssignment>,
}

fn row_err(e: libsql::Error) -> DatabaseError {
    DatabaseError::Query(format!("row parse: {e}"))
}

fn parse_uuid(s: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|e| DatabaseError::Serialization(format!("uuid {s}: {e}")))
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

async fn next_row(
    rows: &mut libsql::Rows,
    context: &str,
) -> Result<Option<libsql::Row>, DatabaseError> {
    rows.next()
        .await
        .map_err(|e| DatabaseError::Query(format!("{context}: {e}")))
}

fn row_to_user(row: &libsql::Row) -> Result<UserRecord, DatabaseError> {
    let id: String = row.get(0).map_err(row_err)?;
    let agent_id: Option<String> = row.get(4).ok();
    let created: String = row.get(9).map_err(row_err)?;
    let updated: String = row.get(10).map_err(row_err)?;

    let agent = agent_id.map(|agent_id| AgentAssignment {
        agent_id,
        agent_name: row.get(5).ok(),
        agent_status: row.get(6).ok(),
        phone_number_id: row.get(7).ok(),
        phone_number: row.get(8).ok(),
    });

    Ok(UserRecord {
        account: AccountRow {
            id: parse_uuid(&id)?,
            external_id: row.get(1).map_err(row_err)?,
            email: row.get(2).map_err(row_err)?,
            display_name: row.get(3).ok(),
            created_at: parse_datetime(&created),
            updated_at: parse_datetime(&updated),
        },
        agent,
    })
}

fn is_unique_violation(e: &libsql::Error) -> bool {
    e.to_string().contains("UNIQUE constraint failed")
}

// ── AccountStore ────────────────────────────────────────────────────

#[async_trait]
impl AccountStore for LibSqlBackend {
    async fn ensure_identity(&self, identity: &Identity) -> Result<AccountRow, DatabaseError> {
        if let Some(existing) = self
            .query_user("external_id", identity.external_id.clone())
            .await?
        {
            return Ok(existing.account);
        }
        self.insert_identity(identity).await
    }

    async fn upsert_business_profile(
        &self,
        profile: &BusinessProfile,
    ) -> Result<(), DatabaseError> {
        let answers = serde_json::to_string(&profile.category_answers)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        self.conn()
            .execute(
                "INSERT INTO business_profiles
                    (user_id, business_name, address, phone, hours, category, category_answers, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT (user_id) DO UPDATE SET
                    business_name = excluded.business_name,
                    address = excluded.address,
                    phone = excluded.phone,
                    hours = excluded.hours,
                    category = excluded.category,
                    category_answers = excluded.category_answers,
                    updated_at = excluded.updated_at",
                params![
                    profile.user_id.to_string(),
                    profile.business_name.as_str(),
                    profile.address.as_str(),
                    opt_text(profile.phone.as_deref()),
                    profile.hours.as_str(),
                    profile.category.as_str(),
                    answers,
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_business_profile: {e}")))?;
        Ok(())
    }

    async fn upsert_call_preferences(
        &self,
        prefs: &CallPreferencesRecord,
    ) -> Result<(), DatabaseError> {
        let custom = match &prefs.custom_schedule {
            Some(value) => Some(
                serde_json::to_string(value)
                    .map_err(|e| DatabaseError::Serialization(e.to_string()))?,
            ),
            None => None,
        };
        self.conn()
            .execute(
                "INSERT INTO call_preferences
                    (user_id, voicemail_enabled, scheduling_enabled, faq_enabled,
                     schedule_type, custom_schedule, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT (user_id) DO UPDATE SET
                    voicemail_enabled = excluded.voicemail_enabled,
                    scheduling_enabled = excluded.scheduling_enabled,
                    faq_enabled = excluded.faq_enabled,
                    schedule_type = excluded.schedule_type,
                    custom_schedule = excluded.custom_schedule,
                    updated_at = excluded.updated_at",
                params![
                    prefs.user_id.to_string(),
                    prefs.voicemail_enabled as i64,
                    prefs.scheduling_enabled as i64,
                    prefs.faq_enabled as i64,
                    prefs.schedule_type.as_str(),
                    opt_text(custom.as_deref()),
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_call_preferences: {e}")))?;
        Ok(())
    }

    async fn upsert_subscription(&self, subscription: &Subscription) -> Result<(), DatabaseError> {
        // start_date is kept on conflict so a repeated setup does not restart billing.
        self.conn()
            .execute(
                "INSERT INTO subscriptions
                    (user_id, plan_name, price, billing_cycle, start_date, status, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT (user_id) DO UPDATE SET
                    plan_name = excluded.plan_name,
                    price = excluded.price,
                    billing_cycle = excluded.billing_cycle,
                    status = excluded.status,
                    updated_at = excluded.updated_at",
                params![
                    subscription.user_id.to_string(),
                    subscription.plan_name.as_str(),
                    subscription.price.to_string(),
                    subscription.billing_cycle.as_str(),
                    subscription.start_date.to_rfc3339(),
                    subscription.status.as_str(),
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_subscription: {e}")))?;
        Ok(())
    }

    async fn update_agent(
        &self,
        user_id: Uuid,
        agent: &AgentAssignment,
    ) -> Result<(), DatabaseError> {
        let count = self
            .conn()
            .execute(
                "UPDATE users SET agent_id = ?2, agent_name = ?3, agent_status = ?4,
                    phone_number_id = ?5, phone_number = ?6, updated_at = ?7
                 WHERE id = ?1",
                params![
                    user_id.to_string(),
                    agent.agent_id.as_str(),
                    opt_text(agent.agent_name.as_deref()),
                    opt_text(agent.agent_status.as_deref()),
                    opt_text(agent.phone_number_id.as_deref()),
                    opt_text(agent.phone_number.as_deref()),
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_agent: {e}")))?;

        if count == 0 {
            return Err(DatabaseError::NotFound {
                entity: "user".into(),
                id: user_id.to_string(),
            });
        }
        Ok(())
    }

    async fn upsert_onboarding_audit(&self, audit: &OnboardingAudit) -> Result<(), DatabaseError> {
        let draft = serde_json::to_string(&audit.draft)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        let handling = serde_json::to_string(&audit.call_handling)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        self.conn()
            .execute(
                "INSERT INTO onboarding_audit
                    (user_id, draft, call_handling, call_schedule, is_completed, completed_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT (user_id) DO UPDATE SET
                    draft = excluded.draft,
                    call_handling = excluded.call_handling,
                    call_schedule = excluded.call_schedule,
                    is_completed = excluded.is_completed,
                    completed_at = excluded.completed_at,
                    updated_at = excluded.updated_at",
                params![
                    audit.user_id.to_string(),
                    draft,
                    handling,
                    audit.call_schedule.as_str(),
                    audit.is_completed as i64,
                    audit.completed_at.to_rfc3339(),
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_onboarding_audit: {e}")))?;
        Ok(())
    }

    async fn get_account(&self, user_id: Uuid) -> Result<Option<ProvisionedAccount>, DatabaseError> {
        match self.query_user("id", user_id.to_string()).await? {
            Some(user) => Ok(Some(self.load_account(user).await?)),
            None => Ok(None),
        }
    }

    async fn find_account_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<ProvisionedAccount>, DatabaseError> {
        match self.query_user("external_id", external_id.to_string()).await? {
            Some(user) => Ok(Some(self.load_account(user).await?)),
            None => Ok(None),
        }
    }
}

// ── DraftStorage ────────────────────────────────────────────────────

#[async_trait]
impl DraftStorage for LibSqlBackend {
    async fn get_item(
        &self,
        device_id: &str,
        key: &str,
    ) -> Result<Option<serde_json::Value>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT value FROM device_storage WHERE device_id = ?1 AND key = ?2",
                params![device_id, key],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_item: {e}")))?;

        match next_row(&mut rows, "get_item").await? {
            Some(row) => {
                let value_str: String = row.get(0).map_err(row_err)?;
                match serde_json::from_str(&value_str) {
                    Ok(value) => Ok(Some(value)),
                    // Unreadable entries count as absent so recovery can fall through.
                    Err(e) => {
                        warn!(device = device_id, key, error = %e, "Discarding unreadable stored value");
                        Ok(None)
                    }
                }
            }
            None => Ok(None),
        }
    }

    async fn set_item(
        &self,
        device_id: &str,
        key: &str,
        value: &serde_json::Value,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let value_str =
            serde_json::to_string(value).map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        self.conn()
            .execute(
                "INSERT INTO device_storage (device_id, key, value, updated_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (device_id, key) DO UPDATE SET value = ?3, updated_at = ?4",
                params![device_id, key, value_str, now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_item: {e}")))?;
        Ok(())
    }

    async fn remove_item(&self, device_id: &str, key: &str) -> Result<bool, DatabaseError> {
        let count = self
            .conn()
            .execute(
                "DELETE FROM device_storage WHERE device_id = ?1 AND key = ?2",
                params![device_id, key],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("remove_item: {e}")))?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    fn identity() -> Identity {
        Identity::new("user_abc", "owner@joespizza.test").with_display_name("Joe")
    }

    fn profile(user_id: Uuid, name: &str) -> BusinessProfile {
        BusinessProfile {
            user_id,
            business_name: name.to_string(),
            address: "1 Main St".into(),
            phone: None,
            hours: "11-10".into(),
            category: "restaurants".into(),
            category_answers: vec!["Italian".into(), "No".into(), "Casual".into()],
        }
    }

    fn subscription(user_id: Uuid, plan: &str, start: DateTime<Utc>) -> Subscription {
        Subscription {
            user_id,
            plan_name: plan.to_string(),
            price: dec!(29),
            billing_cycle: "monthly".into(),
            start_date: start,
            status: "active".into(),
        }
    }

    // ── Identity ────────────────────────────────────────────────────

    #[tokio::test]
    async fn ensure_identity_is_idempotent() {
        let db = test_db().await;
        let first = db.ensure_identity(&identity()).await.unwrap();
        let second = db.ensure_identity(&identity()).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.external_id, "user_abc");
        assert_eq!(first.display_name.as_deref(), Some("Joe"));
    }

    #[tokio::test]
    async fn conflicting_insert_reads_existing_row() {
        let db = test_db().await;
        let existing = db.ensure_identity(&identity()).await.unwrap();

        // Pre-check already missed: the insert hits the unique constraint.
        let again = db.insert_identity(&identity()).await.unwrap();
        assert_eq!(again.id, existing.id);

        let mut rows = db
            .conn()
            .query("SELECT COUNT(*) FROM users WHERE external_id = 'user_abc'", ())
            .await
            .unwrap();
        let count: i64 = rows.next().await.unwrap().unwrap().get(0).unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn concurrent_ensure_identity_agrees_on_id() {
        let dir = tempfile::tempdir().unwrap();
        let db = LibSqlBackend::new_local(&dir.path().join("race.db"))
            .await
            .unwrap();

        let (id_a, id_b) = (identity(), identity());
        let (a, b) = tokio::join!(db.ensure_identity(&id_a), db.ensure_identity(&id_b));
        assert_eq!(a.unwrap().id, b.unwrap().id);
    }

    #[tokio::test]
    async fn corrupted_category_answers_is_an_error() {
        let db = test_db().await;
        let user = db.ensure_identity(&identity()).await.unwrap();
        db.upsert_business_profile(&profile(user.id, "Joe's Pizza"))
            .await
            .unwrap();
        db.conn()
            .execute(
                "UPDATE business_profiles SET category_answers = '{not json' WHERE user_id = ?1",
                params![user.id.to_string()],
            )
            .await
            .unwrap();

        let err = db.get_account(user.id).await.unwrap_err();
        assert!(matches!(err, DatabaseError::Serialization(_)));
    }

    #[tokio::test]
    async fn corrupted_device_value_reads_as_absent() {
        let db = test_db().await;
        db.conn()
            .execute(
                "INSERT INTO device_storage (device_id, key, value, updated_at)
                 VALUES ('d1', 'onboardingData', '{broken', 'now')",
                (),
            )
            .await
            .unwrap();

        assert!(db.get_item("d1", "onboardingData").await.unwrap().is_none());
    }

    // ── Upserts ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn business_profile_upsert_replaces_row() {
        let db = test_db().await;
        let user = db.ensure_identity(&identity()).await.unwrap();

        db.upsert_business_profile(&profile(user.id, "Joe's Pizza"))
            .await
            .unwrap();
        db.upsert_business_profile(&profile(user.id, "Joe's Pizzeria"))
            .await
            .unwrap();

        let account = db.get_account(user.id).await.unwrap().unwrap();
        let stored = account.business_profile.unwrap();
        assert_eq!(stored.business_name, "Joe's Pizzeria");
        assert_eq!(stored.category_answers, vec!["Italian", "No", "Casual"]);
        assert!(stored.phone.is_none());
    }

    #[tokio::test]
    async fn call_preferences_round_trip_custom_schedule() {
        let db = test_db().await;
        let user = db.ensure_identity(&identity()).await.unwrap();
        let prefs = CallPreferencesRecord {
            user_id: user.id,
            voicemail_enabled: false,
            scheduling_enabled: true,
            faq_enabled: true,
            schedule_type: "custom".into(),
            custom_schedule: Some(serde_json::json!({"mon": "9-5"})),
        };
        db.upsert_call_preferences(&prefs).await.unwrap();

        let account = db.get_account(user.id).await.unwrap().unwrap();
        assert_eq!(account.call_preferences.unwrap(), prefs);
    }

    #[tokio::test]
    async fn subscription_upsert_keeps_start_date() {
        let db = test_db().await;
        let user = db.ensure_identity(&identity()).await.unwrap();
        let first_start = parse_datetime("2026-01-01T00:00:00Z");
        let later_start = parse_datetime("2026-06-01T00:00:00Z");

        db.upsert_subscription(&subscription(user.id, "starter", first_start))
            .await
            .unwrap();
        db.upsert_subscription(&subscription(user.id, "professional", later_start))
            .await
            .unwrap();

        let sub = db.get_account(user.id).await.unwrap().unwrap().subscription.unwrap();
        assert_eq!(sub.plan_name, "professional");
        assert_eq!(sub.start_date, first_start);
        assert_eq!(sub.price, dec!(29));
    }

    #[tokio::test]
    async fn account_is_complete_after_required_writes() {
        let db = test_db().await;
        let user = db.ensure_identity(&identity()).await.unwrap();
        assert!(!db.get_account(user.id).await.unwrap().unwrap().is_complete());

        db.upsert_business_profile(&profile(user.id, "Joe's Pizza"))
            .await
            .unwrap();
        db.upsert_call_preferences(&CallPreferencesRecord {
            user_id: user.id,
            voicemail_enabled: true,
            scheduling_enabled: false,
            faq_enabled: true,
            schedule_type: "business_hours".into(),
            custom_schedule: None,
        })
        .await
        .unwrap();
        db.upsert_subscription(&subscription(user.id, "starter", Utc::now()))
            .await
            .unwrap();

        let account = db.find_account_by_external_id("user_abc").await.unwrap().unwrap();
        assert!(account.is_complete());
        assert!(account.agent_id.is_none());
    }

    #[tokio::test]
    async fn update_agent_sets_columns() {
        let db = test_db().await;
        let user = db.ensure_identity(&identity()).await.unwrap();
        db.update_agent(
            user.id,
            &AgentAssignment {
                agent_id: "asst_1".into(),
                agent_name: Some("Joe's Receptionist".into()),
                agent_status: Some("active".into()),
                phone_number_id: Some("pn_9".into()),
                phone_number: Some("+15550100".into()),
            },
        )
        .await
        .unwrap();

        let account = db.get_account(user.id).await.unwrap().unwrap();
        assert_eq!(account.agent_id.as_deref(), Some("asst_1"));
        assert_eq!(account.assigned_phone_number.as_deref(), Some("+15550100"));
    }

    #[tokio::test]
    async fn update_agent_unknown_user_is_not_found() {
        let db = test_db().await;
        let err = db
            .update_agent(Uuid::new_v4(), &AgentAssignment::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }

    #[tokio::test]
    async fn audit_upsert_fails_without_table() {
        let db = test_db().await;
        let user = db.ensure_identity(&identity()).await.unwrap();
        let audit = OnboardingAudit {
            user_id: user.id,
            draft: serde_json::json!({"business_info": {"business_name": "Joe's Pizza"}}),
            call_handling: vec!["voicemail".into()],
            call_schedule: "business_hours".into(),
            is_completed: true,
            completed_at: Utc::now(),
        };
        db.upsert_onboarding_audit(&audit).await.unwrap();
        db.upsert_onboarding_audit(&audit).await.unwrap();

        db.conn()
            .execute("DROP TABLE onboarding_audit", ())
            .await
            .unwrap();
        assert!(db.upsert_onboarding_audit(&audit).await.is_err());
    }

    #[tokio::test]
    async fn missing_account_is_none() {
        let db = test_db().await;
        assert!(db.get_account(Uuid::new_v4()).await.unwrap().is_none());
        assert!(db.find_account_by_external_id("nobody").await.unwrap().is_none());
    }

    // ── Device storage ──────────────────────────────────────────────

    #[tokio::test]
    async fn device_storage_set_get_remove() {
        let db = test_db().await;
        let value = serde_json::json!({"version": 2, "draft": {}});

        db.set_item("dev", "k", &value).await.unwrap();
        assert_eq!(db.get_item("dev", "k").await.unwrap(), Some(value));
        assert!(db.get_item("other", "k").await.unwrap().is_none());

        db.set_item("dev", "k", &serde_json::json!("replaced")).await.unwrap();
        assert_eq!(
            db.get_item("dev", "k").await.unwrap(),
            Some(serde_json::json!("replaced"))
        );

        assert!(db.remove_item("dev", "k").await.unwrap());
        assert!(!db.remove_item("dev", "k").await.unwrap());
    }

    #[tokio::test]
    async fn file_backed_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("receptionist.db");

        {
            let db = LibSqlBackend::new_local(&path).await.unwrap();
            db.set_item("dev", "k", &serde_json::json!(1)).await.unwrap();
        }

        let reopened = LibSqlBackend::new_local(&path).await.unwrap();
        assert_eq!(
            reopened.get_item("dev", "k").await.unwrap(),
            Some(serde_json::json!(1))
        );
    }
}
