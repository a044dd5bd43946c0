//! SetupOrchestrator: provisions an account from a completed onboarding draft.
//!
//! Steps run strictly in order because later steps reference the account row
//! created by the first. Each step declares a `Criticality`; the executor
//! aborts on a failed `Fatal` step and logs and continues past a failed
//! `BestEffort` one. Every write is an upsert, so a failed run is retried by
//! running the whole sequence again.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::plans::{self, BILLING_CYCLE, ResolvedPlan};
use super::progress::{Criticality, ProvisioningProgress, ProvisioningStep, RunState};
use crate::error::{DatabaseError, Error, SetupError};
use crate::onboarding::{
    BusinessInfo, CallPreferences, DraftStore, FaqAnswers, OnboardingDraft, ScheduleConfig,
    ScheduleType,
};
use crate::session::Identity;
use crate::store::{
    AccountRow, AccountStore, AgentAssignment, BusinessProfile, CallPreferencesRecord,
    OnboardingAudit, ProvisionedAccount, Subscription,
};
use crate::training::{AgentTrainer, TrainingRequest};

/// Progress broadcast channel capacity.
const PROGRESS_CAPACITY: usize = 64;

/// A progress change for one identity.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub identity: String,
    pub progress: ProvisioningProgress,
}

/// Run state and latest progress for one identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SetupStatus {
    pub state: RunState,
    pub progress: ProvisioningProgress,
}

impl Default for SetupStatus {
    fn default() -> Self {
        Self {
            state: RunState::NotStarted,
            progress: ProvisioningProgress::NotStarted,
        }
    }
}

/// Everything produced so far by a run.
struct SetupContext<'a> {
    identity: &'a Identity,
    device_id: &'a str,
    draft: OnboardingDraft,
    plan: ResolvedPlan,
    account: Option<AccountRow>,
    business_profile: Option<BusinessProfile>,
    call_preferences: Option<CallPreferencesRecord>,
    subscription: Option<Subscription>,
    agent: Option<AgentAssignment>,
}

impl<'a> SetupContext<'a> {
    fn new(identity: &'a Identity, device_id: &'a str, draft: OnboardingDraft) -> Self {
        let plan = plans::resolve_plan(draft.selected_plan.as_deref());
        Self {
            identity,
            device_id,
            draft,
            plan,
            account: None,
            business_profile: None,
            call_preferences: None,
            subscription: None,
            agent: None,
        }
    }

    fn account_id(&self) -> Result<Uuid, Error> {
        self.account.as_ref().map(|a| a.id).ok_or_else(|| {
            Error::Database(DatabaseError::NotFound {
                entity: "user".into(),
                id: self.identity.external_id.clone(),
            })
        })
    }

    /// What this run wrote, for when the final read-back fails.
    fn snapshot(&self) -> Option<ProvisionedAccount> {
        let account = self.account.clone()?;
        let agent = self.agent.clone();
        Some(ProvisionedAccount {
            account,
            business_profile: self.business_profile.clone(),
            call_preferences: self.call_preferences.clone(),
            subscription: self.subscription.clone(),
            agent_id: agent.as_ref().map(|a| a.agent_id.clone()),
            agent_name: agent.as_ref().and_then(|a| a.agent_name.clone()),
            agent_status: agent.as_ref().and_then(|a| a.agent_status.clone()),
            phone_number_id: agent.as_ref().and_then(|a| a.phone_number_id.clone()),
            assigned_phone_number: agent.and_then(|a| a.phone_number),
        })
    }
}

/// Coordinates setup runs: run guard, step execution and progress reporting.
pub struct SetupOrchestrator {
    store: Arc<dyn AccountStore>,
    trainer: Arc<dyn AgentTrainer>,
    drafts: Arc<DraftStore>,
    runs: RwLock<HashMap<String, SetupStatus>>,
    tx: broadcast::Sender<ProgressEvent>,
}

impl SetupOrchestrator {
    pub fn new(
        store: Arc<dyn AccountStore>,
        trainer: Arc<dyn AgentTrainer>,
        drafts: Arc<DraftStore>,
    ) -> Self {
        let (tx, _rx) = broadcast::channel(PROGRESS_CAPACITY);
        Self {
            store,
            trainer,
            drafts,
            runs: RwLock::new(HashMap::new()),
            tx,
        }
    }

    /// Subscribe to progress changes for all identities.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }

    /// Current run state and progress for an identity.
    pub async fn status(&self, external_id: &str) -> SetupStatus {
        self.runs
            .read()
            .await
            .get(external_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Run the full setup sequence for a signed-in identity.
    ///
    /// The draft comes from the device's in-memory state or, failing that,
    /// the storage recovery chain. A draft without a business name fails
    /// before anything is written.
    ///
    /// The sequence runs on its own task: dropping the returned future (a
    /// disconnected client) does not stop it, and the run guard is always
    /// released once it ends.
    pub async fn complete_setup(
        self: &Arc<Self>,
        identity: &Identity,
        device_id: &str,
    ) -> Result<ProvisionedAccount, SetupError> {
        self.begin(identity).await?;
        info!(identity = %identity.external_id, device = device_id, "Setup started");

        let this = Arc::clone(self);
        let run_identity = identity.clone();
        let run_device = device_id.to_string();
        let handle =
            tokio::spawn(async move { this.run_to_completion(&run_identity, &run_device).await });

        match handle.await {
            Ok(result) => result,
            Err(e) => {
                error!(identity = %identity.external_id, error = %e, "Setup task ended abnormally");
                let err = SetupError::Interrupted(e.to_string());
                self.finish(
                    identity,
                    RunState::Failed,
                    ProvisioningProgress::Failed {
                        message: err.to_string(),
                    },
                )
                .await;
                Err(err)
            }
        }
    }

    async fn run_to_completion(
        &self,
        identity: &Identity,
        device_id: &str,
    ) -> Result<ProvisionedAccount, SetupError> {
        let result = self.run(identity, device_id).await;
        match &result {
            Ok(account) => {
                info!(
                    identity = %identity.external_id,
                    account = %account.account.id,
                    agent = account.agent_id.as_deref().unwrap_or("none"),
                    "Setup complete"
                );
                self.finish(identity, RunState::Succeeded, ProvisioningProgress::Succeeded)
                    .await;
            }
            Err(e) => {
                if e.is_precondition() {
                    warn!(identity = %identity.external_id, error = %e, "Setup precondition not met");
                } else {
                    error!(identity = %identity.external_id, error = %e, "Setup failed");
                }
                self.finish(
                    identity,
                    RunState::Failed,
                    ProvisioningProgress::Failed {
                        message: e.to_string(),
                    },
                )
                .await;
            }
        }
        result
    }

    /// Re-run agent training alone for an already provisioned account.
    ///
    /// Unlike during setup, a training failure here is returned to the caller.
    pub async fn retrain_agent(
        &self,
        identity: &Identity,
    ) -> Result<ProvisionedAccount, SetupError> {
        if self.status(&identity.external_id).await.state == RunState::Running {
            return Err(SetupError::AlreadyRunning {
                identity: identity.external_id.clone(),
            });
        }

        let account = self
            .store
            .find_account_by_external_id(&identity.external_id)
            .await?
            .filter(ProvisionedAccount::is_complete)
            .ok_or_else(|| SetupError::NotProvisioned {
                identity: identity.external_id.clone(),
            })?;

        let draft = draft_from_account(&account);
        let plan_name = account
            .subscription
            .as_ref()
            .map(|s| s.plan_name.clone())
            .unwrap_or_else(|| plans::DEFAULT_PLAN.to_string());
        let request = TrainingRequest::from_draft(identity, &draft, &plan_name);

        let failed = |e: String| SetupError::StepFailed {
            step: ProvisioningStep::TrainingAgent,
            message: e,
        };
        let agent = self
            .trainer
            .train(&request)
            .await
            .map_err(|e| failed(e.to_string()))?;
        self.store
            .update_agent(account.account.id, &agent)
            .await
            .map_err(|e| failed(e.to_string()))?;

        info!(identity = %identity.external_id, agent = %agent.agent_id, "Agent retrained");
        self.store
            .get_account(account.account.id)
            .await?
            .ok_or_else(|| SetupError::NotProvisioned {
                identity: identity.external_id.clone(),
            })
    }

    /// Enter `Running`, rejecting re-entry.
    async fn begin(&self, identity: &Identity) -> Result<(), SetupError> {
        {
            let mut runs = self.runs.write().await;
            let status = runs.entry(identity.external_id.clone()).or_default();
            if !status.state.can_transition_to(RunState::Running) {
                warn!(identity = %identity.external_id, "Setup already running, rejecting");
                return Err(SetupError::AlreadyRunning {
                    identity: identity.external_id.clone(),
                });
            }
            status.state = RunState::Running;
            status.progress = ProvisioningProgress::NotStarted;
        }
        let _ = self.tx.send(ProgressEvent {
            identity: identity.external_id.clone(),
            progress: ProvisioningProgress::NotStarted,
        });
        Ok(())
    }

    async fn finish(&self, identity: &Identity, state: RunState, progress: ProvisioningProgress) {
        {
            let mut runs = self.runs.write().await;
            let status = runs.entry(identity.external_id.clone()).or_default();
            if status.state.can_transition_to(state) {
                status.state = state;
            }
        }
        self.publish(identity, progress).await;
    }

    async fn publish(&self, identity: &Identity, progress: ProvisioningProgress) {
        if !progress.is_terminal() {
            debug!(identity = %identity.external_id, progress = ?progress, "Setup progress");
        }
        if let Some(status) = self.runs.write().await.get_mut(&identity.external_id) {
            status.progress = progress.clone();
        }
        // Ok if nobody is listening
        let _ = self.tx.send(ProgressEvent {
            identity: identity.external_id.clone(),
            progress,
        });
    }

    async fn run(
        &self,
        identity: &Identity,
        device_id: &str,
    ) -> Result<ProvisionedAccount, SetupError> {
        let draft = self
            .drafts
            .load(device_id)
            .await?
            .map(|recovered| recovered.draft)
            .filter(OnboardingDraft::has_business_name)
            .ok_or(SetupError::MissingBusinessName)?;

        if draft.business_info.phone.is_none() {
            info!(identity = %identity.external_id, "No business phone in draft, continuing");
        }

        let mut ctx = SetupContext::new(identity, device_id, draft);
        if !ctx.plan.known {
            warn!(
                identity = %identity.external_id,
                plan = %ctx.plan.plan_name,
                "Unknown plan, using default price"
            );
        }

        for step in ProvisioningStep::ALL {
            self.publish(identity, ProvisioningProgress::step(step)).await;

            let Err(e) = self.execute(step, &mut ctx).await else {
                continue;
            };
            match step.criticality() {
                Criticality::Fatal => {
                    error!(
                        identity = %identity.external_id,
                        step = %step,
                        error = %e,
                        "Required setup step failed"
                    );
                    return Err(SetupError::StepFailed {
                        step,
                        message: e.detail(),
                    });
                }
                Criticality::BestEffort => {
                    warn!(
                        identity = %identity.external_id,
                        step = %step,
                        error = %e,
                        "Optional setup step failed, continuing"
                    );
                }
            }
        }

        let account_id = ctx.account_id().map_err(|e| SetupError::StepFailed {
            step: ProvisioningStep::Finalizing,
            message: e.detail(),
        })?;
        match self.store.get_account(account_id).await {
            Ok(Some(account)) => Ok(account),
            other => {
                if let Err(e) = other {
                    warn!(identity = %identity.external_id, error = %e, "Account read-back failed");
                }
                ctx.snapshot().ok_or_else(|| SetupError::NotProvisioned {
                    identity: identity.external_id.clone(),
                })
            }
        }
    }

    async fn execute(
        &self,
        step: ProvisioningStep,
        ctx: &mut SetupContext<'_>,
    ) -> Result<(), Error> {
        match step {
            ProvisioningStep::MirroringIdentity => {
                let row = self.store.ensure_identity(ctx.identity).await?;
                ctx.account = Some(row);
            }
            ProvisioningStep::SavingBusinessProfile => {
                let business = &ctx.draft.business_info;
                let profile = BusinessProfile {
                    user_id: ctx.account_id()?,
                    business_name: business.business_name.trim().to_string(),
                    address: business.address.clone(),
                    phone: business.phone.clone(),
                    hours: business.hours.clone(),
                    category: ctx.draft.faq_answers.category.clone(),
                    category_answers: ctx.draft.faq_answers.answers.clone(),
                };
                self.store.upsert_business_profile(&profile).await?;
                ctx.business_profile = Some(profile);
            }
            ProvisioningStep::SavingCallPreferences => {
                let prefs = &ctx.draft.call_preferences;
                let schedule = &ctx.draft.schedule_config;
                let record = CallPreferencesRecord {
                    user_id: ctx.account_id()?,
                    voicemail_enabled: prefs.voicemail_enabled,
                    scheduling_enabled: prefs.scheduling_enabled,
                    faq_enabled: prefs.faq_enabled,
                    schedule_type: schedule.schedule_type.to_string(),
                    custom_schedule: schedule.custom_schedule.clone(),
                };
                self.store.upsert_call_preferences(&record).await?;
                ctx.call_preferences = Some(record);
            }
            ProvisioningStep::ActivatingSubscription => {
                let subscription = Subscription {
                    user_id: ctx.account_id()?,
                    plan_name: ctx.plan.plan_name.clone(),
                    price: ctx.plan.price,
                    billing_cycle: BILLING_CYCLE.to_string(),
                    start_date: Utc::now(),
                    status: "active".to_string(),
                };
                self.store.upsert_subscription(&subscription).await?;
                ctx.subscription = Some(subscription);
            }
            ProvisioningStep::TrainingAgent => {
                let request =
                    TrainingRequest::from_draft(ctx.identity, &ctx.draft, &ctx.plan.plan_name);
                let agent = self.trainer.train(&request).await?;
                self.store.update_agent(ctx.account_id()?, &agent).await?;
                ctx.agent = Some(agent);
            }
            ProvisioningStep::ArchivingOnboarding => {
                let draft = serde_json::to_value(&ctx.draft)
                    .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
                let audit = OnboardingAudit {
                    user_id: ctx.account_id()?,
                    draft,
                    call_handling: ctx.draft.call_preferences.call_handling(),
                    call_schedule: ctx.draft.schedule_config.schedule_type.to_string(),
                    is_completed: true,
                    completed_at: Utc::now(),
                };
                self.store.upsert_onboarding_audit(&audit).await?;
            }
            ProvisioningStep::Finalizing => {
                self.drafts.clear(ctx.device_id).await?;
            }
        }
        Ok(())
    }
}

/// Rebuild a draft from committed records, for retraining after setup.
fn draft_from_account(account: &ProvisionedAccount) -> OnboardingDraft {
    let mut draft = OnboardingDraft::default();

    if let Some(profile) = &account.business_profile {
        draft.business_info = BusinessInfo {
            business_name: profile.business_name.clone(),
            address: profile.address.clone(),
            phone: profile.phone.clone(),
            hours: profile.hours.clone(),
        };
        draft.faq_answers = FaqAnswers {
            category: profile.category.clone(),
            answers: profile.category_answers.clone(),
        };
    }

    if let Some(prefs) = &account.call_preferences {
        draft.call_preferences = CallPreferences {
            voicemail_enabled: prefs.voicemail_enabled,
            scheduling_enabled: prefs.scheduling_enabled,
            faq_enabled: prefs.faq_enabled,
        };
        draft.schedule_config = ScheduleConfig {
            schedule_type: ScheduleType::parse_lenient(&prefs.schedule_type),
            custom_schedule: prefs.custom_schedule.clone(),
        };
    }

    draft.selected_plan = account.subscription.as_ref().map(|s| s.plan_name.clone());
    draft
}
