//! Agent-training webhook client.
//!
//! The workflow-automation service receives the assembled business details
//! and FAQ pairs, configures a voice agent on the voice platform, and answers
//! with the agent's id, name, status and phone number.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::config::WebhookConfig;
use crate::error::WebhookError;
use crate::onboarding::{OnboardingDraft, QuestionAnswer, category_label, faq_pairs};
use crate::session::Identity;
use crate::store::AgentAssignment;

/// Business fields forwarded to the training webhook.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessDetails {
    pub name: String,
    pub address: String,
    pub phone: Option<String>,
    pub hours: String,
    pub category: String,
    pub call_handling: Vec<String>,
    pub schedule_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FaqData {
    pub category: String,
    pub category_label: String,
    pub questions_and_answers: Vec<QuestionAnswer>,
}

/// Request body of the training webhook.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingRequest {
    pub user_id: String,
    pub user_email: String,
    pub business_name: String,
    pub phone_number: Option<String>,
    pub plan_name: String,
    pub timestamp: DateTime<Utc>,
    pub business_details: BusinessDetails,
    pub faq_data: FaqData,
}

impl TrainingRequest {
    /// Assemble the payload from a draft.
    pub fn from_draft(identity: &Identity, draft: &OnboardingDraft, plan_name: &str) -> Self {
        let business = &draft.business_info;
        let faq = &draft.faq_answers;
        Self {
            user_id: identity.external_id.clone(),
            user_email: identity.email.clone(),
            business_name: business.business_name.trim().to_string(),
            phone_number: business.phone.clone(),
            plan_name: plan_name.to_string(),
            timestamp: Utc::now(),
            business_details: BusinessDetails {
                name: business.business_name.trim().to_string(),
                address: business.address.clone(),
                phone: business.phone.clone(),
                hours: business.hours.clone(),
                category: faq.category.clone(),
                call_handling: draft.call_preferences.call_handling(),
                schedule_type: draft.schedule_config.schedule_type.to_string(),
            },
            faq_data: FaqData {
                category: faq.category.clone(),
                category_label: category_label(&faq.category).to_string(),
                questions_and_answers: faq_pairs(&faq.category, &faq.answers),
            },
        }
    }
}

/// Something that can train a voice agent.
#[async_trait]
pub trait AgentTrainer: Send + Sync {
    async fn train(&self, request: &TrainingRequest) -> Result<AgentAssignment, WebhookError>;
}

/// Read an agent out of a webhook response body.
///
/// Accepts an object or an array whose first element is the object. A
/// response without a usable id is a failure.
pub fn parse_training_response(body: &Value) -> Result<AgentAssignment, WebhookError> {
    let agent = match body {
        Value::Array(items) => items.first().ok_or(WebhookError::MissingAgentId)?,
        Value::Object(_) => body,
        other => {
            return Err(WebhookError::Malformed(format!(
                "expected object or array, got {other}"
            )));
        }
    };

    let agent_id = text_field(agent, "id").ok_or(WebhookError::MissingAgentId)?;

    Ok(AgentAssignment {
        agent_id,
        agent_name: text_field(agent, "name"),
        agent_status: text_field(agent, "status"),
        phone_number_id: text_field(agent, "phoneNumberId"),
        phone_number: text_field(agent, "phoneNumber"),
    })
}

/// A non-empty string or number field, as text.
fn text_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Training webhook over HTTP.
pub struct HttpAgentTrainer {
    client: reqwest::Client,
    config: WebhookConfig,
}

impl HttpAgentTrainer {
    pub fn new(config: WebhookConfig) -> Result<Self, WebhookError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| WebhookError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl AgentTrainer for HttpAgentTrainer {
    async fn train(&self, request: &TrainingRequest) -> Result<AgentAssignment, WebhookError> {
        let mut req = self.client.post(&self.config.training_url).json(request);
        if let Some(token) = &self.config.token {
            req = req.bearer_auth(token.expose_secret());
        }

        let resp = req
            .send()
            .await
            .map_err(|e| WebhookError::Request(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| WebhookError::Request(e.to_string()))?;

        if !status.is_success() {
            return Err(WebhookError::Status {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let value: Value =
            serde_json::from_str(&body).map_err(|e| WebhookError::Malformed(e.to_string()))?;
        let agent = parse_training_response(&value)?;
        debug!(agent_id = %agent.agent_id, "Training webhook returned agent");
        Ok(agent)
    }
}
