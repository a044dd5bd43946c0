//! Onboarding draft: the client-held record of setup answers.

use serde::{Deserialize, Serialize};

/// Business identity captured on the first wizard screen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusinessInfo {
    pub business_name: String,
    pub address: String,
    /// May be left empty; a number can be assigned after setup.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub hours: String,
}

/// Which call-handling features the agent should offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallPreferences {
    pub voicemail_enabled: bool,
    pub scheduling_enabled: bool,
    pub faq_enabled: bool,
}

impl Default for CallPreferences {
    fn default() -> Self {
        Self {
            voicemail_enabled: true,
            scheduling_enabled: false,
            faq_enabled: true,
        }
    }
}

impl CallPreferences {
    /// Feature names in the order they are shown to the user.
    pub fn call_handling(&self) -> Vec<String> {
        let mut handling = Vec::new();
        if self.voicemail_enabled {
            handling.push("voicemail".to_string());
        }
        if self.scheduling_enabled {
            handling.push("scheduling".to_string());
        }
        if self.faq_enabled {
            handling.push("faq".to_string());
        }
        handling
    }
}

/// When the agent answers calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleType {
    #[default]
    BusinessHours,
    AlwaysOn,
    Custom,
}

impl ScheduleType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BusinessHours => "business_hours",
            Self::AlwaysOn => "always_on",
            Self::Custom => "custom",
        }
    }

    /// Lenient parse used for older draft shapes.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().replace(['-', ' ', '/'], "_").as_str() {
            "always_on" | "24_7" | "always" => Self::AlwaysOn,
            "custom" => Self::Custom,
            _ => Self::BusinessHours,
        }
    }
}

impl std::fmt::Display for ScheduleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub schedule_type: ScheduleType,
    /// Free-form per-day schedule, only meaningful for `Custom`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_schedule: Option<serde_json::Value>,
}

/// Answers to the category-specific FAQ questions, in question order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaqAnswers {
    pub category: String,
    pub answers: Vec<String>,
}

/// The in-progress, not-yet-committed record of a user's setup answers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OnboardingDraft {
    pub business_info: BusinessInfo,
    pub call_preferences: CallPreferences,
    pub schedule_config: ScheduleConfig,
    pub faq_answers: FaqAnswers,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_plan: Option<String>,
}

/// Partial business-info update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusinessInfoPatch {
    pub business_name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub hours: Option<String>,
}

/// One wizard screen's worth of changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum DraftUpdate {
    BusinessInfo(BusinessInfoPatch),
    CallPreferences(CallPreferences),
    Schedule(ScheduleConfig),
    FaqAnswers(FaqAnswers),
    SelectedPlan(String),
    Reset,
}

impl DraftUpdate {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BusinessInfo(_) => "business_info",
            Self::CallPreferences(_) => "call_preferences",
            Self::Schedule(_) => "schedule",
            Self::FaqAnswers(_) => "faq_answers",
            Self::SelectedPlan(_) => "selected_plan",
            Self::Reset => "reset",
        }
    }
}

impl OnboardingDraft {
    /// Reducer: merge one update into the draft.
    pub fn apply(&mut self, update: DraftUpdate) {
        match update {
            DraftUpdate::BusinessInfo(patch) => {
                if let Some(name) = patch.business_name {
                    self.business_info.business_name = name;
                }
                if let Some(address) = patch.address {
                    self.business_info.address = address;
                }
                if let Some(phone) = patch.phone {
                    let phone = phone.trim().to_string();
                    self.business_info.phone = (!phone.is_empty()).then_some(phone);
                }
                if let Some(hours) = patch.hours {
                    self.business_info.hours = hours;
                }
            }
            DraftUpdate::CallPreferences(prefs) => self.call_preferences = prefs,
            DraftUpdate::Schedule(schedule) => self.schedule_config = schedule,
            DraftUpdate::FaqAnswers(faq) => self.faq_answers = faq,
            DraftUpdate::SelectedPlan(plan) => {
                let plan = plan.trim().to_string();
                self.selected_plan = (!plan.is_empty()).then_some(plan);
            }
            DraftUpdate::Reset => *self = Self::default(),
        }
    }

    /// The trimmed business name, if any.
    pub fn business_name(&self) -> Option<&str> {
        let name = self.business_info.business_name.trim();
        (!name.is_empty()).then_some(name)
    }

    pub fn has_business_name(&self) -> bool {
        self.business_name().is_some()
    }
}
