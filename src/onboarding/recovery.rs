//! Draft recovery: ordered reconstruction from every historical draft format.
//!
//! Each entry in `RECOVERY_CHAIN` reads one stored shape and upgrades it to
//! the current `OnboardingDraft`. Entries are tried in order. The first draft
//! carrying a business name wins; if none carries one, the first decodable
//! draft is returned so the caller can report what is missing.

use serde_json::Value;
use tracing::{debug, warn};

use super::draft::{
    BusinessInfo, CallPreferences, FaqAnswers, OnboardingDraft, ScheduleConfig, ScheduleType,
};
use super::storage::{DraftStorage, keys};
use crate::error::DraftError;

/// Envelope version written under the primary key.
pub const DRAFT_VERSION: u64 = 2;

/// A draft together with the format it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveredDraft {
    pub draft: OnboardingDraft,
    pub source: &'static str,
}

/// A single recovery step.
struct DraftMigration {
    name: &'static str,
    keys: &'static [&'static str],
    upgrade: fn(&[Option<Value>]) -> Option<OnboardingDraft>,
}

/// All known formats, newest first.
static RECOVERY_CHAIN: &[DraftMigration] = &[
    DraftMigration {
        name: "versioned_v2",
        keys: &[keys::PRIMARY],
        upgrade: upgrade_versioned,
    },
    DraftMigration {
        name: "legacy_step_keyed",
        keys: &[keys::LEGACY],
        upgrade: upgrade_legacy,
    },
    DraftMigration {
        name: "flat_new_format",
        keys: &[keys::NEW_FORMAT],
        upgrade: upgrade_new_format,
    },
    DraftMigration {
        name: "fragments",
        keys: &[keys::BUSINESS_FRAGMENT, keys::PLAN_FRAGMENT, keys::FAQ_FRAGMENT],
        upgrade: upgrade_fragments,
    },
];

/// Wrap a draft in the primary-key envelope.
pub fn encode_versioned(draft: &OnboardingDraft) -> Result<Value, DraftError> {
    let draft = serde_json::to_value(draft).map_err(|e| DraftError::Encode {
        key: keys::PRIMARY.to_string(),
        reason: e.to_string(),
    })?;
    Ok(serde_json::json!({ "version": DRAFT_VERSION, "draft": draft }))
}

/// Walk the recovery chain for a device.
pub async fn recover(
    storage: &dyn DraftStorage,
    device_id: &str,
) -> Result<Option<RecoveredDraft>, DraftError> {
    let mut fallback: Option<RecoveredDraft> = None;

    for migration in RECOVERY_CHAIN {
        let mut values = Vec::with_capacity(migration.keys.len());
        for key in migration.keys {
            values.push(storage.get_item(device_id, key).await?);
        }
        if values.iter().all(Option::is_none) {
            continue;
        }

        match (migration.upgrade)(&values) {
            Some(draft) if draft.has_business_name() => {
                debug!(device = device_id, source = migration.name, "Recovered onboarding draft");
                return Ok(Some(RecoveredDraft {
                    draft,
                    source: migration.name,
                }));
            }
            Some(draft) => {
                debug!(
                    device = device_id,
                    source = migration.name,
                    "Draft found without business name, trying older formats"
                );
                fallback.get_or_insert(RecoveredDraft {
                    draft,
                    source: migration.name,
                });
            }
            None => {
                warn!(
                    device = device_id,
                    source = migration.name,
                    "Stored draft could not be decoded"
                );
            }
        }
    }

    Ok(fallback)
}

// ── Upgrades ────────────────────────────────────────────────────────

fn upgrade_versioned(values: &[Option<Value>]) -> Option<OnboardingDraft> {
    let envelope = values.first()?.as_ref()?;
    if envelope.get("version").and_then(Value::as_u64) != Some(DRAFT_VERSION) {
        return None;
    }
    serde_json::from_value(envelope.get("draft")?.clone()).ok()
}

fn upgrade_legacy(values: &[Option<Value>]) -> Option<OnboardingDraft> {
    let data = values.first()?.as_ref()?;
    if !data.is_object() {
        return None;
    }

    let details = data.pointer("/step1/businessDetails").unwrap_or(&Value::Null);
    let business_info = BusinessInfo {
        business_name: first_str(details, &["/name", "/businessName"]).unwrap_or_default(),
        address: first_str(details, &["/address"]).unwrap_or_default(),
        phone: first_str(details, &["/phone", "/phoneNumber"]),
        hours: first_str(details, &["/hours", "/businessHours"]).unwrap_or_default(),
    };

    let prefs = data.pointer("/step2").unwrap_or(&Value::Null);
    let call_preferences = call_preferences_from(prefs);

    let schedule_config = ScheduleConfig {
        schedule_type: first_str(data, &["/step3/scheduleType"])
            .map(|s| ScheduleType::parse_lenient(&s))
            .unwrap_or_default(),
        custom_schedule: data.pointer("/step3/customSchedule").filter(|v| !v.is_null()).cloned(),
    };

    let faq_answers = FaqAnswers {
        category: first_str(data, &["/step4/category"]).unwrap_or_default(),
        answers: data.pointer("/step4/answers").map(answers_from).unwrap_or_default(),
    };

    Some(OnboardingDraft {
        business_info,
        call_preferences,
        schedule_config,
        faq_answers,
        selected_plan: first_str(data, &["/plan", "/selectedPlan"]),
    })
}

fn upgrade_new_format(values: &[Option<Value>]) -> Option<OnboardingDraft> {
    let data = values.first()?.as_ref()?;
    if !data.is_object() {
        return None;
    }

    let business_info = BusinessInfo {
        business_name: first_str(data, &["/businessName", "/business/name"]).unwrap_or_default(),
        address: first_str(data, &["/businessAddress", "/business/address"]).unwrap_or_default(),
        phone: first_str(data, &["/businessPhone", "/business/phone"]),
        hours: first_str(data, &["/businessHours", "/business/hours"]).unwrap_or_default(),
    };

    Some(OnboardingDraft {
        business_info,
        call_preferences: call_preferences_from(
            data.pointer("/callPreferences").unwrap_or(&Value::Null),
        ),
        schedule_config: ScheduleConfig {
            schedule_type: first_str(data, &["/scheduleType"])
                .map(|s| ScheduleType::parse_lenient(&s))
                .unwrap_or_default(),
            custom_schedule: data.pointer("/customSchedule").filter(|v| !v.is_null()).cloned(),
        },
        faq_answers: FaqAnswers {
            category: first_str(data, &["/faqCategory", "/category"]).unwrap_or_default(),
            answers: data.pointer("/faqAnswers").map(answers_from).unwrap_or_default(),
        },
        selected_plan: first_str(data, &["/selectedPlan", "/plan"]),
    })
}

fn upgrade_fragments(values: &[Option<Value>]) -> Option<OnboardingDraft> {
    let business = values.first().and_then(Option::as_ref);
    let plan = values.get(1).and_then(Option::as_ref);
    let faq = values.get(2).and_then(Option::as_ref);

    let mut draft = OnboardingDraft::default();

    if let Some(business) = business {
        draft.business_info = BusinessInfo {
            business_name: first_str(business, &["/name", "/businessName"]).unwrap_or_default(),
            address: first_str(business, &["/address"]).unwrap_or_default(),
            phone: first_str(business, &["/phone", "/phoneNumber"]),
            hours: first_str(business, &["/hours"]).unwrap_or_default(),
        };
    }

    if let Some(plan) = plan {
        draft.selected_plan = match plan {
            Value::String(s) => non_empty(s),
            other => first_str(other, &["/name", "/plan"]),
        };
    }

    if let Some(faq) = faq {
        draft.faq_answers = FaqAnswers {
            category: first_str(faq, &["/category"]).unwrap_or_default(),
            answers: faq.get("answers").map(answers_from).unwrap_or_default(),
        };
    }

    Some(draft)
}

// ── Helpers ─────────────────────────────────────────────────────────

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

/// First non-empty string found at any of the JSON pointers.
fn first_str(value: &Value, pointers: &[&str]) -> Option<String> {
    pointers
        .iter()
        .filter_map(|p| value.pointer(p))
        .find_map(|v| v.as_str().and_then(non_empty))
}

fn bool_at(value: &Value, pointers: &[&str]) -> Option<bool> {
    pointers
        .iter()
        .filter_map(|p| value.pointer(p))
        .find_map(Value::as_bool)
}

fn call_preferences_from(value: &Value) -> CallPreferences {
    let defaults = CallPreferences::default();
    CallPreferences {
        voicemail_enabled: bool_at(value, &["/voicemail", "/voicemailEnabled"])
            .unwrap_or(defaults.voicemail_enabled),
        scheduling_enabled: bool_at(value, &["/scheduling", "/schedulingEnabled"])
            .unwrap_or(defaults.scheduling_enabled),
        faq_enabled: bool_at(value, &["/faq", "/faqEnabled"]).unwrap_or(defaults.faq_enabled),
    }
}

/// Answers stored either as an array or as an index-keyed object.
fn answers_from(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|v| v.as_str().unwrap_or_default().to_string())
            .collect(),
        Value::Object(map) => {
            let mut entries: Vec<(Option<usize>, &String, &Value)> = map
                .iter()
                .map(|(k, v)| (k.parse::<usize>().ok(), k, v))
                .collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));
            entries
                .into_iter()
                .map(|(_, _, v)| v.as_str().unwrap_or_default().to_string())
                .collect()
        }
        _ => Vec::new(),
    }
}
