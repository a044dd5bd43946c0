//! Onboarding state capture.
//!
//! The wizard builds an `OnboardingDraft` one screen at a time. Every update
//! is written through to per-device durable storage so the draft survives the
//! full reload caused by the identity provider's sign-up redirect. On load,
//! drafts written by older wizards are recovered through an ordered chain of
//! format upgrades.

pub mod capture;
pub mod draft;
pub mod faq;
pub mod recovery;
pub mod routes;
pub mod storage;

pub use capture::DraftStore;
pub use draft::{
    BusinessInfo, BusinessInfoPatch, CallPreferences, DraftUpdate, FaqAnswers, OnboardingDraft,
    ScheduleConfig, ScheduleType,
};
pub use faq::{QuestionAnswer, category_label, faq_pairs};
pub use recovery::RecoveredDraft;
pub use routes::{DEVICE_ID_HEADER, OnboardingRouteState, onboarding_routes};
pub use storage::{DraftStorage, MemoryDraftStorage};
