//! Persistence layer: libSQL-backed account records and device storage.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{
    AccountRow, AccountStore, AgentAssignment, BusinessProfile, CallPreferencesRecord,
    OnboardingAudit, ProvisionedAccount, Subscription,
};
