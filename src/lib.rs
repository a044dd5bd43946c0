//! Receptionist setup: onboarding capture and account provisioning service.

pub mod config;
pub mod error;
pub mod onboarding;
pub mod server;
pub mod session;
pub mod setup;
pub mod store;
pub mod training;
