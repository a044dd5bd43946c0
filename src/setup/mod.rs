//! Setup completion: turns a finished onboarding draft into a provisioned account.

pub mod orchestrator;
pub mod plans;
pub mod progress;
pub mod routes;

pub use orchestrator::{ProgressEvent, SetupOrchestrator, SetupStatus};
pub use plans::{ResolvedPlan, resolve_plan};
pub use progress::{Criticality, ProvisioningProgress, ProvisioningStep, RunState};
pub use routes::{SetupRouteState, setup_routes};
