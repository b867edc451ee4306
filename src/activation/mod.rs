pub mod gateway;
pub mod models;
pub mod orchestrator;
pub mod session;

pub use gateway::{BillingStatusGateway, HttpBillingGateway};
pub use models::{
    ActivationOutcome, ActivationPhase, ActivationSession, ActivationSnapshot, AuthLatch,
    AuthenticatedProfile, ProfileUser, PublicCheckoutStatus, TenantActivationRecord, TenantStatus,
};
pub use orchestrator::{ActivationOrchestrator, ActivationRunHandle};
pub use session::{ConsoleSession, CredentialStore, SessionHolder};
