pub mod activation;
pub mod config;
pub mod error;

pub use activation::{
    ActivationOrchestrator, ActivationOutcome, ActivationPhase, ActivationRunHandle,
    ActivationSnapshot, BillingStatusGateway, ConsoleSession, CredentialStore, HttpBillingGateway,
    SessionHolder,
};
pub use config::ActivationPolicy;
pub use error::GatewayError;
