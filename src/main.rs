use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use checkout_activation::activation::{
    ActivationOrchestrator, ActivationOutcome, ConsoleSession, CredentialStore, HttpBillingGateway,
};
use checkout_activation::config::{self, ActivationPolicy};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    dotenvy::dotenv().ok();

    // Session id arrives as the first argument in normal use; the env
    // variable keeps scripted invocations simple.
    let checkout_session_id = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("CHECKOUT_SESSION_ID").ok());

    let credentials = match config::BILLING_API_TOKEN.as_deref() {
        Some(token) => CredentialStore::with_token(token),
        None => CredentialStore::new(),
    };
    let gateway = Arc::new(HttpBillingGateway::new(
        config::BILLING_API_ENDPOINT.as_str(),
        credentials.clone(),
    )?);
    let session = Arc::new(ConsoleSession::new(gateway.clone(), credentials));
    let orchestrator =
        ActivationOrchestrator::with_policy(gateway, session, ActivationPolicy::from_env());

    let (mut snapshots, completion, _cancel) =
        orchestrator.start(checkout_session_id).into_parts();
    while let Some(snapshot) = snapshots.recv().await {
        info!(
            phase = snapshot.phase.as_str(),
            attempt = snapshot.attempt,
            needs_login = snapshot.needs_login,
            last_error = snapshot.last_error.as_deref(),
            "activation update"
        );
    }

    match completion.await? {
        Some(ActivationOutcome::Activated) => {
            info!("tenant activated");
            Ok(())
        }
        Some(ActivationOutcome::NeedsLogin) => {
            info!("payment confirmed; sign in to finish activation");
            Ok(())
        }
        Some(ActivationOutcome::Failed { reason }) => Err(reason.into()),
        None => Err("activation run cancelled".into()),
    }
}
