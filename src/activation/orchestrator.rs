use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::activation::gateway::BillingStatusGateway;
use crate::activation::models::{
    ActivationOutcome, ActivationPhase, ActivationSession, ActivationSnapshot,
};
use crate::activation::session::SessionHolder;
use crate::config::ActivationPolicy;

const SNAPSHOT_STREAM_BUFFER: usize = 32;
const MISSING_SESSION_REASON: &str = "missing session identifier";
const STILL_PROCESSING_REASON: &str = "still processing, please retry";

/// Live run handle. The completion handle resolves to `None` when the run is
/// cancelled; dropping the handle drops the cancel sender, which the running
/// task observes as cancellation.
pub struct ActivationRunHandle {
    snapshot_rx: mpsc::Receiver<ActivationSnapshot>,
    completion: JoinHandle<Option<ActivationOutcome>>,
    cancel: Option<oneshot::Sender<()>>,
}

impl ActivationRunHandle {
    pub fn into_parts(
        self,
    ) -> (
        mpsc::Receiver<ActivationSnapshot>,
        JoinHandle<Option<ActivationOutcome>>,
        Option<oneshot::Sender<()>>,
    ) {
        (self.snapshot_rx, self.completion, self.cancel)
    }
}

/// key: activation-orchestrator -> bounded reconciliation loop
///
/// Drives the billing gateway and session holder from checkout completion to
/// a terminal outcome within a fixed attempt budget. One run handles one
/// checkout session; a user-initiated retry starts a fresh run.
#[derive(Clone)]
pub struct ActivationOrchestrator {
    gateway: Arc<dyn BillingStatusGateway>,
    session: Arc<dyn SessionHolder>,
    policy: ActivationPolicy,
}

impl ActivationOrchestrator {
    pub fn new(gateway: Arc<dyn BillingStatusGateway>, session: Arc<dyn SessionHolder>) -> Self {
        Self::with_policy(gateway, session, ActivationPolicy::default())
    }

    pub fn with_policy(
        gateway: Arc<dyn BillingStatusGateway>,
        session: Arc<dyn SessionHolder>,
        policy: ActivationPolicy,
    ) -> Self {
        Self {
            gateway,
            session,
            policy,
        }
    }

    /// Starts one reconciliation run for the checkout session the shell
    /// mounted with.
    pub fn start(&self, checkout_session_id: Option<String>) -> ActivationRunHandle {
        let (snapshot_tx, snapshot_rx) = mpsc::channel(SNAPSHOT_STREAM_BUFFER);
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let runner = self.clone();
        let completion = tokio::spawn(async move {
            runner
                .run_reconciliation(checkout_session_id, snapshot_tx, cancel_rx)
                .await
        });
        ActivationRunHandle {
            snapshot_rx,
            completion,
            cancel: Some(cancel_tx),
        }
    }

    async fn run_reconciliation(
        &self,
        checkout_session_id: Option<String>,
        snapshots: mpsc::Sender<ActivationSnapshot>,
        mut cancel_rx: oneshot::Receiver<()>,
    ) -> Option<ActivationOutcome> {
        let Some(session_id) = checkout_session_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
        else {
            warn!("activation requested without a checkout session id");
            let _ = snapshots
                .send(ActivationSnapshot {
                    phase: ActivationPhase::Failed,
                    attempt: 0,
                    needs_login: false,
                    last_error: Some(MISSING_SESSION_REASON.to_string()),
                    observed_at: Utc::now(),
                })
                .await;
            return Some(ActivationOutcome::Failed {
                reason: MISSING_SESSION_REASON.to_string(),
            });
        };

        let credential_present = self.session.credential_present().await;
        let mut run = ActivationSession::new(session_id, credential_present);
        info!(
            checkout_session = %run.checkout_session_id(),
            auth_available = run.auth_usable(),
            max_attempts = self.policy.max_attempts,
            "starting activation reconciliation"
        );
        emit(&snapshots, &run).await;

        // Pre-flight probe: a webhook that landed before the shell mounted
        // shows up here and skips the finalize loop entirely. Failures are
        // swallowed and do not consume the attempt budget.
        if run.auth_usable() {
            if cancelled(&mut cancel_rx) {
                return None;
            }
            let probed = self.gateway.authenticated_status().await;
            if cancelled(&mut cancel_rx) {
                return None;
            }
            match probed {
                Ok(profile) if profile.tenant.is_activated() => {
                    self.apply_activation_side_effects().await;
                    run.complete_activated();
                    emit(&snapshots, &run).await;
                    info!("tenant already activated before polling");
                    return Some(ActivationOutcome::Activated);
                }
                Ok(_) => {}
                Err(err) if err.is_auth_expired() => {
                    warn!("credential rejected before polling; continuing with public probes");
                    run.revoke_auth();
                }
                Err(err) => {
                    debug!(error = %err, "pre-flight status probe failed");
                }
            }
        }

        for _ in 0..self.policy.max_attempts {
            if cancelled(&mut cancel_rx) {
                debug!(attempt = run.attempt(), "activation run cancelled between poll cycles");
                return None;
            }
            let attempt = run.begin_attempt();
            let phase_at_start = run.phase();
            emit(&snapshots, &run).await;
            debug!(
                attempt,
                max_attempts = self.policy.max_attempts,
                auth_available = run.auth_usable(),
                "activation poll cycle"
            );

            // Finalize nudges the backend to settle the session against
            // provider state before the status reads.
            if run.auth_usable() {
                let finalized = self.gateway.finalize_checkout(run.checkout_session_id()).await;
                if cancelled(&mut cancel_rx) {
                    return None;
                }
                match finalized {
                    Ok(()) => {}
                    Err(err) if err.is_auth_expired() => {
                        warn!(attempt, "credential expired during finalize; going public");
                        run.revoke_auth();
                    }
                    Err(err) => {
                        if let Some(message) = err.server_message() {
                            debug!(attempt, %message, "finalize rejected; retaining message");
                            run.record_rejection(message.to_string());
                        } else {
                            debug!(attempt, error = %err, "finalize not settled yet");
                            run.mark_processing();
                        }
                    }
                }
            }

            // Authenticated read wins while the credential holds.
            if run.auth_usable() {
                let probed = self.gateway.authenticated_status().await;
                if cancelled(&mut cancel_rx) {
                    return None;
                }
                match probed {
                    Ok(profile) if profile.tenant.is_activated() => {
                        self.apply_activation_side_effects().await;
                        run.complete_activated();
                        emit(&snapshots, &run).await;
                        info!(attempt, "tenant activation confirmed");
                        return Some(ActivationOutcome::Activated);
                    }
                    Ok(_) => run.mark_processing(),
                    Err(err) if err.is_auth_expired() => {
                        warn!(attempt, "credential expired during status read; going public");
                        run.revoke_auth();
                    }
                    Err(err) => {
                        debug!(attempt, error = %err, "authenticated status probe failed");
                        run.mark_processing();
                    }
                }
            }

            // Public fallback, either from the start or after the latch
            // dropped earlier in this cycle.
            if !run.auth_usable() {
                let status = self.gateway.public_status(run.checkout_session_id()).await;
                if cancelled(&mut cancel_rx) {
                    return None;
                }
                if status.is_active {
                    run.complete_needs_login();
                    emit(&snapshots, &run).await;
                    info!(attempt, "checkout settled without a usable session");
                    return Some(ActivationOutcome::NeedsLogin);
                }
                if status.found {
                    run.mark_processing();
                }
            }

            if run.phase() != phase_at_start {
                emit(&snapshots, &run).await;
            }

            tokio::select! {
                _ = sleep(self.policy.retry_delay) => {}
                _ = &mut cancel_rx => {
                    debug!(attempt, "activation run cancelled during retry delay");
                    return None;
                }
            }
        }

        self.conclude_exhausted(&mut run, &snapshots, &mut cancel_rx)
            .await
    }

    /// Budget exhausted: one last public probe before giving up, so a webhook
    /// landing during the final delay still turns into a login prompt.
    async fn conclude_exhausted(
        &self,
        run: &mut ActivationSession,
        snapshots: &mpsc::Sender<ActivationSnapshot>,
        cancel_rx: &mut oneshot::Receiver<()>,
    ) -> Option<ActivationOutcome> {
        if cancelled(cancel_rx) {
            return None;
        }
        let status = self.gateway.public_status(run.checkout_session_id()).await;
        if cancelled(cancel_rx) {
            return None;
        }
        if status.is_active {
            run.complete_needs_login();
            emit(snapshots, run).await;
            info!(attempts = run.attempt(), "checkout settled on the final probe");
            return Some(ActivationOutcome::NeedsLogin);
        }

        let reason = run
            .last_error()
            .unwrap_or(STILL_PROCESSING_REASON)
            .to_string();
        run.fail(&reason);
        emit(snapshots, run).await;
        warn!(attempts = run.attempt(), %reason, "activation attempts exhausted");
        Some(ActivationOutcome::Failed { reason })
    }

    /// Post-activation side effects, fired exactly once per run. Failures are
    /// logged and not retried: both operations are idempotent and the next
    /// shell interaction re-triggers them.
    async fn apply_activation_side_effects(&self) {
        if let Err(err) = self.session.refresh_profile().await {
            warn!(?err, "profile refresh after activation failed");
        }
        self.session.invalidate_usage_cache().await;
    }
}

async fn emit(snapshots: &mpsc::Sender<ActivationSnapshot>, run: &ActivationSession) {
    let _ = snapshots.send(run.snapshot()).await;
}

fn cancelled(cancel_rx: &mut oneshot::Receiver<()>) -> bool {
    use tokio::sync::oneshot::error::TryRecvError;
    match cancel_rx.try_recv() {
        Ok(()) | Err(TryRecvError::Closed) => true,
        Err(TryRecvError::Empty) => false,
    }
}
