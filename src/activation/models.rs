use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Externally visible lifecycle of one reconciliation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationPhase {
    Activating,
    Processing,
    Completed,
    Failed,
}

impl ActivationPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivationPhase::Activating => "activating",
            ActivationPhase::Processing => "processing",
            ActivationPhase::Completed => "completed",
            ActivationPhase::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ActivationPhase::Completed | ActivationPhase::Failed)
    }
}

/// Point-in-time view of a run, emitted on the snapshot channel for shells to
/// render. A run produces exactly one snapshot with a terminal phase.
#[derive(Debug, Clone, Serialize)]
pub struct ActivationSnapshot {
    pub phase: ActivationPhase,
    pub attempt: u32,
    pub needs_login: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub observed_at: DateTime<Utc>,
}

/// Terminal verdict of a run. Cancelled runs produce none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationOutcome {
    Activated,
    NeedsLogin,
    Failed { reason: String },
}

/// One-way credential latch. Armed at session creation when a credential is
/// present; `revoke` is the only mutation. Within a run there is no path back
/// to the authenticated probes once the latch drops.
#[derive(Debug, Clone, Copy)]
pub struct AuthLatch {
    usable: bool,
}

impl AuthLatch {
    pub fn armed(present: bool) -> Self {
        Self { usable: present }
    }

    pub fn usable(&self) -> bool {
        self.usable
    }

    pub fn revoke(&mut self) {
        self.usable = false;
    }
}

/// key: activation-session -> per-run mutable state
///
/// Created only once a non-empty checkout session id is in hand, threaded
/// through the poll loop, dropped at the terminal phase or on cancellation.
#[derive(Debug)]
pub struct ActivationSession {
    checkout_session_id: String,
    attempt: u32,
    phase: ActivationPhase,
    auth: AuthLatch,
    needs_login: bool,
    last_error: Option<String>,
}

impl ActivationSession {
    pub fn new(checkout_session_id: String, credential_present: bool) -> Self {
        Self {
            checkout_session_id,
            attempt: 0,
            phase: ActivationPhase::Activating,
            auth: AuthLatch::armed(credential_present),
            needs_login: false,
            last_error: None,
        }
    }

    pub fn checkout_session_id(&self) -> &str {
        &self.checkout_session_id
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn phase(&self) -> ActivationPhase {
        self.phase
    }

    pub fn auth_usable(&self) -> bool {
        self.auth.usable()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Marks the next poll cycle underway and returns its number.
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempt += 1;
        self.attempt
    }

    pub fn revoke_auth(&mut self) {
        self.auth.revoke();
    }

    /// Records the webhook-not-landed-yet observation. Terminal phases stick.
    pub fn mark_processing(&mut self) {
        if !self.phase.is_terminal() {
            self.phase = ActivationPhase::Processing;
        }
    }

    /// Retains a server rejection for the terminal report and keeps polling.
    pub fn record_rejection(&mut self, message: String) {
        self.last_error = Some(message);
        self.mark_processing();
    }

    pub fn complete_activated(&mut self) {
        self.phase = ActivationPhase::Completed;
        self.needs_login = false;
    }

    pub fn complete_needs_login(&mut self) {
        self.phase = ActivationPhase::Completed;
        self.needs_login = true;
    }

    pub fn fail(&mut self, reason: &str) {
        self.phase = ActivationPhase::Failed;
        self.last_error = Some(reason.to_string());
    }

    pub fn snapshot(&self) -> ActivationSnapshot {
        ActivationSnapshot {
            phase: self.phase,
            attempt: self.attempt,
            needs_login: self.needs_login,
            last_error: self.last_error.clone(),
            observed_at: Utc::now(),
        }
    }
}

/// Tenant standing reported by the authenticated status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    Pending,
    Active,
    Suspended,
}

/// key: activation-wire -> authenticated tenant record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantActivationRecord {
    pub status: TenantStatus,
    #[serde(default)]
    pub plan_code: Option<String>,
}

impl TenantActivationRecord {
    /// Usable account: a settled webhook has both flipped the status and
    /// bound a plan. A bare `active` without a plan is still provisioning.
    pub fn is_activated(&self) -> bool {
        self.status == TenantStatus::Active && self.plan_code.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUser {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub role: Option<String>,
}

/// Authenticated "who am I" payload. The reconciler only inspects `tenant`;
/// the user and owner records ride along for the shell.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatedProfile {
    pub tenant: TenantActivationRecord,
    pub user: ProfileUser,
    #[serde(default)]
    pub owner: Option<ProfileUser>,
}

/// Unauthenticated checkout view. Probe failures normalize to `found: false`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicCheckoutStatus {
    #[serde(default)]
    pub found: bool,
    #[serde(default)]
    pub is_active: bool,
}

impl PublicCheckoutStatus {
    pub fn not_found() -> Self {
        Self::default()
    }
}
