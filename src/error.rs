use serde::Deserialize;
use thiserror::Error;

/// key: activation-errors -> gateway failure taxonomy
///
/// The reconciliation loop treats these as signals rather than faults: auth
/// expiry degrades the run to the public probe path, the payment-pending
/// variants keep the loop alive, and everything else is absorbed until the
/// attempt budget runs out.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("authentication expired or missing")]
    AuthExpired,
    #[error("payment is still processing")]
    PaymentProcessing,
    #[error("payment has not completed")]
    PaymentNotCompleted,
    #[error("checkout rejected: {0}")]
    Rejected(String),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl GatewayError {
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, GatewayError::AuthExpired)
    }

    /// True for the two provider signals meaning the webhook has not landed.
    pub fn is_payment_pending(&self) -> bool {
        matches!(
            self,
            GatewayError::PaymentProcessing | GatewayError::PaymentNotCompleted
        )
    }

    /// Server-supplied rejection message worth retaining for the terminal
    /// report. Pending and transport variants carry nothing actionable.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            GatewayError::Rejected(message) => Some(message),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Maps a failed finalize response onto the taxonomy. 401/403 flag credential
/// loss; the two provider pending codes keep the loop alive; any other
/// structured message from a client error is a recorded rejection.
pub fn classify_finalize_failure(status: reqwest::StatusCode, body: &str) -> GatewayError {
    if matches!(status.as_u16(), 401 | 403) {
        return GatewayError::AuthExpired;
    }
    if !status.is_client_error() {
        return GatewayError::UnexpectedResponse(format!("finalize returned status {status}"));
    }

    let detail: Option<ErrorBody> = serde_json::from_str(body).ok();
    match detail.as_ref().and_then(|d| d.error.as_deref()) {
        Some("payment_processing") => GatewayError::PaymentProcessing,
        Some("payment_not_completed") => GatewayError::PaymentNotCompleted,
        Some(code) => {
            let message = detail
                .as_ref()
                .and_then(|d| d.message.clone())
                .unwrap_or_else(|| code.to_string());
            GatewayError::Rejected(message)
        }
        None => match detail.as_ref().and_then(|d| d.message.clone()) {
            Some(message) => GatewayError::Rejected(message),
            None => {
                GatewayError::UnexpectedResponse(format!("finalize returned status {status}"))
            }
        },
    }
}
