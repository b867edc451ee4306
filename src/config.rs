use once_cell::sync::Lazy;
use std::time::Duration;

const DEFAULT_MAX_ATTEMPTS: u32 = 12;
const DEFAULT_RETRY_DELAY_MS: u64 = 2500;

/// Base URL of the control panel backend serving the billing endpoints.
pub static BILLING_API_ENDPOINT: Lazy<String> = Lazy::new(|| {
    std::env::var("BILLING_API_ENDPOINT")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| "http://127.0.0.1:3000/api".to_string())
});

/// Optional bearer token seeding the credential store at startup.
pub static BILLING_API_TOKEN: Lazy<Option<String>> =
    Lazy::new(|| read_optional_env("BILLING_API_TOKEN"));

/// key: activation-config -> poll-cycle budget
pub static ACTIVATION_MAX_ATTEMPTS: Lazy<u32> = Lazy::new(|| {
    std::env::var("ACTIVATION_MAX_ATTEMPTS")
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_MAX_ATTEMPTS)
});

/// key: activation-config -> pause between poll cycles
pub static ACTIVATION_RETRY_DELAY_MS: Lazy<u64> = Lazy::new(|| {
    std::env::var("ACTIVATION_RETRY_DELAY_MS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_RETRY_DELAY_MS)
});

/// Retry budget and pacing for one reconciliation run. Tests shrink the delay
/// through here instead of patching literals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivationPolicy {
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for ActivationPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
        }
    }
}

impl ActivationPolicy {
    pub fn from_env() -> Self {
        Self {
            max_attempts: *ACTIVATION_MAX_ATTEMPTS,
            retry_delay: Duration::from_millis(*ACTIVATION_RETRY_DELAY_MS),
        }
    }
}

fn read_optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
