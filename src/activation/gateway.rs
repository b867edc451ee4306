use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::activation::models::{AuthenticatedProfile, PublicCheckoutStatus};
use crate::activation::session::CredentialStore;
use crate::error::{classify_finalize_failure, GatewayError};

/// key: activation-gateway -> backend billing surface
///
/// The three calls the reconciler drives: `finalize_checkout` nudges the
/// backend to settle a checkout session against provider state,
/// `authenticated_status` reads the caller's own tenant record, and
/// `public_status` reads the sessionless view of one checkout.
#[async_trait]
pub trait BillingStatusGateway: Send + Sync {
    async fn finalize_checkout(&self, session_id: &str) -> Result<(), GatewayError>;
    async fn authenticated_status(&self) -> Result<AuthenticatedProfile, GatewayError>;
    /// Infallible by contract: any probe failure reads as an unknown session.
    async fn public_status(&self, session_id: &str) -> PublicCheckoutStatus;
}

#[derive(Debug, Serialize)]
struct FinalizeRequest<'a> {
    #[serde(rename = "sessionId")]
    session_id: &'a str,
}

/// HTTP client for the control panel backend. Shares the credential store
/// with the session holder so presence checks and outgoing bearer headers
/// always agree on the same token.
#[derive(Clone, Debug)]
pub struct HttpBillingGateway {
    client: reqwest::Client,
    base_url: String,
    credentials: CredentialStore,
}

impl HttpBillingGateway {
    pub fn new(base_url: impl Into<String>, credentials: CredentialStore) -> Result<Self> {
        let base_url = base_url.into();
        Url::parse(&base_url)
            .with_context(|| format!("invalid billing endpoint '{base_url}'"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build billing client")?;
        Ok(Self {
            client,
            base_url,
            credentials,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn auth(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::RequestBuilder, GatewayError> {
        match self.credentials.token().await {
            Some(token) => Ok(request.bearer_auth(token)),
            None => Err(GatewayError::AuthExpired),
        }
    }

    async fn fetch_public_status(&self, url: &str) -> Result<PublicCheckoutStatus, GatewayError> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.json::<PublicCheckoutStatus>().await?)
    }
}

#[async_trait]
impl BillingStatusGateway for HttpBillingGateway {
    async fn finalize_checkout(&self, session_id: &str) -> Result<(), GatewayError> {
        let response = self
            .auth(self.client.post(self.endpoint("billing/checkout/finalize")))
            .await?
            .json(&FinalizeRequest { session_id })
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify_finalize_failure(status, &body))
    }

    async fn authenticated_status(&self) -> Result<AuthenticatedProfile, GatewayError> {
        let response = self
            .auth(self.client.get(self.endpoint("billing/profile")))
            .await?
            .send()
            .await?;

        let status = response.status();
        if matches!(status.as_u16(), 401 | 403) {
            return Err(GatewayError::AuthExpired);
        }
        if !status.is_success() {
            return Err(GatewayError::UnexpectedResponse(format!(
                "profile endpoint returned status {status}"
            )));
        }
        response.json::<AuthenticatedProfile>().await.map_err(|err| {
            GatewayError::UnexpectedResponse(format!("failed to decode profile: {err}"))
        })
    }

    async fn public_status(&self, session_id: &str) -> PublicCheckoutStatus {
        let url = self.endpoint(&format!("billing/checkout/{session_id}/status"));
        match self.fetch_public_status(&url).await {
            Ok(status) => status,
            Err(err) => {
                debug!(%session_id, error = %err, "public checkout probe read as not found");
                PublicCheckoutStatus::not_found()
            }
        }
    }
}
