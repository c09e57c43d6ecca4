//! Authoritative subscription backend
//!
//! The backend owns the truth about plans and payments. Locally we only ever
//! read from it, or ask it to open a checkout.

use crate::error::{ChatQuotaError, Result};
use crate::subscription::types::{AuthoritativeState, CheckoutSession};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use url::Url;

/// Source of authoritative subscription state
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SubscriptionSource: Send + Sync {
    /// Fetches the current plan and usage of `user_id`
    async fn fetch_current(&self, user_id: &str) -> Result<AuthoritativeState>;

    /// Opens a checkout for `plan_id` on behalf of `user_id`
    async fn create_checkout(&self, user_id: &str, plan_id: &str) -> Result<CheckoutSession>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckoutRequest<'a> {
    user_id: &'a str,
    plan_id: &'a str,
}

/// HTTP client for the subscription backend
///
/// - `GET  {base}/users/{user_id}/subscription` returns an [`AuthoritativeState`]
/// - `POST {base}/checkout` with `{"userId", "planId"}` returns a [`CheckoutSession`]
#[derive(Debug, Clone)]
pub struct HttpSubscriptionSource {
    client: reqwest::Client,
    base: Url,
    api_key: Option<String>,
}

impl HttpSubscriptionSource {
    /// Creates a client for the backend at `api_base`
    ///
    /// # Errors
    ///
    /// Returns `ChatQuotaError::Config` if `api_base` is not an absolute
    /// http(s) URL.
    pub fn new(api_base: &str, timeout: Duration, api_key: Option<String>) -> Result<Self> {
        let base = Url::parse(api_base)
            .map_err(|e| ChatQuotaError::Config(format!("Invalid subscription api_base: {}", e)))?;
        if base.cannot_be_a_base() || !matches!(base.scheme(), "http" | "https") {
            return Err(ChatQuotaError::Config(format!(
                "Subscription api_base must be an http(s) URL: {}",
                api_base
            ))
            .into());
        }

        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base,
            api_key,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        // Checked in new(): the base can carry path segments
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

#[async_trait]
impl SubscriptionSource for HttpSubscriptionSource {
    async fn fetch_current(&self, user_id: &str) -> Result<AuthoritativeState> {
        let url = self.endpoint(&["users", user_id, "subscription"]);
        tracing::debug!(%url, "Fetching subscription state");

        let response = self.authorize(self.client.get(url)).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!(
                "subscription backend returned {}: {}",
                status,
                body
            ));
        }

        Ok(response.json::<AuthoritativeState>().await?)
    }

    async fn create_checkout(&self, user_id: &str, plan_id: &str) -> Result<CheckoutSession> {
        let url = self.endpoint(&["checkout"]);
        tracing::debug!(%url, plan_id, "Creating checkout session");

        let response = self
            .authorize(self.client.post(url))
            .json(&CheckoutRequest { user_id, plan_id })
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!(
                "payment backend returned {}: {}",
                status,
                body
            ));
        }

        Ok(response.json::<CheckoutSession>().await?)
    }
}
