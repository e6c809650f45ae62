//! Production HTTP implementation of [`OrderSource`].

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::StatusCode;
use tracing::warn;

use till_schemas::RemoteOrder;

use crate::source::{OrderSource, SourceError};
use crate::wire::{parse_wire_order, wire_to_canonical, WireOrderPage};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// HTTPS client for the platform's query API.
///
/// Authentication is per-tenant key/secret sent as headers on every
/// request; values are resolved from the environment once at startup and
/// handed in here.
pub struct HttpOrderSource {
    client: reqwest::Client,
    base_url: String,
    tenant_id: String,
    api_key: String,
    api_secret: String,
}

impl HttpOrderSource {
    pub fn new(
        base_url: impl Into<String>,
        tenant_id: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Result<Self, SourceError> {
        let base_url = base_url.into();
        let tenant_id = tenant_id.into();
        if base_url.trim().is_empty() {
            return Err(SourceError::Config("remote base_url is empty".to_string()));
        }
        if tenant_id.trim().is_empty() {
            return Err(SourceError::Config("tenant id is empty".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| SourceError::Config(format!("http client build failed: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            tenant_id,
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        })
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("X-Tenant-Id", &self.tenant_id)
            .header("X-Api-Key", &self.api_key)
            .header("X-Api-Secret", &self.api_secret)
    }

    async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, SourceError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let message = resp.text().await.unwrap_or_default();
        Err(SourceError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

fn transport(e: reqwest::Error) -> SourceError {
    SourceError::Transport(e.to_string())
}

#[async_trait]
impl OrderSource for HttpOrderSource {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn fetch_since(&self, since: DateTime<Utc>) -> Result<Vec<RemoteOrder>, SourceError> {
        let url = format!("{}/v1/orders", self.base_url);
        let resp = self
            .authed(self.client.get(&url))
            .query(&[("since", since.to_rfc3339_opts(SecondsFormat::Secs, true))])
            .send()
            .await
            .map_err(transport)?;
        let resp = Self::check_status(resp).await?;

        let page: WireOrderPage = resp
            .json()
            .await
            .map_err(|e| SourceError::Decode(format!("order listing: {e}")))?;

        // One malformed order must not poison the page: skip it, keep the
        // rest, and let the reconciler see a well-formed batch.
        let mut orders = Vec::with_capacity(page.orders.len());
        for raw in &page.orders {
            match parse_wire_order(raw) {
                Ok(order) => orders.push(order),
                Err(e) => {
                    warn!(error = %e, "skipping malformed order in listing");
                }
            }
        }

        // Contract is ascending by created_at; enforce it rather than trust
        // the platform.
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(orders)
    }

    async fn fetch_by_id(&self, remote_id: &str) -> Result<Option<RemoteOrder>, SourceError> {
        let url = format!("{}/v1/orders/{}", self.base_url, remote_id);
        let resp = self
            .authed(self.client.get(&url))
            .send()
            .await
            .map_err(transport)?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = Self::check_status(resp).await?;

        let wire = resp
            .json()
            .await
            .map_err(|e| SourceError::Decode(format!("order lookup: {e}")))?;
        Ok(Some(wire_to_canonical(wire)?))
    }
}
