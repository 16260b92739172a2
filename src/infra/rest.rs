//! REST client for the TDS admin API.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use reqwest::{Client, Method, Response, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tds_api_types::{
    Alert, AlertsQuery, AutoHealingStats, CircuitBreaker, CombinedStats, DashboardSummary,
    DeadLetterItem, DeadLetterQuery, HealingRun, HealthStatus, Page, SyncRun, SyncRunDetail,
    SyncRunsQuery, TriggerSyncRequest, WebhookEvent, WebhooksQuery,
};
use tracing::{debug, trace};

use crate::application::repos::{ApiError, TdsApi};
use crate::config::ApiSettings;

#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
    base: Url,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(settings: &ApiSettings) -> Result<Self, ApiError> {
        let client = Client::builder()
            .user_agent(Self::user_agent())
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| ApiError::Http(err.to_string()))?;
        let base = Self::normalise_base(&settings.base_url)?;

        Ok(Self {
            client,
            base,
            token: settings.token.clone(),
        })
    }

    /// Keep the configured path prefix and make it a directory, so endpoint
    /// segments land below it.
    fn normalise_base(configured: &Url) -> Result<Url, ApiError> {
        if configured.cannot_be_a_base() {
            return Err(ApiError::Url(format!("`{configured}` cannot be a base URL")));
        }
        let mut base = configured.clone();
        base.set_query(None);
        base.set_fragment(None);
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(base)
    }

    pub fn user_agent() -> &'static str {
        concat!("tds-admin/", env!("CARGO_PKG_VERSION"))
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn auth_header(&self) -> Result<Option<HeaderValue>, ApiError> {
        self.token
            .as_ref()
            .map(|token| {
                HeaderValue::from_str(&format!("Bearer {token}"))
                    .map_err(|err| ApiError::InvalidHeader(err.to_string()))
            })
            .transpose()
    }

    /// Build `base/segments...?query`. Segments are percent-encoded individually.
    fn url(&self, segments: &[&str], query: &[(&'static str, String)]) -> Result<Url, ApiError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::Url(format!("`{}` cannot be a base URL", self.base)))?
            .pop_if_empty()
            .extend(segments);
        if !query.is_empty() {
            url.set_query(None);
            let mut pairs = url.query_pairs_mut();
            for (name, value) in query {
                pairs.append_pair(name, value);
            }
        }
        Ok(url)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&'static str, String)],
    ) -> Result<T, ApiError> {
        self.send(Method::GET, segments, query, None::<&()>).await
    }

    async fn post<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        segments: &[&str],
        body: Option<&B>,
    ) -> Result<T, ApiError> {
        self.send(Method::POST, segments, &[], body).await
    }

    async fn send<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        method: Method,
        segments: &[&str],
        query: &[(&'static str, String)],
        body: Option<&B>,
    ) -> Result<T, ApiError> {
        let url = self.url(segments, query)?;
        trace!(method = %method, url = %url, "Sending API request");

        let mut request = self.client.request(method.clone(), url);
        if let Some(value) = self.auth_header()? {
            request = request.header(AUTHORIZATION, value);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|err| ApiError::Http(err.to_string()))?;
        debug!(
            method = %method,
            path = %segments.join("/"),
            status = response.status().as_u16(),
            "API request completed"
        );
        Self::handle(response).await
    }

    async fn handle<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| ApiError::Http(err.to_string()))?;
        if !status.is_success() {
            let text = String::from_utf8_lossy(&bytes).into_owned();
            return Err(ApiError::status(status.as_u16(), text));
        }
        serde_json::from_slice(&bytes).map_err(|err| ApiError::Decode(err.to_string()))
    }
}

#[async_trait]
impl TdsApi for ApiClient {
    async fn dashboard_summary(&self) -> Result<DashboardSummary, ApiError> {
        self.get(&["api", "tds", "dashboard", "summary"], &[]).await
    }

    async fn health(&self) -> Result<HealthStatus, ApiError> {
        self.get(&["api", "tds", "health"], &[]).await
    }

    async fn sync_runs(&self, query: &SyncRunsQuery) -> Result<Page<SyncRun>, ApiError> {
        self.get(&["api", "tds", "sync-runs"], &query.query_pairs())
            .await
    }

    async fn sync_run(&self, id: i64) -> Result<SyncRunDetail, ApiError> {
        let id = id.to_string();
        self.get(&["api", "tds", "sync-runs", id.as_str()], &[]).await
    }

    async fn combined_stats(&self) -> Result<CombinedStats, ApiError> {
        self.get(&["api", "tds", "stats"], &[]).await
    }

    async fn alerts(&self, query: &AlertsQuery) -> Result<Page<Alert>, ApiError> {
        self.get(&["api", "tds", "alerts"], &query.query_pairs())
            .await
    }

    async fn acknowledge_alert(&self, id: i64) -> Result<Alert, ApiError> {
        let id = id.to_string();
        self.post(&["api", "tds", "alerts", id.as_str(), "acknowledge"], None::<&()>)
            .await
    }

    async fn dead_letter(
        &self,
        query: &DeadLetterQuery,
    ) -> Result<Page<DeadLetterItem>, ApiError> {
        self.get(&["api", "tds", "dead-letter"], &query.query_pairs())
            .await
    }

    async fn circuit_breakers(&self) -> Result<Vec<CircuitBreaker>, ApiError> {
        self.get(&["api", "tds", "circuit-breakers"], &[]).await
    }

    async fn reset_circuit_breaker(&self, name: &str) -> Result<CircuitBreaker, ApiError> {
        self.post(&["api", "tds", "circuit-breakers", name, "reset"], None::<&()>)
            .await
    }

    async fn auto_healing_stats(&self) -> Result<AutoHealingStats, ApiError> {
        self.get(&["api", "tds", "auto-healing", "stats"], &[])
            .await
    }

    async fn trigger_healing(&self) -> Result<HealingRun, ApiError> {
        self.post(&["api", "tds", "auto-healing", "trigger"], None::<&()>)
            .await
    }

    async fn trigger_sync(&self, request: &TriggerSyncRequest) -> Result<SyncRun, ApiError> {
        self.post(&["api", "tds", "sync", "trigger"], Some(request))
            .await
    }

    async fn recent_webhooks(
        &self,
        query: &WebhooksQuery,
    ) -> Result<Page<WebhookEvent>, ApiError> {
        self.get(&["api", "tds", "webhooks", "recent"], &query.query_pairs())
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn settings(base: &str, token: Option<&str>) -> ApiSettings {
        ApiSettings {
            base_url: Url::parse(base).expect("base url"),
            token: token.map(str::to_string),
            request_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn base_path_prefix_is_kept() {
        for base in [
            "https://erp.example.com/backend",
            "https://erp.example.com/backend/",
        ] {
            let client = ApiClient::new(&settings(base, None)).expect("client");
            assert_eq!(client.base_url().as_str(), "https://erp.example.com/backend/");
            let url = client.url(&["api", "tds", "health"], &[]).expect("url");
            assert_eq!(url.as_str(), "https://erp.example.com/backend/api/tds/health");
        }
    }

    #[test]
    fn root_base_drops_query_and_fragment() {
        let client =
            ApiClient::new(&settings("https://tds.example.com/?debug=1#top", None)).expect("client");
        assert_eq!(client.base_url().as_str(), "https://tds.example.com/");
        let url = client
            .url(&["api", "tds", "stats"], &[])
            .expect("url");
        assert_eq!(url.as_str(), "https://tds.example.com/api/tds/stats");
    }

    #[test]
    fn url_appends_query_pairs_in_order() {
        let client = ApiClient::new(&settings("https://tds.example.com", None)).expect("client");
        let url = client
            .url(
                &["api", "tds", "alerts"],
                &[("page", "2".to_string()), ("severity", "critical".to_string())],
            )
            .expect("url");
        assert_eq!(
            url.as_str(),
            "https://tds.example.com/api/tds/alerts?page=2&severity=critical"
        );
    }

    #[test]
    fn auth_header_uses_bearer_scheme() {
        let client =
            ApiClient::new(&settings("https://tds.example.com", Some("secret"))).expect("client");
        let header = client.auth_header().expect("header").expect("present");
        assert_eq!(header.to_str().expect("ascii"), "Bearer secret");
    }

    #[test]
    fn token_with_newline_is_rejected() {
        let client =
            ApiClient::new(&settings("https://tds.example.com", Some("bad\ntoken"))).expect("client");
        assert!(matches!(
            client.auth_header(),
            Err(ApiError::InvalidHeader(_))
        ));
    }

    #[test]
    fn path_segments_are_escaped() {
        let client = ApiClient::new(&settings("https://tds.example.com", None)).expect("client");
        let url = client
            .url(&["api", "tds", "circuit-breakers", "erp api/v2", "reset"], &[])
            .expect("url");
        assert_eq!(
            url.path(),
            "/api/tds/circuit-breakers/erp%20api%2Fv2/reset"
        );
    }
}
