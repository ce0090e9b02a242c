//! KRW → TWD exchange rate lookup.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::config::RateConfig;

/// TWD per 1 KRW, used whenever the live rate is unavailable.
pub const FALLBACK_RATE: f64 = 0.022;

/// Source of the KRW → TWD rate. Implementations never fail: a usable rate
/// is always returned.
#[async_trait]
pub trait ExchangeRateProvider: Send + Sync {
    async fn krw_to_twd(&self) -> f64;
}

/// Queries an open.er-api style endpoint (`/v6/latest/KRW`) on every call.
pub struct RateFetcher {
    client: reqwest::Client,
    api_url: String,
    fallback: f64,
}

#[derive(Debug, Deserialize)]
struct LatestRatesResponse {
    result: Option<String>,
    rates: Option<HashMap<String, f64>>,
}

impl RateFetcher {
    pub fn new(config: &RateConfig) -> Result<Self> {
        Self::with_timeout(&config.api_url, config.fallback, config.timeout())
    }

    pub fn with_timeout(api_url: &str, fallback: f64, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build rate API client")?;
        Ok(Self {
            client,
            api_url: api_url.to_string(),
            fallback,
        })
    }

    async fn try_fetch(&self) -> Result<f64> {
        debug!("Requesting exchange rate from {}", self.api_url);

        let response = self
            .client
            .get(&self.api_url)
            .send()
            .await
            .context("Failed to send request to rate API")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Rate API error ({})", status);
        }

        let text = response
            .text()
            .await
            .context("Failed to read rate API response")?;
        let data: LatestRatesResponse =
            serde_json::from_str(&text).context("Failed to parse rate API response")?;

        if data.result.as_deref() != Some("success") {
            anyhow::bail!("Unexpected rate API result: {}", text);
        }

        let rate = data
            .rates
            .ok_or_else(|| anyhow!("Rates missing in response"))?
            .get("TWD")
            .copied()
            .ok_or_else(|| anyhow!("TWD rate missing in response"))?;

        if !(rate.is_finite() && rate > 0.0) {
            anyhow::bail!("Unusable TWD rate in response: {}", rate);
        }
        Ok(rate)
    }
}

#[async_trait]
impl ExchangeRateProvider for RateFetcher {
    #[instrument(name = "RateFetch", skip(self))]
    async fn krw_to_twd(&self) -> f64 {
        match self.try_fetch().await {
            Ok(rate) => {
                debug!(rate, "Fetched KRW→TWD rate");
                rate
            }
            Err(e) => {
                warn!(
                    "Exchange rate fetch failed, using fallback {}: {:#}",
                    self.fallback, e
                );
                self.fallback
            }
        }
    }
}

/// A constant rate, for driving the bot without network access.
#[cfg(test)]
pub struct FixedRate(pub f64);

#[cfg(test)]
#[async_trait]
impl ExchangeRateProvider for FixedRate {
    async fn krw_to_twd(&self) -> f64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn create_mock_server(response: ResponseTemplate) -> MockServer {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v6/latest/KRW"))
            .respond_with(response)
            .mount(&mock_server)
            .await;

        mock_server
    }

    fn fetcher_for(server: &MockServer) -> RateFetcher {
        let url = format!("{}/v6/latest/KRW", server.uri());
        RateFetcher::with_timeout(&url, FALLBACK_RATE, Duration::from_secs(10)).unwrap()
    }

    #[test_log::test(tokio::test)]
    async fn test_successful_rate_fetch() {
        let body = r#"{
            "result": "success",
            "base_code": "KRW",
            "rates": { "KRW": 1, "TWD": 0.02315, "USD": 0.00072 }
        }"#;
        let server = create_mock_server(ResponseTemplate::new(200).set_body_string(body)).await;

        let rate = fetcher_for(&server).krw_to_twd().await;
        assert_eq!(rate, 0.02315);
    }

    #[test_log::test(tokio::test)]
    async fn test_error_result_uses_fallback() {
        let body = r#"{ "result": "error", "error-type": "unsupported-code" }"#;
        let server = create_mock_server(ResponseTemplate::new(200).set_body_string(body)).await;

        assert_eq!(fetcher_for(&server).krw_to_twd().await, FALLBACK_RATE);
    }

    #[test_log::test(tokio::test)]
    async fn test_missing_twd_uses_fallback() {
        let body = r#"{ "result": "success", "rates": { "USD": 0.00072 } }"#;
        let server = create_mock_server(ResponseTemplate::new(200).set_body_string(body)).await;

        assert_eq!(fetcher_for(&server).krw_to_twd().await, FALLBACK_RATE);
    }

    #[test_log::test(tokio::test)]
    async fn test_non_positive_rate_uses_fallback() {
        for twd in ["0", "-0.02", "0.0"] {
            let body = format!(r#"{{ "result": "success", "rates": {{ "TWD": {twd} }} }}"#);
            let server =
                create_mock_server(ResponseTemplate::new(200).set_body_string(body)).await;

            assert_eq!(fetcher_for(&server).krw_to_twd().await, FALLBACK_RATE);
        }
    }

    #[test_log::test(tokio::test)]
    async fn test_malformed_json_uses_fallback() {
        let server =
            create_mock_server(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
                .await;

        assert_eq!(fetcher_for(&server).krw_to_twd().await, FALLBACK_RATE);
    }

    #[test_log::test(tokio::test)]
    async fn test_http_error_uses_fallback() {
        let server = create_mock_server(ResponseTemplate::new(503)).await;

        assert_eq!(fetcher_for(&server).krw_to_twd().await, FALLBACK_RATE);
    }

    #[test_log::test(tokio::test)]
    async fn test_timeout_uses_fallback() {
        let body = r#"{ "result": "success", "rates": { "TWD": 0.03 } }"#;
        let server = create_mock_server(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .set_delay(Duration::from_secs(2)),
        )
        .await;
        let url = format!("{}/v6/latest/KRW", server.uri());
        let fetcher =
            RateFetcher::with_timeout(&url, FALLBACK_RATE, Duration::from_millis(200)).unwrap();

        assert_eq!(fetcher.krw_to_twd().await, FALLBACK_RATE);
    }

    #[test_log::test(tokio::test)]
    async fn test_unreachable_host_uses_configured_fallback() {
        // Nothing listens on port 9 locally.
        let fetcher =
            RateFetcher::with_timeout("http://127.0.0.1:9/v6/latest/KRW", 0.025, Duration::from_secs(2))
                .unwrap();

        assert_eq!(fetcher.krw_to_twd().await, 0.025);
    }

    #[tokio::test]
    async fn test_fixed_rate() {
        assert_eq!(FixedRate(0.5).krw_to_twd().await, 0.5);
    }
}
