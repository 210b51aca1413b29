//! Biometric provider client
//!
//! Thin HTTP client for the wearable vendor: reads today's intraday heart-rate
//! series with a bearer token, and exchanges a refresh token for a new pair.
//! Both calls report failure as `None` after logging the cause.

use crate::config::BiometricConfig;
use crate::error::FluxError;
use crate::types::TokenPair;
use serde::Deserialize;
use tracing::{debug, warn};

/// HTTP client for the heart-rate provider
pub struct BiometricClient {
    http: reqwest::Client,
    heart_rate_url: String,
    token_url: String,
    client_id: String,
    client_secret: String,
}

impl BiometricClient {
    pub fn new(config: &BiometricConfig) -> Result<Self, FluxError> {
        let http = reqwest::Client::builder().timeout(config.timeout()).build()?;
        let base = config.api_base.trim_end_matches('/');

        Ok(Self {
            http,
            heart_rate_url: format!("{}{}", base, config.heart_rate_path),
            token_url: format!("{}{}", base, config.token_path),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
        })
    }

    /// Most recent intraday heart rate, or `None` on any failure.
    ///
    /// A `None` is how an expired access token surfaces to the caller.
    pub async fn fetch_heart_rate(&self, access_token: &str) -> Option<u32> {
        let response = match self
            .http
            .get(&self.heart_rate_url)
            .bearer_auth(access_token)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Heart rate request failed");
                return None;
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %body, "Heart rate request rejected");
            return None;
        }

        match response.json::<IntradayHeartPayload>().await {
            Ok(payload) => {
                let latest = payload.latest_value();
                if latest.is_none() {
                    warn!("Heart rate payload has no intraday samples");
                }
                latest
            }
            Err(e) => {
                warn!(error = %e, "Error in heart rate data format");
                None
            }
        }
    }

    /// Exchange a refresh token for a new token pair.
    ///
    /// When the provider omits a new refresh token, the old one is kept.
    pub async fn refresh(&self, refresh_token: &str) -> Option<TokenPair> {
        let form = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let response = match self
            .http
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&form)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Token refresh request failed");
                return None;
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %body, "Error refreshing token");
            return None;
        }

        match response.json::<TokenResponse>().await {
            Ok(tokens) => {
                debug!(rotated = tokens.refresh_token.is_some(), "Token refresh succeeded");
                Some(TokenPair {
                    access_token: tokens.access_token,
                    refresh_token: tokens
                        .refresh_token
                        .unwrap_or_else(|| refresh_token.to_string()),
                })
            }
            Err(e) => {
                warn!(error = %e, "Malformed token refresh response");
                None
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct IntradayHeartPayload {
    #[serde(rename = "activities-heart-intraday")]
    intraday: IntradaySeries,
}

#[derive(Debug, Deserialize)]
struct IntradaySeries {
    dataset: Vec<IntradaySample>,
}

#[derive(Debug, Deserialize)]
struct IntradaySample {
    value: f64,
}

impl IntradayHeartPayload {
    fn latest_value(&self) -> Option<u32> {
        self.intraday
            .dataset
            .last()
            .filter(|s| s.value.is_finite() && s.value >= 0.0)
            .map(|s| s.value.round() as u32)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const HEART_PATH: &str = "/1/user/-/activities/heart/date/today/1d/1min.json";

    fn client_for(server: &MockServer) -> BiometricClient {
        let config = BiometricConfig {
            api_base: server.uri(),
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            ..Default::default()
        };
        BiometricClient::new(&config).unwrap()
    }

    fn intraday(values: &[u32]) -> serde_json::Value {
        let dataset: Vec<serde_json::Value> = values
            .iter()
            .enumerate()
            .map(|(i, v)| serde_json::json!({ "time": format!("10:{:02}:00", i), "value": v }))
            .collect();
        serde_json::json!({
            "activities-heart": [],
            "activities-heart-intraday": { "dataset": dataset, "datasetInterval": 1 }
        })
    }

    #[tokio::test]
    async fn test_fetch_returns_latest_sample() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(HEART_PATH))
            .and(header("authorization", "Bearer good"))
            .respond_with(ResponseTemplate::new(200).set_body_json(intraday(&[61, 64, 70])))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert_eq!(client.fetch_heart_rate("good").await, Some(70));
    }

    #[tokio::test]
    async fn test_fetch_unauthorized_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        assert_eq!(client_for(&server).fetch_heart_rate("expired").await, None);
    }

    #[tokio::test]
    async fn test_fetch_malformed_or_empty_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("authorization", "Bearer empty"))
            .respond_with(ResponseTemplate::new(200).set_body_json(intraday(&[])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(header("authorization", "Bearer odd"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"x": 1})))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert_eq!(client.fetch_heart_rate("empty").await, None);
        assert_eq!(client.fetch_heart_rate("odd").await, None);
    }

    #[tokio::test]
    async fn test_refresh_sends_grant_and_keeps_old_refresh_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .and(header_exists("authorization"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=r-old"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "access_token": "a-new" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let tokens = client_for(&server).refresh("r-old").await.unwrap();
        assert_eq!(tokens.access_token, "a-new");
        assert_eq!(tokens.refresh_token, "r-old");
    }

    #[tokio::test]
    async fn test_refresh_rejected_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .mount(&server)
            .await;

        assert!(client_for(&server).refresh("r-bad").await.is_none());
    }
}
