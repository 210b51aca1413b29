//! Sync client
//!
//! Consumer side of the system. Polls the snapshot reader on a fixed interval
//! and relays the latest reading to the remote endpoint as
//! `{"valence": <float>, "tempo": <int>}`.
//!
//! The anti-forgery token is fetched once per session from a cookie on a GET
//! to the endpoint and echoed as a header on every POST. A missing token is
//! not fatal. There is no delivery cursor: the same row is re-sent on every
//! tick until a newer row appears, so the endpoint must treat deliveries as
//! idempotent overwrites.

use crate::config::{FluxConfig, SyncConfig};
use crate::error::FluxError;
use crate::snapshot::SnapshotReader;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use serde::Serialize;
use std::future::Future;
use tracing::{debug, info, warn};

/// Marker header identifying requests as XHR
pub const XHR_HEADER: &str = "X-Requested-With";

/// Process-local state for one sync run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncSession {
    pub csrf_token: Option<String>,
    /// Last successfully delivered values (telemetry only, not deduplication)
    pub last_sent_valence: Option<f64>,
    pub last_sent_tempo: Option<i64>,
    pub delivered: u64,
}

/// Result of one poll tick
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Log missing, header-only, or unreadable
    NoData,
    /// Latest row could not be interpreted as a payload
    Skipped,
    /// Endpoint answered 200
    Delivered { valence: f64, tempo: i64 },
    /// Endpoint answered with another status
    Rejected { status: u16 },
    /// Request did not complete
    Failed,
}

#[derive(Debug, Serialize)]
struct DeliveryPayload {
    valence: f64,
    tempo: i64,
}

/// Relays log readings to the remote endpoint over one HTTP session
pub struct SyncClient {
    http: reqwest::Client,
    config: SyncConfig,
    csrf_header: HeaderName,
    reader: SnapshotReader,
    session: SyncSession,
}

impl SyncClient {
    pub fn new(config: SyncConfig, reader: SnapshotReader) -> Result<Self, FluxError> {
        let mut defaults = HeaderMap::new();
        for (name, value) in &config.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| FluxError::Config(format!("invalid header name '{}': {}", name, e)))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|e| FluxError::Config(format!("invalid header value for {}: {}", name, e)))?;
            defaults.insert(header_name, header_value);
        }
        let csrf_header = HeaderName::from_bytes(config.csrf_header.as_bytes()).map_err(|e| {
            FluxError::Config(format!("invalid csrf header '{}': {}", config.csrf_header, e))
        })?;

        let http = reqwest::Client::builder()
            .cookie_store(true)
            .default_headers(defaults)
            .build()?;

        Ok(Self {
            http,
            config,
            csrf_header,
            reader,
            session: SyncSession::default(),
        })
    }

    pub fn from_config(config: &FluxConfig) -> Result<Self, FluxError> {
        Self::new(config.sync.clone(), SnapshotReader::new(&config.log.path))
    }

    pub fn session(&self) -> &SyncSession {
        &self.session
    }

    /// Fetch the anti-forgery token for this session.
    ///
    /// Any failure is logged and leaves the session without a token.
    pub async fn bootstrap(&mut self) -> Option<String> {
        info!(endpoint = %self.config.endpoint, "Fetching CSRF token");
        let token = self.fetch_csrf_token().await;
        match &token {
            Some(_) => info!("CSRF token initialized"),
            None => warn!("Continuing without CSRF token"),
        }
        self.session.csrf_token = token.clone();
        token
    }

    async fn fetch_csrf_token(&self) -> Option<String> {
        let response = match self
            .http
            .get(&self.config.endpoint)
            .timeout(self.config.csrf_timeout())
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Error getting CSRF token");
                return None;
            }
        };

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            warn!(status = status.as_u16(), "Unexpected status fetching CSRF token");
            return None;
        }

        let token = response
            .cookies()
            .find(|c| c.name() == self.config.csrf_cookie)
            .map(|c| c.value().to_string());
        if token.is_none() {
            warn!(cookie = %self.config.csrf_cookie, "No CSRF cookie in response");
        }
        token
    }

    /// POST one payload; only a 200 counts as delivered
    pub async fn deliver(&mut self, valence: f64, tempo: i64) -> TickOutcome {
        let mut request = self
            .http
            .post(&self.config.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .header(XHR_HEADER, "XMLHttpRequest")
            .timeout(self.config.request_timeout())
            .json(&DeliveryPayload { valence, tempo });
        if let Some(token) = &self.session.csrf_token {
            request = request.header(self.csrf_header.clone(), token.as_str());
        }

        debug!(valence, tempo, "Sending reading");
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, valence, tempo, "Failed to send reading");
                return TickOutcome::Failed;
            }
        };

        let status = response.status();
        if status == reqwest::StatusCode::OK {
            info!(
                valence,
                tempo,
                previous_valence = ?self.session.last_sent_valence,
                previous_tempo = ?self.session.last_sent_tempo,
                "Delivered reading"
            );
            self.session.last_sent_valence = Some(valence);
            self.session.last_sent_tempo = Some(tempo);
            self.session.delivered += 1;
            TickOutcome::Delivered { valence, tempo }
        } else {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %body, "Endpoint rejected reading");
            TickOutcome::Rejected {
                status: status.as_u16(),
            }
        }
    }

    /// One poll: read the latest row and relay it
    pub async fn tick(&mut self) -> TickOutcome {
        let record = match self.reader.latest() {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!("No valid data found");
                return TickOutcome::NoData;
            }
            Err(e) => {
                warn!(error = %e, "Error reading log snapshot");
                return TickOutcome::NoData;
            }
        };

        match record.parse_payload() {
            Ok((valence, tempo)) => {
                debug!(timestamp = %record.timestamp, valence, tempo, "Read latest reading");
                self.deliver(valence, tempo).await
            }
            Err(e) => {
                warn!(error = %e, timestamp = %record.timestamp, "Skipping invalid values");
                TickOutcome::Skipped
            }
        }
    }

    /// Bootstrap, then poll until interrupted (Ctrl-C)
    pub async fn run(&mut self) {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Cannot listen for interrupt, running until killed");
                std::future::pending::<()>().await;
            }
        })
        .await;
    }

    /// Bootstrap, then poll until `shutdown` resolves
    pub async fn run_until<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        self.bootstrap().await;

        let interval = self.config.poll_interval();
        info!(
            log = %self.reader.log_path().display(),
            interval_ms = interval.as_millis() as u64,
            "Entering monitoring loop"
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                outcome = self.tick() => {
                    debug!(?outcome, "Tick complete");
                }
            }
            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        info!(delivered = self.session.delivered, "Stopping sync client");
    }
}
