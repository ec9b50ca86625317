//! REST client for the battle-log API.
//!
//! Thin by design: maps transport and status failures onto the error
//! taxonomy and leaves retry/backoff decisions to the scheduler.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, RETRY_AFTER};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use super::types::{RawBattle, RawProfile};
use super::{BattleSource, PlayerProfile};
use crate::config::ApiConfig;
use crate::domain::subject::display_tag;
use crate::error::{Result, WatchError};

/// Battle-log API client
#[derive(Clone)]
pub struct RoyaleClient {
    http: Client,
    base_url: String,
}

impl RoyaleClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.token))
            .map_err(|e| WatchError::Auth(format!("invalid API token: {}", e)))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let http = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent("battlewatch/0.1")
            .build()
            .map_err(|e| WatchError::Internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Percent-encode a normalized tag for a URL path (`#` becomes `%23`).
    fn encode_tag(tag: &str) -> String {
        urlencoding::encode(&display_tag(tag)).into_owned()
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, tag: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "battle-log API request");

        let response = self.http.get(&url).send().await.map_err(map_send_error)?;
        let response = check_status(response, tag).await?;

        response.json::<T>().await.map_err(|e| {
            WatchError::Transient(format!("undecodable API response for {}: {}", display_tag(tag), e))
        })
    }
}

/// Transport-level failures (timeouts, connection resets) are transient.
fn map_send_error(err: reqwest::Error) -> WatchError {
    if err.is_timeout() || err.is_connect() {
        WatchError::Transient(err.to_string())
    } else {
        WatchError::Http(err)
    }
}

async fn check_status(response: Response, tag: &str) -> Result<Response> {
    let status = response.status();
    match status {
        s if s.is_success() => Ok(response),
        StatusCode::NOT_FOUND => Err(WatchError::NotFound(display_tag(tag))),
        StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => Err(WatchError::Auth(
            "API key invalid or IP not whitelisted".to_string(),
        )),
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            Err(WatchError::RateLimited { retry_after })
        }
        s if s.is_server_error() => Err(WatchError::Transient(format!(
            "upstream returned {} for {}",
            s,
            display_tag(tag)
        ))),
        s => Err(WatchError::Internal(format!(
            "unexpected API status {} for {}",
            s,
            display_tag(tag)
        ))),
    }
}

#[async_trait]
impl BattleSource for RoyaleClient {
    async fn fetch_profile(&self, tag: &str) -> Result<PlayerProfile> {
        let raw: RawProfile = self
            .get_json(&format!("/players/{}", Self::encode_tag(tag)), tag)
            .await?;

        Ok(PlayerProfile {
            tag: tag.to_string(),
            name: raw.name.unwrap_or_else(|| "Unknown".to_string()),
            trophies: raw.trophies,
            arena: raw.arena.and_then(|a| a.name),
        })
    }

    async fn fetch_battle_log(&self, tag: &str) -> Result<Vec<RawBattle>> {
        self.get_json(&format!("/players/{}/battlelog", Self::encode_tag(tag)), tag)
            .await
    }
}
