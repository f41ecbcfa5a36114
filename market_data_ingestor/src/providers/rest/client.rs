use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{Client, RequestBuilder, Response, Url};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use snafu::{OptionExt, ResultExt, ensure};
use tracing::{debug, info, warn};

use crate::auth::AuthApi;
use crate::errors::{AuthError, FetchError};
use crate::models::{DateRange, OhlcvRecord, SymbolInfo};
use crate::providers::rest::params::{LoginBody, QuotesQuery, RefreshBody};
use crate::providers::rest::response::{LoginResponse, RefreshResponse, parse_listing, parse_quotes};
use crate::providers::{ClientBuildSnafu, ClientInitError, InvalidBaseUrlSnafu, QuoteSource, ZeroTimeoutSnafu};

/// Connection settings for [`RestClient`].
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub base_url: String,
    /// Applied to every request, connect through body.
    pub timeout: Duration,
    /// Client-side quota shared by every endpoint; `None` disables limiting.
    pub requests_per_minute: Option<NonZeroU32>,
}

impl ClientSettings {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(30),
            requests_per_minute: None,
        }
    }
}

/// Stateless HTTP transport for the quote upstream.
///
/// Implements both [`AuthApi`] (token endpoints and the probe) and
/// [`QuoteSource`] (`/quotes`, `/listing`). Holds no credential: the id token is
/// supplied per call.
pub struct RestClient {
    client: Client,
    base_url: String,
    limiter: Option<DefaultDirectRateLimiter>,
}

impl RestClient {
    pub fn new(settings: ClientSettings) -> Result<Self, ClientInitError> {
        ensure!(!settings.timeout.is_zero(), ZeroTimeoutSnafu);

        let base_url = settings.base_url.trim_end_matches('/').to_string();
        Url::parse(&base_url)
            .ok()
            .filter(|url| matches!(url.scheme(), "http" | "https"))
            .context(InvalidBaseUrlSnafu { url: settings.base_url.clone() })?;

        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .context(ClientBuildSnafu)?;

        let limiter = settings
            .requests_per_minute
            .map(|rpm| RateLimiter::direct(Quota::per_minute(rpm)));

        Ok(Self {
            client,
            base_url,
            limiter,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Waits for the rate limiter, sends, and rejects non-2xx statuses.
    async fn send(&self, request: RequestBuilder) -> Result<Response, FetchError> {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }
        Ok(response)
    }

    async fn get_json(&self, path: &str, id_token: &SecretString, query: Option<&QuotesQuery>) -> Result<Value, FetchError> {
        let mut request = self.client.get(self.endpoint(path)).bearer_auth(id_token.expose_secret());
        if let Some(query) = query {
            request = request.query(query);
        }
        Ok(self.send(request).await?.json::<Value>().await?)
    }

    async fn listing(&self, id_token: &SecretString) -> Result<Vec<SymbolInfo>, FetchError> {
        let body = self.get_json("listing", id_token, None).await?;
        parse_listing(&body)
    }
}

/// Status rejections become `RemoteRejected`; everything else is transport.
fn auth_error(err: FetchError) -> AuthError {
    match err {
        FetchError::HttpStatus(status) => AuthError::RemoteRejected { status },
        other => AuthError::Transport(other),
    }
}

#[async_trait]
impl AuthApi for RestClient {
    async fn login(&self, email: &str, password: &SecretString) -> Result<SecretString, AuthError> {
        let request = self.client.post(self.endpoint("auth")).json(&LoginBody {
            email,
            password: password.expose_secret(),
        });
        let response = self.send(request).await.map_err(auth_error)?;
        let body: LoginResponse = response.json().await.map_err(|e| auth_error(e.into()))?;

        body.refresh_token
            .filter(|t| !t.is_empty())
            .map(SecretString::from)
            .ok_or_else(|| AuthError::InvalidResponse("missing refreshToken".into()))
    }

    async fn refresh(&self, refresh_token: &SecretString) -> Result<SecretString, AuthError> {
        let request = self.client.post(self.endpoint("refresh")).json(&RefreshBody {
            refresh_token: refresh_token.expose_secret(),
        });
        let response = self.send(request).await.map_err(auth_error)?;
        let body: RefreshResponse = response.json().await.map_err(|e| auth_error(e.into()))?;

        body.id_token
            .filter(|t| !t.is_empty())
            .map(SecretString::from)
            .ok_or_else(|| AuthError::InvalidResponse("missing idToken".into()))
    }

    async fn probe(&self, id_token: &SecretString) -> Result<(), AuthError> {
        let request = self.client.get(self.endpoint("listing")).bearer_auth(id_token.expose_secret());
        self.send(request).await.map_err(auth_error)?;
        Ok(())
    }
}

#[async_trait]
impl QuoteSource for RestClient {
    async fn fetch_series(
        &self,
        symbol: &str,
        range: &DateRange,
        id_token: &SecretString,
    ) -> Result<Vec<OhlcvRecord>, FetchError> {
        let query = QuotesQuery::new(symbol, range);
        debug!(symbol, %range, "requesting quotes");

        let body = self.get_json("quotes", id_token, Some(&query)).await?;
        let records = parse_quotes(&body, symbol, range)?;

        info!(symbol, %range, count = records.len(), "fetched quotes");
        Ok(records)
    }

    async fn fetch_all_symbols(&self, id_token: &SecretString) -> Vec<SymbolInfo> {
        match self.listing(id_token).await {
            Ok(symbols) => {
                info!(count = symbols.len(), "fetched symbol listing");
                symbols
            }
            Err(err) => {
                warn!(error = %err, "symbol listing unavailable; returning empty catalog");
                Vec::new()
            }
        }
    }
}
