//! OAuth 2.0 access tokens for service accounts.
//!
//! Google's service-account flow signs a short-lived JWT with the account's
//! private key and trades it at `token_uri` for a bearer token
//! (the "JWT bearer" grant, RFC 7523).

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::{
    client::{CredentialsSnafu, DecodeSnafu, Error, HttpSnafu, SigningSnafu, TokenExchangeSnafu},
    credentials::ServiceAccountKey,
};

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Lifetime requested for each signed assertion. Google caps it at one hour.
const ASSERTION_LIFETIME: Duration = Duration::from_secs(3600);

/// Tokens this close to expiry are minted again.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: String,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    ASSERTION_LIFETIME.as_secs() as i64
}

/// Lifetime to trust for a token, clamped to `0..=ASSERTION_LIFETIME` so
/// that the expiry instant cannot overflow.
fn token_lifetime(expires_in: i64) -> time::Duration {
    time::Duration::seconds(expires_in.clamp(0, ASSERTION_LIFETIME.as_secs() as i64))
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: OffsetDateTime,
}

impl AccessToken {
    fn is_fresh(&self, now: OffsetDateTime) -> bool {
        now + EXPIRY_MARGIN < self.expires_at
    }
}

/// Mints and caches bearer tokens for one service account.
pub(crate) struct Authenticator {
    http_client: Client,
    key: ServiceAccountKey,
    encoding_key: EncodingKey,
    scopes: Vec<String>,
    cached: Mutex<Option<AccessToken>>,
}

impl Authenticator {
    pub(crate) fn new(
        http_client: Client,
        key: ServiceAccountKey,
        scopes: Vec<String>,
    ) -> Result<Self, Error> {
        let encoding_key = key.encoding_key().context(CredentialsSnafu)?;
        Ok(Self {
            http_client,
            key,
            encoding_key,
            scopes,
            cached: Mutex::new(None),
        })
    }

    pub(crate) fn client_email(&self) -> &str {
        &self.key.client_email
    }

    /// Returns a bearer token, minting a new one when none is cached or the
    /// cached one is about to expire.
    pub(crate) async fn token(&self) -> Result<String, Error> {
        let mut cached = self.cached.lock().await;
        let now = OffsetDateTime::now_utc();

        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(now)) {
            return Ok(token.value.clone());
        }

        let token = self.fetch_token(now).await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    pub(crate) fn sign_assertion(&self, now: OffsetDateTime) -> Result<String, Error> {
        let iat = now.unix_timestamp();
        let claims = Claims {
            iss: &self.key.client_email,
            scope: self.scopes.join(" "),
            aud: &self.key.token_uri,
            iat,
            exp: iat + ASSERTION_LIFETIME.as_secs() as i64,
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key.private_key_id.clone();

        jsonwebtoken::encode(&header, &claims, &self.encoding_key).context(SigningSnafu)
    }

    #[instrument(skip_all, fields(
        token.uri = %self.key.token_uri,
        service_account = %self.key.client_email,
    ))]
    async fn fetch_token(&self, now: OffsetDateTime) -> Result<AccessToken, Error> {
        let assertion = self.sign_assertion(now)?;

        let response = self
            .http_client
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .context(HttpSnafu)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.context(HttpSnafu)?;
            let message = match serde_json::from_str::<TokenErrorResponse>(&body) {
                Ok(TokenErrorResponse {
                    error,
                    error_description: Some(description),
                }) => format!("{error}: {description}"),
                Ok(TokenErrorResponse { error, .. }) => error,
                Err(_) => body,
            };
            return TokenExchangeSnafu {
                status_code: status.as_u16(),
                message,
            }
            .fail();
        }

        let body = response.bytes().await.context(HttpSnafu)?;
        let token: TokenResponse = serde_json::from_slice(&body).context(DecodeSnafu)?;
        debug!(expires_in = token.expires_in, "access token minted");

        Ok(AccessToken {
            value: token.access_token,
            expires_at: now + token_lifetime(token.expires_in),
        })
    }
}
