//! Bearer-credential lifecycle.
//!
//! The upstream issues three kinds of secrets:
//! - an **id token** (short-lived JWT attached to every data request),
//! - a **refresh token** (longer-lived, exchanged for new id tokens),
//! - the account **email + password** (exchanged for a refresh token).
//!
//! [`TokenManager`] walks these in order until one yields an id token the
//! upstream actually accepts. The expiry claim inside the JWT is decoded only
//! as a local hint (see [`jwt`]); trust always comes from a successful
//! authenticated request made through [`AuthApi::probe`].

pub mod jwt;
mod manager;

use async_trait::async_trait;
use secrecy::SecretString;

use crate::errors::AuthError;

pub use manager::{DEFAULT_EXPIRY_BUFFER, TokenManager};

/// The set of secrets the token manager can draw from.
///
/// Every secret is a [`SecretString`], so `Debug` output is redacted.
#[derive(Debug, Clone, Default)]
pub struct Credential {
    pub id_token: Option<SecretString>,
    pub refresh_token: Option<SecretString>,
    pub email: Option<String>,
    pub password: Option<SecretString>,
}

impl Credential {
    /// Credentials from the four `QUOTE_API_*` environment variables; unset ones stay `None`.
    pub fn from_env() -> Self {
        use shared_utils::env::get_optional_env_var;

        Self {
            id_token: get_optional_env_var("QUOTE_API_ID_TOKEN").map(SecretString::from),
            refresh_token: get_optional_env_var("QUOTE_API_REFRESH_TOKEN").map(SecretString::from),
            email: get_optional_env_var("QUOTE_API_EMAIL"),
            password: get_optional_env_var("QUOTE_API_PASSWORD").map(SecretString::from),
        }
    }

    pub fn with_id_token(mut self, token: impl Into<String>) -> Self {
        self.id_token = Some(SecretString::from(token.into()));
        self
    }

    pub fn with_refresh_token(mut self, token: impl Into<String>) -> Self {
        self.refresh_token = Some(SecretString::from(token.into()));
        self
    }

    pub fn with_login(mut self, email: impl Into<String>, password: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self.password = Some(SecretString::from(password.into()));
        self
    }
}

/// The three upstream calls the token manager needs.
///
/// Implemented by the REST client; tests substitute scripted fakes.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// `POST /auth {email, password}` -> refresh token.
    async fn login(&self, email: &str, password: &SecretString) -> Result<SecretString, AuthError>;

    /// `POST /refresh {refreshToken}` -> id token.
    async fn refresh(&self, refresh_token: &SecretString) -> Result<SecretString, AuthError>;

    /// Lightweight authenticated request against a known read endpoint.
    ///
    /// `Ok(())` means the upstream accepted `id_token` right now.
    async fn probe(&self, id_token: &SecretString) -> Result<(), AuthError>;
}
