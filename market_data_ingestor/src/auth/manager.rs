use std::sync::Arc;

use chrono::{Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::auth::{AuthApi, Credential, jwt};
use crate::errors::AuthError;

/// Tokens expiring within this window are refreshed instead of probed.
pub const DEFAULT_EXPIRY_BUFFER: Duration = Duration::seconds(300);

/// Produces an id token the upstream currently accepts.
///
/// The manager owns the session's [`Credential`]. Tokens obtained through the
/// refresh or login tiers replace the in-memory id/refresh token for later calls
/// but are never written anywhere durable; callers that want to persist them
/// read [`TokenManager::current_credential`].
pub struct TokenManager {
    api: Arc<dyn AuthApi>,
    credential: Mutex<Credential>,
    expiry_buffer: Duration,
}

impl TokenManager {
    pub fn new(api: Arc<dyn AuthApi>, credential: Credential) -> Self {
        Self {
            api,
            credential: Mutex::new(credential),
            expiry_buffer: DEFAULT_EXPIRY_BUFFER,
        }
    }

    pub fn with_expiry_buffer(mut self, buffer: Duration) -> Self {
        self.expiry_buffer = buffer;
        self
    }

    /// Snapshot of the credential as it stands after the most recent `get_valid`.
    pub async fn current_credential(&self) -> Credential {
        self.credential.lock().await.clone()
    }

    /// Returns a credential whose id token passed the remote probe.
    ///
    /// Tiers, each attempted at most once, in order:
    /// 1. the current id token, if its expiry hint is beyond the buffer and it probes OK;
    /// 2. a new id token from the refresh token, if it probes OK;
    /// 3. a full login (email + password -> refresh token -> id token), if it probes OK.
    ///
    /// A failing tier falls through to the next one. Only when all of them are
    /// exhausted does this return [`AuthError::NoValidCredential`].
    ///
    /// The credential lock is held for the whole chain, so concurrent callers
    /// wait for one refresh instead of racing their own.
    pub async fn get_valid(&self) -> Result<Credential, AuthError> {
        let mut cred = self.credential.lock().await;

        if let Some(id_token) = cred.id_token.as_ref() {
            if jwt::is_fresh(id_token.expose_secret(), Utc::now(), self.expiry_buffer) {
                match self.api.probe(id_token).await {
                    Ok(()) => {
                        debug!("current id token accepted");
                        return Ok(cred.clone());
                    }
                    Err(err) => warn!(error = %err, "current id token failed the probe"),
                }
            } else {
                debug!("current id token expired or undecodable; skipping probe");
            }
        }

        if let Some(refresh_token) = cred.refresh_token.clone() {
            match self.refresh_and_probe(&refresh_token).await {
                Ok(id_token) => {
                    info!("id token refreshed");
                    cred.id_token = Some(id_token);
                    return Ok(cred.clone());
                }
                Err(err) => warn!(error = %err, "refresh tier failed"),
            }
        }

        if let (Some(email), Some(password)) = (cred.email.clone(), cred.password.clone()) {
            match self.api.login(&email, &password).await {
                Ok(refresh_token) => match self.refresh_and_probe(&refresh_token).await {
                    Ok(id_token) => {
                        info!("logged in with account credentials");
                        cred.refresh_token = Some(refresh_token);
                        cred.id_token = Some(id_token);
                        return Ok(cred.clone());
                    }
                    Err(err) => warn!(error = %err, "login tier failed after obtaining a refresh token"),
                },
                Err(err) => warn!(error = %err, "login tier failed"),
            }
        }

        Err(AuthError::NoValidCredential)
    }

    async fn refresh_and_probe(&self, refresh_token: &SecretString) -> Result<SecretString, AuthError> {
        let id_token = self.api.refresh(refresh_token).await?;
        self.api.probe(&id_token).await?;
        Ok(id_token)
    }
}
