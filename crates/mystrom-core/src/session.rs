// ── Session manager ──
//
// Owns the cloud auth token. One login call per `login()`, no internal
// retry and no proactive expiry handling: an expired token only shows up
// as a failed later call, and re-login is the caller's decision.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use secrecy::SecretString;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::backend::CloudBackend;
use crate::config::Credentials;
use crate::error::CoreError;

pub struct SessionManager {
    cloud: Arc<dyn CloudBackend>,
    credentials: Credentials,
    token: ArcSwapOption<SecretString>,
    connected: watch::Sender<bool>,
}

impl SessionManager {
    pub fn new(cloud: Arc<dyn CloudBackend>, credentials: Credentials) -> Self {
        let (connected, _) = watch::channel(false);
        Self {
            cloud,
            credentials,
            token: ArcSwapOption::empty(),
            connected,
        }
    }

    /// Perform one login exchange.
    ///
    /// On success the token is stored and connectivity goes `true`. Every
    /// failure (rejected credentials, vendor error body, missing token,
    /// transport error) sets connectivity `false` and is returned as
    /// [`CoreError::Authentication`]. A previously stored token is kept.
    pub async fn login(&self) -> Result<(), CoreError> {
        match self
            .cloud
            .login(&self.credentials.email, &self.credentials.password)
            .await
        {
            Ok(token) => {
                self.token.store(Some(Arc::new(token)));
                self.connected.send_replace(true);
                info!(email = %self.credentials.email, "cloud login successful");
                Ok(())
            }
            Err(e) => {
                self.connected.send_replace(false);
                warn!(error = %e, "cloud login failed");
                Err(CoreError::Authentication {
                    message: e.to_string(),
                })
            }
        }
    }

    /// The current token, or [`CoreError::NotAuthenticated`] before the
    /// first successful login.
    pub fn token(&self) -> Result<Arc<SecretString>, CoreError> {
        self.token.load_full().ok_or(CoreError::NotAuthenticated)
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.load().is_some()
    }

    /// Last login outcome.
    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Subscribe to connectivity changes.
    pub fn connectivity(&self) -> watch::Receiver<bool> {
        self.connected.subscribe()
    }
}
