//! OAuth exchange service
//!
//! Completes the authorization-code flow against the configured provider.
//! The provider's HTTP API sits behind the `OAuthProvider` trait so tests
//! can run the whole flow against a scripted provider. The session id
//! doubles as the OAuth `state` parameter, binding each callback to the
//! session that started the dialogue.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::OAuthConfig;
use crate::db::repositories::UserRepository;
use crate::services::{AuthError, SessionService};

/// Profile data fetched from the provider after a successful exchange
#[derive(Debug, Clone)]
pub struct ProviderProfile {
    /// The provider's numeric identity for the user
    pub provider_id: i64,
    /// Display name reported by the provider
    pub name: String,
}

/// Abstraction over the OAuth provider's HTTP API
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Exchange an authorization code for an access token.
    ///
    /// Codes are single-use; failures are never retried and surface as
    /// `Unauthenticated`.
    async fn exchange_code(&self, code: &str) -> Result<String, AuthError>;

    /// Fetch the user profile for an access token
    async fn fetch_profile(&self, access_token: &str) -> Result<ProviderProfile, AuthError>;
}

/// Facebook Graph API implementation of [`OAuthProvider`]
pub struct FacebookOAuth {
    client: reqwest::Client,
    config: OAuthConfig,
}

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct ProfileResponse {
    id: String,
    name: String,
}

impl FacebookOAuth {
    /// Create a provider adapter from OAuth configuration
    pub fn new(config: OAuthConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Create a boxed provider for use with dependency injection
    pub fn boxed(config: OAuthConfig) -> Arc<dyn OAuthProvider> {
        Arc::new(Self::new(config))
    }
}

#[async_trait]
impl OAuthProvider for FacebookOAuth {
    async fn exchange_code(&self, code: &str) -> Result<String, AuthError> {
        let url = format!("{}/oauth/access_token", self.config.graph_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("code", code),
            ])
            .send()
            .await
            .map_err(|e| {
                tracing::warn!("OAuth code exchange request failed: {}", e);
                AuthError::unauthenticated("code exchange failed")
            })?;

        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "OAuth code exchange rejected");
            return Err(AuthError::unauthenticated("code exchange failed"));
        }

        let body: AccessTokenResponse = response.json().await.map_err(|e| {
            tracing::warn!("OAuth code exchange returned malformed body: {}", e);
            AuthError::unauthenticated("code exchange failed")
        })?;

        Ok(body.access_token)
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<ProviderProfile, AuthError> {
        let url = format!("{}/me", self.config.graph_url);
        let response = self
            .client
            .get(&url)
            .query(&[("access_token", access_token), ("fields", "id,name")])
            .send()
            .await
            .map_err(|e| {
                tracing::warn!("OAuth profile request failed: {}", e);
                AuthError::unauthenticated("profile fetch failed")
            })?;

        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "OAuth profile request rejected");
            return Err(AuthError::unauthenticated("profile fetch failed"));
        }

        let body: ProfileResponse = response.json().await.map_err(|e| {
            tracing::warn!("OAuth profile response malformed: {}", e);
            AuthError::unauthenticated("profile fetch failed")
        })?;

        let provider_id = body
            .id
            .parse::<i64>()
            .map_err(|_| AuthError::unauthenticated("profile fetch failed"))?;

        Ok(ProviderProfile {
            provider_id,
            name: body.name,
        })
    }
}

/// OAuth authorization flow service
pub struct OAuthService {
    provider: Arc<dyn OAuthProvider>,
    sessions: Arc<SessionService>,
    users: Arc<dyn UserRepository>,
    config: OAuthConfig,
}

impl OAuthService {
    /// Create a new OAuth service
    pub fn new(
        provider: Arc<dyn OAuthProvider>,
        sessions: Arc<SessionService>,
        users: Arc<dyn UserRepository>,
        config: OAuthConfig,
    ) -> Self {
        Self {
            provider,
            sessions,
            users,
            config,
        }
    }

    /// Build the provider authorization dialogue URL for a session.
    ///
    /// The session id travels as the `state` parameter and must come back
    /// unchanged on the callback.
    pub fn authorization_url(&self, session_id: &str) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&state={}",
            self.config.authorization_url,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.config.redirect_uri),
            urlencoding::encode(session_id),
        )
    }

    /// Complete an authorization callback.
    ///
    /// Verifies the `state` against issued sessions, exchanges the code,
    /// fetches the profile, upserts the local user and activates the
    /// session. Returns the local user id.
    pub async fn complete_authorization(
        &self,
        state: &str,
        code: &str,
    ) -> Result<i64, AuthError> {
        if code.is_empty() {
            return Err(AuthError::unauthenticated("missing code"));
        }

        // state must be a session this server previously issued
        let session = self
            .sessions
            .get(state)
            .await?
            .ok_or_else(|| AuthError::unauthenticated("state mismatch"))?;

        let access_token = self.provider.exchange_code(code).await?;
        let profile = self.provider.fetch_profile(&access_token).await?;

        let user = self
            .users
            .get_or_create(profile.provider_id, &profile.name)
            .await?;

        self.sessions
            .activate(&session.id, user.id, &access_token)
            .await?;

        tracing::info!(user_id = user.id, "Completed OAuth authorization");
        Ok(user.id)
    }
}
