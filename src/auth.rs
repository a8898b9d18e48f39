//! Credential handling.
//!
//! A [`CredentialProvider`] yields a candidate token, [`Authenticator::login`]
//! validates it against the hub, and the resulting [`Credential`] lives in a
//! shared [`CredentialStore`]. [`AuthenticatedTransport`] reads the store on
//! every call and clears it when the hub rejects the token.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{HubError, Result};
use crate::hub::endpoints::{self, WhoAmIWire};
use crate::hub::Identity;
use crate::transport::{HubRequest, HubResponse, HubStream, Target, Transport, TransportError};

/// Environment variables checked, in order, by [`CachedTokenLookup`].
pub const TOKEN_ENV_VARS: [&str; 2] = ["HF_TOKEN", "HUGGING_FACE_HUB_TOKEN"];

/// A validated bearer token and who it belongs to.
#[derive(Clone)]
pub struct Credential {
    token: String,
    identity: Identity,
}

impl Credential {
    pub fn new(token: impl Into<String>, identity: Identity) -> Self {
        Self {
            token: token.into(),
            identity,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn username(&self) -> &str {
        &self.identity.username
    }
}

// Keep the token out of logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("identity", &self.identity)
            .finish()
    }
}

/// Source of a candidate token, selected at session start.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Short label for logs.
    fn name(&self) -> &'static str;

    /// The candidate token, or `None` if this source has nothing.
    async fn token(&self) -> Result<Option<String>>;
}

/// Token typed in by the user.
pub struct ExplicitToken(String);

impl ExplicitToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl CredentialProvider for ExplicitToken {
    fn name(&self) -> &'static str {
        "explicit"
    }

    async fn token(&self) -> Result<Option<String>> {
        Ok(Some(self.0.clone()))
    }
}

/// Token left behind by other hub tooling: environment first, then the
/// token file under the user's cache directory.
pub struct CachedTokenLookup {
    env_vars: Vec<&'static str>,
    token_path: Option<PathBuf>,
}

impl CachedTokenLookup {
    pub fn new() -> Self {
        Self {
            env_vars: TOKEN_ENV_VARS.to_vec(),
            token_path: default_token_path(),
        }
    }

    /// Only read the given file, ignoring the environment.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            env_vars: Vec::new(),
            token_path: Some(path.into()),
        }
    }
}

impl Default for CachedTokenLookup {
    fn default() -> Self {
        Self::new()
    }
}

fn default_token_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".cache").join("huggingface").join("token"))
}

#[async_trait]
impl CredentialProvider for CachedTokenLookup {
    fn name(&self) -> &'static str {
        "cached"
    }

    async fn token(&self) -> Result<Option<String>> {
        for var in &self.env_vars {
            if let Ok(value) = std::env::var(var) {
                let value = value.trim();
                if !value.is_empty() {
                    tracing::debug!("Using token from ${}", var);
                    return Ok(Some(value.to_string()));
                }
            }
        }

        let Some(path) = &self.token_path else {
            return Ok(None);
        };
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => {
                let token = contents.trim();
                if token.is_empty() {
                    Ok(None)
                } else {
                    tracing::debug!("Using token from {}", path.display());
                    Ok(Some(token.to_string()))
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Holds the current credential for the process lifetime.
#[derive(Debug, Default)]
pub struct CredentialStore {
    current: RwLock<Option<Credential>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Credential> {
        self.current.read().clone()
    }

    pub fn token(&self) -> Option<String> {
        self.current.read().as_ref().map(|c| c.token.clone())
    }

    pub fn username(&self) -> Option<String> {
        self.current
            .read()
            .as_ref()
            .map(|c| c.identity.username.clone())
    }

    pub fn set(&self, credential: Credential) {
        *self.current.write() = Some(credential);
    }

    /// Returns whether a credential was held.
    pub fn clear(&self) -> bool {
        self.current.write().take().is_some()
    }
}

/// Attaches the stored bearer token to every call that has none.
pub struct AuthenticatedTransport<T> {
    inner: T,
    store: Arc<CredentialStore>,
}

impl<T: Transport> AuthenticatedTransport<T> {
    pub fn new(inner: T, store: Arc<CredentialStore>) -> Self {
        Self { inner, store }
    }
}

impl<T: Transport> AuthenticatedTransport<T> {
    /// Attach the stored token. Returns whether it came from the store.
    fn authorize(&self, request: &mut HubRequest) -> bool {
        // Absolute targets are pre-signed storage URLs that must not see our token.
        let from_store = request.bearer.is_none() && matches!(request.target, Target::Hub(_));
        if from_store {
            request.bearer = self.store.token();
        }
        from_store
    }

    fn observe(&self, from_store: bool, err: &TransportError) {
        if let TransportError::Auth { status, .. } = err {
            if from_store && self.store.clear() {
                tracing::warn!("Hub rejected the stored credential ({}), logging out", status);
            }
        }
    }
}

#[async_trait]
impl<T: Transport> Transport for AuthenticatedTransport<T> {
    async fn execute(&self, mut request: HubRequest) -> std::result::Result<HubResponse, TransportError> {
        let from_store = self.authorize(&mut request);
        let result = self.inner.execute(request).await;
        if let Err(err) = &result {
            self.observe(from_store, err);
        }
        result
    }

    async fn execute_stream(
        &self,
        mut request: HubRequest,
    ) -> std::result::Result<HubStream, TransportError> {
        let from_store = self.authorize(&mut request);
        let result = self.inner.execute_stream(request).await;
        if let Err(err) = &result {
            self.observe(from_store, err);
        }
        result
    }
}

/// Login, logout and identity lookups.
pub struct Authenticator {
    transport: Arc<dyn Transport>,
    store: Arc<CredentialStore>,
}

impl Authenticator {
    pub fn new(transport: Arc<dyn Transport>, store: Arc<CredentialStore>) -> Self {
        Self { transport, store }
    }

    /// Obtain a token from `provider`, validate it, and make it current.
    pub async fn login(&self, provider: &dyn CredentialProvider) -> Result<Credential> {
        let token = provider
            .token()
            .await?
            .map(|t| t.trim().to_string())
            .unwrap_or_default();
        if token.is_empty() {
            return Err(HubError::Validation(format!(
                "No token available from the {} source",
                provider.name()
            )));
        }

        let mut request = endpoints::whoami();
        request.bearer = Some(token.clone());
        let identity = self.fetch_identity(request).await?;

        tracing::info!("Logged in as {} via {} token", identity.username, provider.name());
        let credential = Credential::new(token, identity);
        self.store.set(credential.clone());
        Ok(credential)
    }

    /// Re-check the current credential against the hub.
    pub async fn whoami(&self) -> Result<Identity> {
        if self.store.token().is_none() {
            return Err(HubError::Auth {
                status: 401,
                message: "Not logged in".to_string(),
            });
        }
        self.fetch_identity(endpoints::whoami()).await
    }

    pub fn logout(&self) -> bool {
        let was_logged_in = self.store.clear();
        if was_logged_in {
            tracing::info!("Logged out");
        }
        was_logged_in
    }

    pub fn current(&self) -> Option<Credential> {
        self.store.get()
    }

    async fn fetch_identity(&self, request: HubRequest) -> Result<Identity> {
        let response = self.transport.execute(request).await?;
        let wire: WhoAmIWire = response.json()?;
        Ok(wire.into())
    }
}
