use crate::error::{NotifyError, Result};
use crate::frame::Identity;
use async_trait::async_trait;
use std::fmt;

/// Bearer token presented to the backend
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn token(&self) -> &str {
        &self.0
    }

    /// `Authorization` header value
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Trait for supplying the credential a connection is opened with
///
/// Called on every connection attempt (including retries) so a token
/// refreshed by the authentication layer is picked up without a new
/// `connect`.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// # Returns
    /// * `Ok(Some(credential))` - Connect with this credential
    /// * `Ok(None)` - No credential available; the controller reports an auth error
    /// * `Err(NotifyError)` - The provider itself failed
    async fn credential(&self, identity: &Identity) -> Result<Option<Credential>>;
}

/// A fixed token
pub struct StaticToken(Credential);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Credential::new(token))
    }
}

#[async_trait]
impl CredentialProvider for StaticToken {
    async fn credential(&self, _identity: &Identity) -> Result<Option<Credential>> {
        Ok(Some(self.0.clone()))
    }
}

/// Token read from an environment variable on every attempt
pub struct EnvToken {
    var: String,
}

impl EnvToken {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

#[async_trait]
impl CredentialProvider for EnvToken {
    async fn credential(&self, _identity: &Identity) -> Result<Option<Credential>> {
        match std::env::var(&self.var) {
            Ok(token) if !token.trim().is_empty() => Ok(Some(Credential::new(token))),
            Ok(_) | Err(std::env::VarError::NotPresent) => Ok(None),
            Err(e) => Err(NotifyError::Configuration(format!("{}: {}", self.var, e))),
        }
    }
}

/// Provider for tests and anonymous setups: never has a credential
pub struct NoCredential;

#[async_trait]
impl CredentialProvider for NoCredential {
    async fn credential(&self, _identity: &Identity) -> Result<Option<Credential>> {
        Ok(None)
    }
}
