//! Bearer token authentication.
//!
//! A [`CredentialProvider`] is whatever can mint access tokens (a cloud
//! identity SDK, a static token in tests). [`BearerTokenProvider`] asks it for
//! a token scoped to one identity scope, and [`AuthenticationHandler`] puts
//! that token on every request passing through the pipeline.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use http::header::AUTHORIZATION;

use crate::error::{RestClientError, Result};
use crate::http::{HttpRequest, HttpResponse};
use crate::transport::{Next, RequestHandler};

/// An access token. `Debug` does not print the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    token: String,
}

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }

    pub fn secret(&self) -> &str {
        &self.token
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// Source of access tokens.
#[async_trait]
pub trait CredentialProvider: Send + Sync + fmt::Debug {
    async fn get_token(&self, scopes: &[String]) -> Result<AccessToken>;
}

/// Produces the value of the `Authorization` header.
#[async_trait]
pub trait TokenProvider: Send + Sync + fmt::Debug {
    async fn authorization(&self) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct BearerTokenProvider {
    credential: Arc<dyn CredentialProvider>,
    scopes: Vec<String>,
}

impl BearerTokenProvider {
    pub fn new(credential: Arc<dyn CredentialProvider>, identity_scope: &str) -> Result<Self> {
        if identity_scope.trim().is_empty() {
            return Err(RestClientError::blank("identity_scope"));
        }
        Ok(Self {
            credential,
            scopes: vec![identity_scope.to_string()],
        })
    }
}

#[async_trait]
impl TokenProvider for BearerTokenProvider {
    async fn authorization(&self) -> Result<String> {
        let token = self.credential.get_token(&self.scopes).await?;
        Ok(format!("Bearer {}", token.secret()))
    }
}

/// Pipeline stage that authenticates each request.
#[derive(Debug, Clone)]
pub struct AuthenticationHandler {
    tokens: Arc<dyn TokenProvider>,
}

impl AuthenticationHandler {
    pub fn new(tokens: Arc<dyn TokenProvider>) -> Self {
        Self { tokens }
    }
}

#[async_trait]
impl RequestHandler for AuthenticationHandler {
    async fn handle(&self, mut request: HttpRequest, next: Next<'_>) -> Result<HttpResponse> {
        let value = self.tokens.authorization().await?;
        tracing::debug!(uri = %request.uri, "attaching bearer token");
        request.set_header(AUTHORIZATION.as_str(), value);
        next.run(request).await
    }
}
