//! Caller identity for the key sync routes.
//!
//! Identity is delegated to an [`Authenticator`], which turns a bearer token
//! into a user id. [`StaticTokens`] serves the token table from configuration;
//! a hosted identity provider plugs in behind the same trait.
use std::collections::HashMap;

use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
};
use threadkeep_config::TokenGrant;

use crate::{error::AppError, state::SharedState};

#[async_trait]
pub trait Authenticator: Send + Sync {
    /// User id for a valid token, `None` otherwise.
    async fn authenticate(&self, token: &str) -> Option<String>;
}

#[derive(Debug, Clone, Default)]
pub struct StaticTokens {
    users: HashMap<String, String>,
}

impl StaticTokens {
    pub fn new(grants: &[TokenGrant]) -> Self {
        let users = grants
            .iter()
            .map(|g| (g.token.trim().to_string(), g.user_id.trim().to_string()))
            .collect();
        Self { users }
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl Authenticator for StaticTokens {
    async fn authenticate(&self, token: &str) -> Option<String> {
        self.users.get(token).cloned()
    }
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Resolve the bearer token on a request, if any, to a user id.
pub async fn current_user(state: &SharedState, headers: &HeaderMap) -> Option<String> {
    let token = bearer_token(headers)?;
    state.authenticator.authenticate(token).await
}

/// Extractor for routes that require a signed-in caller.
#[derive(Debug, Clone)]
pub struct AuthUser(pub String);

impl FromRequestParts<SharedState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        if bearer_token(&parts.headers).is_none() {
            return Err(AppError::Unauthorized("missing bearer token".into()));
        }
        current_user(state, &parts.headers)
            .await
            .map(AuthUser)
            .ok_or_else(|| AppError::Unauthorized("invalid bearer token".into()))
    }
}
