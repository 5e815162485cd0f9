//! # Authentication Module
//!
//! Request extractors for the two kinds of callers the API serves:
//!
//! - portal users, identified by an HS256 bearer token issued by the portal
//!   login (`sub` is the email, plus `name` and `role`);
//! - machine callers (the periodic trigger and the video provider webhook),
//!   identified by the shared `X-Cron-Secret` header. Triggers are open
//!   when no secret is configured; the webhook is not.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use liveclass_core::errors::ClassError;
use liveclass_core::models::{Actor, PortalIdentity, Role};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::middleware::error_handling::AppError;
use crate::ApiState;

pub const CRON_SECRET_HEADER: &str = "x-cron-secret";

/// Claims of a portal session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalClaims {
    /// Email of the signed-in user.
    pub sub: String,
    pub name: String,
    pub role: Role,
    pub exp: i64,
}

/// Signs a token in the format the portal login issues.
pub fn issue_portal_token(secret: &str, identity: &PortalIdentity, ttl: Duration) -> eyre::Result<String> {
    let claims = PortalClaims {
        sub: identity.email.clone(),
        name: identity.name.clone(),
        role: identity.role,
        exp: (Utc::now() + ttl).timestamp(),
    };
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok(token)
}

pub fn verify_portal_token(secret: &str, token: &str) -> Result<PortalIdentity, ClassError> {
    let data = decode::<PortalClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|e| {
        tracing::debug!("Rejected portal token: {}", e);
        ClassError::AuthenticationRequired
    })?;

    Ok(PortalIdentity {
        email: data.claims.sub,
        name: data.claims.name,
        role: data.claims.role,
    })
}

fn bearer_token(parts: &Parts) -> Result<Option<&str>, ClassError> {
    let Some(value) = parts.headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value.to_str().map_err(|_| ClassError::AuthenticationRequired)?;
    value
        .strip_prefix("Bearer ")
        .map(|token| Some(token.trim()))
        .ok_or(ClassError::AuthenticationRequired)
}

/// A signed-in portal user. Rejects the request when no valid token is sent.
#[derive(Debug, Clone)]
pub struct PortalUser(pub PortalIdentity);

impl PortalUser {
    pub fn actor(&self) -> Actor {
        Actor::person(self.0.email.clone(), self.0.role)
    }
}

#[async_trait]
impl FromRequestParts<Arc<ApiState>> for PortalUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<ApiState>) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?.ok_or(ClassError::AuthenticationRequired)?;
        Ok(PortalUser(verify_portal_token(&state.auth.jwt_secret, token)?))
    }
}

/// A portal user if a bearer token is present. An invalid token is still
/// rejected rather than treated as anonymous.
#[derive(Debug, Clone)]
pub struct MaybePortalUser(pub Option<PortalIdentity>);

#[async_trait]
impl FromRequestParts<Arc<ApiState>> for MaybePortalUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<ApiState>) -> Result<Self, Self::Rejection> {
        match bearer_token(parts)? {
            Some(token) => Ok(MaybePortalUser(Some(verify_portal_token(&state.auth.jwt_secret, token)?))),
            None => Ok(MaybePortalUser(None)),
        }
    }
}

fn digest(value: &[u8]) -> [u8; 32] {
    Sha256::digest(value).into()
}

fn check_shared_secret(parts: &Parts, expected: &str) -> Result<(), ClassError> {
    let presented = parts
        .headers
        .get(CRON_SECRET_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or(ClassError::AuthenticationRequired)?;

    if digest(presented.as_bytes()) != digest(expected.as_bytes()) {
        return Err(ClassError::Forbidden("invalid cron secret".into()));
    }
    Ok(())
}

/// Guard for trigger routes. Passes every request when no secret is
/// configured.
#[derive(Debug, Clone, Copy)]
pub struct CronCaller;

#[async_trait]
impl FromRequestParts<Arc<ApiState>> for CronCaller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<ApiState>) -> Result<Self, Self::Rejection> {
        if let Some(expected) = &state.auth.cron_secret {
            check_shared_secret(parts, expected)?;
        }
        Ok(CronCaller)
    }
}

/// Guard for provider webhooks, which write data. Refuses every request
/// when no secret is configured.
#[derive(Debug, Clone, Copy)]
pub struct WebhookCaller;

#[async_trait]
impl FromRequestParts<Arc<ApiState>> for WebhookCaller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<ApiState>) -> Result<Self, Self::Rejection> {
        let Some(expected) = &state.auth.cron_secret else {
            return Err(ClassError::Forbidden("webhooks are disabled until CRON_SECRET is set".into()).into());
        };
        check_shared_secret(parts, expected)?;
        Ok(WebhookCaller)
    }
}
