//! Actor identification
//!
//! Authentication happens upstream; the gateway forwards who is acting in
//! two headers. Authorisation is decided by the orchestrator.

use axum::http::HeaderMap;
use thiserror::Error;

use core_kernel::{Actor, Role};

pub const ACTOR_EMAIL_HEADER: &str = "x-actor-email";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// Auth errors
#[derive(Debug, Error, PartialEq)]
pub enum AuthError {
    #[error("Missing header {0}")]
    MissingHeader(&'static str),
    #[error("Invalid actor email")]
    InvalidEmail,
    #[error("Unknown role '{0}'")]
    UnknownRole(String),
}

/// Reads the acting user from the request headers
pub fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, AuthError> {
    let email = header(headers, ACTOR_EMAIL_HEADER)?;
    if !validator::ValidateEmail::validate_email(&email) {
        return Err(AuthError::InvalidEmail);
    }
    let role = header(headers, ACTOR_ROLE_HEADER)?;
    let role: Role = role.parse().map_err(|_| AuthError::UnknownRole(role))?;
    Ok(Actor::new(email, role))
}

fn header(headers: &HeaderMap, name: &'static str) -> Result<String, AuthError> {
    headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(AuthError::MissingHeader(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(email: &str, role: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACTOR_EMAIL_HEADER, HeaderValue::from_str(email).unwrap());
        headers.insert(ACTOR_ROLE_HEADER, HeaderValue::from_str(role).unwrap());
        headers
    }

    #[test]
    fn test_actor_read_from_headers() {
        let actor = actor_from_headers(&headers("ops@reinsurer.co.id", "finance")).unwrap();
        assert_eq!(actor, Actor::new("ops@reinsurer.co.id", Role::Finance));
    }

    #[test]
    fn test_bad_headers_rejected() {
        assert_eq!(
            actor_from_headers(&HeaderMap::new()),
            Err(AuthError::MissingHeader(ACTOR_EMAIL_HEADER))
        );
        assert_eq!(
            actor_from_headers(&headers("not-an-email", "finance")),
            Err(AuthError::InvalidEmail)
        );
        assert_eq!(
            actor_from_headers(&headers("ops@reinsurer.co.id", "auditor")),
            Err(AuthError::UnknownRole("auditor".to_string()))
        );
    }
}
