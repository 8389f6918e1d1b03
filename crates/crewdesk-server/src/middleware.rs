use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use crewdesk_core::{Identity, UserType};
use serde::Serialize;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Caller-supplied ids longer than this are replaced with a fresh one.
const MAX_REQUEST_ID_LEN: usize = 128;

/// Correlation id for one request, echoed in every response envelope.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

type KeyDigest = [u8; 32];

/// Service API key settings used by middleware. Keys are kept only as salted
/// SHA-256 digests.
#[derive(Debug, Clone)]
pub struct AuthState {
    key_digests: Arc<Vec<KeyDigest>>,
    salt: Arc<str>,
    pub enabled: bool,
}

impl AuthState {
    /// Reads `CREWDESK_API_KEYS`, a comma-separated list of bearer tokens.
    ///
    /// An empty list turns auth off in development and is a startup error
    /// everywhere else.
    pub fn from_env(is_development: bool, salt: &str) -> anyhow::Result<Self> {
        let raw = std::env::var("CREWDESK_API_KEYS").unwrap_or_default();
        Self::from_keys(&raw, salt, is_development)
    }

    fn from_keys(raw: &str, salt: &str, is_development: bool) -> anyhow::Result<Self> {
        let key_digests: Vec<KeyDigest> = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|key| digest(salt, key))
            .collect();

        if key_digests.is_empty() {
            if is_development {
                tracing::warn!(
                    "CREWDESK_API_KEYS not set; bearer auth disabled in development environment"
                );
                return Ok(Self::disabled());
            }

            anyhow::bail!(
                "CREWDESK_API_KEYS is required outside development; provide comma-separated bearer tokens"
            );
        }

        Ok(Self {
            key_digests: Arc::new(key_digests),
            salt: Arc::from(salt),
            enabled: true,
        })
    }

    #[must_use]
    pub fn disabled() -> Self {
        Self {
            key_digests: Arc::new(Vec::new()),
            salt: Arc::from(""),
            enabled: false,
        }
    }

    fn allows(&self, token: &str) -> bool {
        let presented = digest(&self.salt, token);
        self.key_digests.iter().fold(false, |found, key| {
            found | bool::from(key.as_slice().ct_eq(presented.as_slice()))
        })
    }
}

fn digest(salt: &str, token: &str) -> KeyDigest {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(token.as_bytes());
    hasher.finalize().into()
}

#[derive(Debug, Serialize)]
struct Rejection {
    error: RejectionDetail,
}

#[derive(Debug, Serialize)]
struct RejectionDetail {
    code: &'static str,
    message: &'static str,
}

fn unauthorized(message: &'static str) -> Response {
    let body = Rejection {
        error: RejectionDetail {
            code: "unauthorized",
            message,
        },
    };
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}

/// Tags the request with a [`RequestId`] and echoes it in the
/// `x-request-id` response header. A usable inbound id is kept.
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = header_str(req.headers(), REQUEST_ID_HEADER)
        .filter(|id| id.len() <= MAX_REQUEST_ID_LEN)
        .map_or_else(|| Uuid::new_v4().to_string(), str::to_owned);
    req.extensions_mut().insert(RequestId(id.clone()));

    let mut res = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        res.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    res
}

/// Rejects requests without a configured service key, unless auth is off.
pub async fn require_bearer_auth(
    State(auth): State<AuthState>,
    req: Request,
    next: Next,
) -> Response {
    if !auth.enabled {
        return next.run(req).await;
    }

    match bearer_token(req.headers()) {
        Some(token) if auth.allows(token) => next.run(req).await,
        _ => unauthorized("missing or invalid bearer token"),
    }
}

/// Middleware reading the caller identity forwarded by the authentication
/// front end (`x-user-type`, `x-user-id`, `x-company-id`) into an
/// [`Identity`] request extension.
pub async fn require_identity(mut req: Request, next: Next) -> Response {
    match identity_from_headers(req.headers()) {
        Some(identity) => {
            req.extensions_mut().insert(identity);
            next.run(req).await
        }
        None => unauthorized("missing or malformed caller identity"),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn identity_from_headers(headers: &HeaderMap) -> Option<Identity> {
    let user_type: UserType = header_str(headers, "x-user-type")?.parse().ok()?;
    let user_id: i64 = header_str(headers, "x-user-id")?.parse().ok()?;
    let company_id = match header_str(headers, "x-company-id") {
        Some(raw) => Some(raw.parse::<i64>().ok()?),
        None => None,
    };

    match user_type {
        UserType::Admin => Some(Identity::admin(user_id, company_id)),
        UserType::Personnel => Some(Identity::personnel(user_id, company_id?)),
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    header_str(headers, AUTHORIZATION.as_str())?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn bearer_token_is_read_from_authorization() {
        let map = headers(&[("authorization", "Bearer svc-key")]);
        assert_eq!(bearer_token(&map), Some("svc-key"));
    }

    #[test]
    fn other_schemes_and_blank_tokens_are_ignored() {
        assert_eq!(bearer_token(&headers(&[("authorization", "Basic abc123")])), None);
        assert_eq!(bearer_token(&headers(&[("authorization", "Bearer   ")])), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[test]
    fn empty_key_list_disables_auth_in_development() {
        let state = AuthState::from_keys("", "salt", true).expect("dev should allow missing keys");
        assert!(!state.enabled);
    }

    #[test]
    fn auth_state_requires_keys_outside_dev() {
        assert!(AuthState::from_keys(" , ", "salt", false).is_err());
    }

    #[test]
    fn auth_state_matches_only_configured_keys() {
        let state = AuthState::from_keys("alpha, beta", "salt", false).expect("keys");
        assert!(state.enabled);
        assert!(state.allows("alpha"));
        assert!(state.allows("beta"));
        assert!(!state.allows("gamma"));
        assert!(!state.allows(""));
    }

    #[test]
    fn key_digest_depends_on_salt() {
        assert_ne!(digest("a", "token"), digest("b", "token"));
    }

    #[test]
    fn personnel_identity_requires_company() {
        let h = headers(&[("x-user-type", "personnel"), ("x-user-id", "7")]);
        assert_eq!(identity_from_headers(&h), None);

        let h = headers(&[
            ("x-user-type", "personnel"),
            ("x-user-id", "7"),
            ("x-company-id", "3"),
        ]);
        assert_eq!(identity_from_headers(&h), Some(Identity::personnel(7, 3)));
    }

    #[test]
    fn admin_identity_company_is_optional() {
        let h = headers(&[("x-user-type", "admin"), ("x-user-id", "1")]);
        assert_eq!(identity_from_headers(&h), Some(Identity::admin(1, None)));
    }

    #[test]
    fn malformed_identity_is_rejected() {
        let h = headers(&[("x-user-type", "guest"), ("x-user-id", "1")]);
        assert_eq!(identity_from_headers(&h), None);

        let h = headers(&[("x-user-type", "admin"), ("x-user-id", "one")]);
        assert_eq!(identity_from_headers(&h), None);

        let h = headers(&[
            ("x-user-type", "admin"),
            ("x-user-id", "1"),
            ("x-company-id", "x"),
        ]);
        assert_eq!(identity_from_headers(&h), None);
    }
}
