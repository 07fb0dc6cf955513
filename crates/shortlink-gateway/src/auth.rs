//! Session cookies.
//!
//! Clients are told apart by an opaque `session_token` cookie. POST requests
//! without a token the storage knows about get a freshly minted one, which
//! is set on the response and seen by the handler as the owner token.

use std::convert::Infallible;
use std::fmt::Write as _;

use axum::extract::{FromRequestParts, Request, State};
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue, Method};
use axum::middleware::Next;
use axum::response::Response;
use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use tracing::{debug, warn};

use crate::state::AppState;

pub const SESSION_COOKIE: &str = "session_token";

type HmacSha256 = Hmac<Sha256>;

/// Owner token of the current request. Empty when the client has none.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionToken(pub String);

impl SessionToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Send + Sync> FromRequestParts<S> for SessionToken {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(token) = parts.extensions.get::<SessionToken>() {
            return Ok(token.clone());
        }
        Ok(SessionToken(
            cookie_value(&parts.headers, SESSION_COOKIE).unwrap_or_default(),
        ))
    }
}

/// Mints session tokens: HMAC-SHA256 over 16 random bytes, hex encoded.
#[derive(Clone)]
pub struct SessionSigner {
    mac: HmacSha256,
}

impl std::fmt::Debug for SessionSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionSigner")
    }
}

impl SessionSigner {
    pub fn new(secret: &[u8]) -> Result<Self, InvalidLength> {
        Ok(Self {
            mac: HmacSha256::new_from_slice(secret)?,
        })
    }

    /// A signer keyed with 32 random bytes.
    pub fn random() -> Result<Self, InvalidLength> {
        let mut secret = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret);
        Self::new(&secret)
    }

    pub fn mint(&self) -> String {
        let mut id = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut id);

        let mut mac = self.mac.clone();
        mac.update(to_hex(&id).as_bytes());
        to_hex(&mac.finalize().into_bytes())
    }
}

fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Returns the value of cookie `name`, if any `Cookie` header carries it.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"').to_string())
        .filter(|value| !value.is_empty())
}

/// Middleware issuing session tokens on POST requests.
pub async fn session_cookie(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let presented = cookie_value(request.headers(), SESSION_COOKIE);

    if request.method() != Method::POST {
        request
            .extensions_mut()
            .insert(SessionToken(presented.unwrap_or_default()));
        return next.run(request).await;
    }

    if let Some(token) = presented {
        let known = match state.shortener().token_exists(&token).await {
            Ok(known) => known,
            Err(err) => {
                warn!(error = %err, "session token lookup failed");
                false
            }
        };
        if known {
            request.extensions_mut().insert(SessionToken(token));
            return next.run(request).await;
        }
    }

    let token = state.signer().mint();
    debug!("issued session token");
    request.extensions_mut().insert(SessionToken(token.clone()));

    let mut response = next.run(request).await;
    match HeaderValue::from_str(&format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly")) {
        Ok(cookie) => {
            response.headers_mut().append(SET_COOKIE, cookie);
        }
        Err(err) => warn!(error = %err, "cannot encode session cookie"),
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minted_tokens_are_hex_sha256() {
        let signer = SessionSigner::new(b"secret").unwrap();
        let a = signer.mint();
        let b = signer.mint();

        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn random_signer_works() {
        assert_eq!(SessionSigner::random().unwrap().mint().len(), 64);
    }

    #[test]
    fn hex_encoding() {
        assert_eq!(to_hex(&[0x00, 0x0f, 0xab]), "000fab");
    }

    #[test]
    fn finds_session_cookie_among_others() {
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("theme=dark; session_token=abc123"));
        assert_eq!(
            cookie_value(&headers, SESSION_COOKIE).as_deref(),
            Some("abc123")
        );

        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("theme=dark"));
        headers.append(COOKIE, HeaderValue::from_static("session_token=xyz"));
        assert_eq!(cookie_value(&headers, SESSION_COOKIE).as_deref(), Some("xyz"));
    }

    #[test]
    fn missing_or_empty_cookie_is_none() {
        let headers = HeaderMap::new();
        assert_eq!(cookie_value(&headers, SESSION_COOKIE), None);

        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("session_token="));
        assert_eq!(cookie_value(&headers, SESSION_COOKIE), None);
    }
}
