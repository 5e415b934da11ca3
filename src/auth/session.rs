//! Session cookie handling
//!
//! A session token is `"<user>-<suffix>"` carried in the `auth-session`
//! cookie. With a session secret configured the cookie holds the token sealed
//! with ChaCha20-Poly1305 (`base64url(nonce || ciphertext)`), so it cannot be
//! forged by editing the username. The sealed plaintext is the issue time
//! (big-endian i64 seconds) followed by the token, and tokens older than the
//! max age are rejected. Without a secret the token travels in the clear and
//! is only checked for shape.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chacha20poly1305::{aead::Aead, ChaCha20Poly1305, Key, KeyInit, Nonce};
use chrono::Utc;
use hyper::header::COOKIE;
use hyper::{HeaderMap, Request};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

/// Cookie carrying the session token
pub const SESSION_COOKIE: &str = "auth-session";

/// Nonce length for ChaCha20-Poly1305 (12 bytes)
const NONCE_LEN: usize = 12;

/// Issue-time prefix of the sealed plaintext
const ISSUED_LEN: usize = 8;

/// Default session lifetime in seconds (one day)
pub const DEFAULT_MAX_AGE: u64 = 24 * 60 * 60;

/// Tolerated clock skew for issue times in the future
const CLOCK_SKEW_SECS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("named cookie not present: auth-session")]
    Missing,

    #[error("Unable to decrypt auth-session: {0}")]
    Malformed(String),

    #[error("auth-session expired")]
    Expired,

    #[error("username {0:?} cannot be carried in a session token")]
    InvalidUsername(String),
}

/// Issues and decodes session tokens
pub struct SessionCodec {
    key: Option<Zeroizing<[u8; 32]>>,
    max_age: u64,
    secure: bool,
}

impl SessionCodec {
    /// Create a codec. Any secret string is accepted; it is hashed to a key.
    pub fn new(secret: Option<&str>) -> Self {
        let key = secret.filter(|s| !s.is_empty()).map(|s| {
            let mut key = Zeroizing::new([0u8; 32]);
            key.copy_from_slice(&Sha256::digest(s.as_bytes()));
            key
        });
        Self {
            key,
            max_age: DEFAULT_MAX_AGE,
            secure: false,
        }
    }

    /// Session lifetime in seconds, for both the sealed token and the cookie
    pub fn with_max_age(mut self, seconds: u64) -> Self {
        self.max_age = seconds;
        self
    }

    /// Mark the cookie `Secure` (HTTPS only)
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn max_age(&self) -> u64 {
        self.max_age
    }

    /// Whether cookies are sealed (and therefore verified)
    pub fn is_sealed(&self) -> bool {
        self.key.is_some()
    }

    /// Mint a cookie value for `user`
    pub fn issue(&self, user: &str) -> Result<String, SessionError> {
        self.issue_at(user, Utc::now().timestamp())
    }

    fn issue_at(&self, user: &str, now: i64) -> Result<String, SessionError> {
        if user.is_empty() || user.contains('-') {
            return Err(SessionError::InvalidUsername(user.to_string()));
        }
        let token = format!("{}-{}", user, uuid::Uuid::new_v4().simple());

        let Some(key) = &self.key else {
            return Ok(token);
        };

        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_slice()));
        let mut plaintext = Zeroizing::new(Vec::with_capacity(ISSUED_LEN + token.len()));
        plaintext.extend_from_slice(&now.to_be_bytes());
        plaintext.extend_from_slice(token.as_bytes());
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_slice())
            .map_err(|e| SessionError::Malformed(format!("encryption failed: {e}")))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(sealed))
    }

    /// Decode a cookie value and return the username it names
    pub fn decode(&self, value: &str) -> Result<String, SessionError> {
        self.decode_at(value, Utc::now().timestamp())
    }

    fn decode_at(&self, value: &str, now: i64) -> Result<String, SessionError> {
        let Some(key) = &self.key else {
            return split_token(value).map(str::to_string);
        };

        let (issued_at, token) = unseal(key, value)?;
        if issued_at > now + CLOCK_SKEW_SECS {
            return Err(SessionError::Malformed("issued in the future".into()));
        }
        let max_age = i64::try_from(self.max_age).unwrap_or(i64::MAX);
        if now.saturating_sub(issued_at) > max_age {
            return Err(SessionError::Expired);
        }
        split_token(&token).map(str::to_string)
    }

    /// `Set-Cookie` value for a freshly issued session
    pub fn set_cookie(&self, value: &str) -> String {
        let mut cookie = format!(
            "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Lax",
            SESSION_COOKIE, value, self.max_age
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }

    /// Username of the caller, from the request's session cookie
    pub fn username<B>(&self, req: &Request<B>) -> Result<String, SessionError> {
        let value = cookie_value(req.headers(), SESSION_COOKIE).ok_or(SessionError::Missing)?;
        self.decode(value)
    }

    /// Authentication gate: passes when the request carries a usable session
    pub fn auth<B>(&self, req: &Request<B>) -> Result<(), SessionError> {
        self.username(req).map(|_| ())
    }
}

fn unseal(key: &[u8; 32], value: &str) -> Result<(i64, String), SessionError> {
    let sealed = URL_SAFE_NO_PAD
        .decode(value)
        .map_err(|_| SessionError::Malformed("not base64".into()))?;
    if sealed.len() <= NONCE_LEN {
        return Err(SessionError::Malformed("token too short".into()));
    }
    let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    let plaintext = Zeroizing::new(
        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| SessionError::Malformed("authentication failed".into()))?,
    );
    if plaintext.len() < ISSUED_LEN {
        return Err(SessionError::Malformed("token too short".into()));
    }
    let (issued, token) = plaintext.split_at(ISSUED_LEN);
    let mut stamp = [0u8; ISSUED_LEN];
    stamp.copy_from_slice(issued);
    let token = String::from_utf8(token.to_vec())
        .map_err(|_| SessionError::Malformed("not UTF-8".into()))?;
    Ok((i64::from_be_bytes(stamp), token))
}

/// Split `"<user>-<suffix>"`, returning the user.
///
/// Exactly two non-empty parts are required.
pub fn split_token(token: &str) -> Result<&str, SessionError> {
    let parts: Vec<&str> = token.split('-').collect();
    match parts.as_slice() {
        [user, suffix] if !user.is_empty() && !suffix.is_empty() => Ok(*user),
        _ => Err(SessionError::Malformed(format!(
            "expected 2 parts, got {}",
            parts.len()
        ))),
    }
}

/// Value of a named cookie across all `Cookie` headers
pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|h| h.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.trim_matches('"'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(cookie: Option<&str>) -> Request<()> {
        let mut builder = Request::builder().uri("/");
        if let Some(c) = cookie {
            builder = builder.header(COOKIE, c);
        }
        builder.body(()).unwrap()
    }

    #[test]
    fn test_split_token() {
        assert_eq!(split_token("alice-99f3"), Ok("alice"));
        assert!(matches!(split_token("alice"), Err(SessionError::Malformed(_))));
        assert!(matches!(split_token("alice-99f3-extra"), Err(SessionError::Malformed(_))));
        assert!(matches!(split_token(""), Err(SessionError::Malformed(_))));
        assert!(matches!(split_token("-99f3"), Err(SessionError::Malformed(_))));
        assert!(matches!(split_token("alice-"), Err(SessionError::Malformed(_))));
    }

    #[test]
    fn test_username_from_plain_cookie() {
        let codec = SessionCodec::new(None);
        assert!(!codec.is_sealed());

        let req = request(Some("theme=dark; auth-session=alice-99f3"));
        assert_eq!(codec.username(&req).unwrap(), "alice");
        assert!(codec.auth(&req).is_ok());
    }

    #[test]
    fn test_missing_cookie() {
        let codec = SessionCodec::new(None);
        assert_eq!(codec.username(&request(None)), Err(SessionError::Missing));
        assert_eq!(
            codec.auth(&request(Some("other=1"))),
            Err(SessionError::Missing)
        );
    }

    #[test]
    fn test_malformed_plain_cookie() {
        let codec = SessionCodec::new(None);
        let req = request(Some("auth-session=alice"));
        assert!(matches!(codec.username(&req), Err(SessionError::Malformed(_))));
    }

    #[test]
    fn test_sealed_round_trip() {
        let codec = SessionCodec::new(Some("s3cret"));
        assert!(codec.is_sealed());

        let value = codec.issue("alice").unwrap();
        assert!(!value.starts_with("alice-"));

        let req = request(Some(&format!("auth-session={}", value)));
        assert_eq!(codec.username(&req).unwrap(), "alice");
    }

    #[test]
    fn test_sealed_codec_rejects_plain_and_foreign_tokens() {
        let codec = SessionCodec::new(Some("s3cret"));
        assert!(matches!(codec.decode("alice-99f3"), Err(SessionError::Malformed(_))));

        let other = SessionCodec::new(Some("another-secret"));
        let foreign = other.issue("mallory").unwrap();
        assert!(matches!(codec.decode(&foreign), Err(SessionError::Malformed(_))));
    }

    #[test]
    fn test_issue_rejects_unparseable_usernames() {
        let codec = SessionCodec::new(None);
        assert!(matches!(codec.issue(""), Err(SessionError::InvalidUsername(_))));
        assert!(matches!(codec.issue("mary-jane"), Err(SessionError::InvalidUsername(_))));

        let plain = codec.issue("bob").unwrap();
        assert_eq!(codec.decode(&plain).unwrap(), "bob");
    }

    #[test]
    fn test_set_cookie_header() {
        let codec = SessionCodec::new(None);
        assert_eq!(
            codec.set_cookie("abc"),
            "auth-session=abc; Path=/; Max-Age=86400; HttpOnly; SameSite=Lax"
        );

        let codec = SessionCodec::new(None).with_max_age(600).with_secure(true);
        assert_eq!(
            codec.set_cookie("abc"),
            "auth-session=abc; Path=/; Max-Age=600; HttpOnly; SameSite=Lax; Secure"
        );
    }

    #[test]
    fn test_sealed_token_expires() {
        let codec = SessionCodec::new(Some("s3cret")).with_max_age(3600);
        let issued = 1_700_000_000;
        let value = codec.issue_at("alice", issued).unwrap();

        assert_eq!(codec.decode_at(&value, issued + 10).unwrap(), "alice");
        assert_eq!(codec.decode_at(&value, issued + 3600).unwrap(), "alice");
        assert_eq!(codec.decode_at(&value, issued + 3601), Err(SessionError::Expired));
    }

    #[test]
    fn test_sealed_token_from_the_future_is_rejected() {
        let codec = SessionCodec::new(Some("s3cret"));
        let value = codec.issue_at("alice", 1_700_000_000).unwrap();
        assert!(matches!(
            codec.decode_at(&value, 1_700_000_000 - 3600),
            Err(SessionError::Malformed(_))
        ));
    }
}
