use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderMap, HeaderValue};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

use crate::auth::Principal;
use crate::db::Database;
use crate::error::{AppError, Result};

pub const SESSION_COOKIE: &str = "telemed.sid";

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub principal: Principal,
    /// Unix seconds.
    pub expires_at: i64,
}

/// A session resolved from the request cookie.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub principal: Principal,
}

/// Server-side sessions persisted in the database, addressed by a signed
/// cookie.
#[derive(Clone)]
pub struct SessionStore {
    db: Arc<Database>,
    secret: String,
    ttl: Duration,
    secure: bool,
}

impl SessionStore {
    pub fn new(db: Arc<Database>, secret: impl Into<String>, ttl: Duration, secure: bool) -> Self {
        Self {
            db,
            secret: secret.into(),
            ttl,
            secure,
        }
    }

    fn ttl_secs(&self) -> i64 {
        i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX / 2)
    }

    /// Starts a session and returns the `Set-Cookie` value carrying it.
    /// Sessions that expired without a logout are swept first.
    pub fn create(&self, principal: Principal) -> Result<HeaderValue> {
        self.purge_expired()?;

        let token = Uuid::new_v4().simple().to_string();
        let record = SessionRecord {
            principal,
            expires_at: Utc::now().timestamp() + self.ttl_secs(),
        };
        self.db.put_session(&token, &record)?;

        let value = format!("{}.{}", token, self.sign(&token)?);
        self.cookie(&value, self.ttl_secs())
    }

    /// Looks up the session named by the request cookie, sliding its expiry.
    pub fn resolve(&self, headers: &HeaderMap) -> Result<Option<Session>> {
        let Some(token) = self.token_from_headers(headers)? else {
            return Ok(None);
        };
        let principal = self
            .db
            .touch_session(&token, Utc::now().timestamp(), self.ttl_secs())?;
        Ok(principal.map(|principal| Session { token, principal }))
    }

    pub fn destroy(&self, session: &Session) -> Result<()> {
        self.db.remove_session(&session.token)?;
        Ok(())
    }

    pub fn purge_expired(&self) -> Result<usize> {
        let purged = self.db.purge_expired_sessions(Utc::now().timestamp())?;
        if purged > 0 {
            tracing::debug!(purged, "removed expired sessions");
        }
        Ok(purged)
    }

    /// A `Set-Cookie` value that makes the browser drop the session cookie.
    pub fn clear_cookie(&self) -> Result<HeaderValue> {
        self.cookie("", 0)
    }

    fn cookie(&self, value: &str, max_age: i64) -> Result<HeaderValue> {
        let mut cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            SESSION_COOKIE, value, max_age
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        HeaderValue::from_str(&cookie)
            .map_err(|e| AppError::InvalidRequest(format!("bad cookie value: {}", e)))
    }

    fn mac(&self, token: &str) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| AppError::Signing(e.to_string()))?;
        mac.update(token.as_bytes());
        Ok(mac)
    }

    fn sign(&self, token: &str) -> Result<String> {
        Ok(hex::encode(self.mac(token)?.finalize().into_bytes()))
    }

    /// Extracts the token from the cookie, discarding it if the signature
    /// does not verify.
    fn token_from_headers(&self, headers: &HeaderMap) -> Result<Option<String>> {
        let raw = headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == SESSION_COOKIE)
            .map(|(_, value)| value);

        let Some((token, signature)) = raw.and_then(|raw| raw.split_once('.')) else {
            return Ok(None);
        };
        let Ok(signature) = hex::decode(signature) else {
            return Ok(None);
        };
        if token.is_empty() || self.mac(token)?.verify_slice(&signature).is_err() {
            return Ok(None);
        }
        Ok(Some(token.to_string()))
    }
}
