//! Demo login gate.
//!
//! A boolean flag plus an RFC 3339 login timestamp in the key/value store is
//! the whole mechanism; the credential pair is compared locally. This keeps
//! casual visitors on the login screen and is not a security boundary.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;

use crate::logging::log_session;
use crate::storage::KvStore;

pub const DEFAULT_EXPIRY_HOURS: i64 = 8;
/// Remaining time below which a check logs an expiry warning.
pub const EXPIRY_WARNING_MINUTES: i64 = 5;
/// How often a running gate re-checks the stored session.
pub const CHECK_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Valid { remaining_minutes: i64 },
    Expired,
    Missing,
}

impl SessionStatus {
    pub fn is_valid(&self) -> bool {
        matches!(self, SessionStatus::Valid { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    Accepted,
    Rejected,
}

struct Keys {
    authenticated: String,
    auth_time: String,
    user: String,
    remember: String,
}

impl Keys {
    fn new(prefix: &str) -> Self {
        Self {
            authenticated: format!("{}_authenticated", prefix),
            auth_time: format!("{}_auth_time", prefix),
            user: format!("{}_user", prefix),
            remember: format!("{}_remember", prefix),
        }
    }
}

/// Explicit session handle passed to views instead of ambient global state.
pub struct SessionContext<S: KvStore> {
    store: S,
    credentials: Credentials,
    expiry: Duration,
    keys: Keys,
}

impl<S: KvStore> SessionContext<S> {
    pub fn new(store: S, credentials: Credentials, prefix: &str) -> Self {
        Self {
            store,
            credentials,
            expiry: Duration::hours(DEFAULT_EXPIRY_HOURS),
            keys: Keys::new(prefix),
        }
    }

    pub fn with_expiry_hours(mut self, hours: i64) -> Self {
        self.expiry = Duration::hours(hours);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn login(
        &mut self,
        username: &str,
        password: &str,
        remember: bool,
        now: DateTime<Utc>,
    ) -> Result<LoginOutcome> {
        if username != self.credentials.username || password != self.credentials.password {
            log_session("login_rejected", Some(username), &[]);
            return Ok(LoginOutcome::Rejected);
        }
        self.store.set(&self.keys.authenticated, "true")?;
        self.store.set(&self.keys.auth_time, &now.to_rfc3339())?;
        self.store.set(&self.keys.user, username)?;
        if remember {
            self.store.set(&self.keys.remember, "true")?;
        } else {
            self.store.remove(&self.keys.remember)?;
        }
        log_session("login", Some(username), &[("remember", json!(remember))]);
        Ok(LoginOutcome::Accepted)
    }

    pub fn logout(&mut self) -> Result<()> {
        let user = self.user()?;
        self.clear()?;
        log_session("logout", user.as_deref(), &[]);
        Ok(())
    }

    /// Gate check. An expired session is cleared as a side effect.
    pub fn check(&mut self, now: DateTime<Utc>) -> Result<SessionStatus> {
        let authenticated = self.store.get(&self.keys.authenticated)?.as_deref() == Some("true");
        let login_time = self
            .store
            .get(&self.keys.auth_time)?
            .and_then(|ts| DateTime::parse_from_rfc3339(&ts).ok())
            .map(|ts| ts.with_timezone(&Utc));

        let login_time = match (authenticated, login_time) {
            (true, Some(ts)) => ts,
            _ => return Ok(SessionStatus::Missing),
        };

        let elapsed = now.signed_duration_since(login_time);
        if elapsed > self.expiry {
            let user = self.user()?;
            self.clear()?;
            let fields = [("login_time", json!(login_time.to_rfc3339()))];
            log_session("expired", user.as_deref(), &fields);
            return Ok(SessionStatus::Expired);
        }

        let remaining_minutes = (self.expiry - elapsed).num_minutes();
        if remaining_minutes < EXPIRY_WARNING_MINUTES {
            log_session(
                "expiring_soon",
                self.user()?.as_deref(),
                &[("remaining_minutes", json!(remaining_minutes))],
            );
        }
        Ok(SessionStatus::Valid { remaining_minutes })
    }

    pub fn user(&self) -> Result<Option<String>> {
        self.store.get(&self.keys.user)
    }

    pub fn remembered(&self) -> Result<bool> {
        Ok(self.store.get(&self.keys.remember)?.as_deref() == Some("true"))
    }

    fn clear(&mut self) -> Result<()> {
        self.store.remove(&self.keys.authenticated)?;
        self.store.remove(&self.keys.auth_time)?;
        self.store.remove(&self.keys.user)?;
        Ok(())
    }
}
