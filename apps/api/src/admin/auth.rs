//! Admin authentication: attempt counting, lockout cooldown, session expiry.
//!
//! unauthenticated ──(wrong password, attempts < max)──▶ unauthenticated
//! unauthenticated ──(wrong password, attempts == max)──▶ locked out
//! locked out ──(cooldown elapsed)──▶ unauthenticated
//! unauthenticated ──(correct password)──▶ authenticated
//! authenticated ──(TTL elapsed or logout)──▶ unauthenticated

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{Config, Environment};
use crate::errors::AppError;
use crate::storage::KvStore;

#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub environment: Environment,
    pub password: Option<String>,
    pub max_attempts: u32,
    pub cooldown: Duration,
    pub session_ttl: Duration,
}

impl AuthSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            environment: config.environment,
            password: config.admin_password.clone(),
            max_attempts: config.admin_max_attempts,
            cooldown: Duration::minutes(config.admin_cooldown_minutes),
            session_ttl: Duration::hours(config.admin_session_hours),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminSession {
    pub owner_id: String,
    pub environment: Environment,
    pub authenticated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginAttempt {
    pub owner_id: String,
    pub attempts: u32,
    pub last_attempt_at: DateTime<Utc>,
    pub cooldown_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthOutcome {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_minutes: Option<i64>,
}

impl AuthOutcome {
    fn rejected(message: String, cooldown_minutes: Option<i64>) -> Self {
        Self {
            success: false,
            message,
            cooldown_minutes,
        }
    }
}

fn session_key(owner_id: &str) -> String {
    format!("admin:{owner_id}:session")
}

fn attempts_key(owner_id: &str) -> String {
    format!("admin:{owner_id}:attempts")
}

/// Whole minutes until `until`, rounded up so "0 minutes" is never shown.
fn minutes_until(until: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let seconds = (until - now).num_seconds().max(0);
    ((seconds + 59) / 60).max(1)
}

/// Length-independent comparison that does not short-circuit on the first mismatch.
fn passwords_match(given: &str, expected: &str) -> bool {
    let (a, b) = (given.as_bytes(), expected.as_bytes());
    let mut diff = a.len() ^ b.len();
    for i in 0..a.len().max(b.len()) {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        diff |= usize::from(x ^ y);
    }
    diff == 0
}

pub struct AdminAuth {
    kv: Arc<dyn KvStore>,
    settings: AuthSettings,
}

impl AdminAuth {
    pub fn new(kv: Arc<dyn KvStore>, settings: AuthSettings) -> Self {
        Self { kv, settings }
    }

    /// Open in development, required in staging and production.
    pub fn is_auth_required(&self) -> bool {
        self.settings.environment.requires_admin_auth()
    }

    pub async fn authenticate(
        &self,
        owner_id: &str,
        chat_id: &str,
        password: &str,
    ) -> Result<AuthOutcome, AppError> {
        self.authenticate_at(owner_id, chat_id, password, Utc::now())
            .await
    }

    pub(crate) async fn authenticate_at(
        &self,
        owner_id: &str,
        chat_id: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<AuthOutcome, AppError> {
        let mut attempt = self
            .load_attempts(owner_id)
            .await?
            .unwrap_or_else(|| LoginAttempt {
                owner_id: owner_id.to_string(),
                attempts: 0,
                last_attempt_at: now,
                cooldown_until: None,
            });

        if let Some(until) = attempt.cooldown_until {
            if until > now {
                let minutes = minutes_until(until, now);
                warn!(owner_id, chat_id, "Admin login rejected during cooldown");
                return Ok(AuthOutcome::rejected(
                    format!("Too many failed attempts. Try again in {minutes} minute(s)."),
                    Some(minutes),
                ));
            }
            attempt.attempts = 0;
            attempt.cooldown_until = None;
        }

        let Some(expected) = self.settings.password.as_deref() else {
            warn!(owner_id, "Admin login attempted but no admin password is configured");
            return Ok(AuthOutcome::rejected(
                "Admin access is not configured.".to_string(),
                None,
            ));
        };

        if passwords_match(password, expected) {
            let session = AdminSession {
                owner_id: owner_id.to_string(),
                environment: self.settings.environment,
                authenticated_at: now,
                expires_at: now + self.settings.session_ttl,
            };
            self.kv
                .put(
                    &session_key(owner_id),
                    &serde_json::to_string(&session).map_err(anyhow::Error::from)?,
                    Some(self.settings.session_ttl.num_seconds().max(1) as u64),
                )
                .await?;
            self.kv.delete(&attempts_key(owner_id)).await?;

            info!(owner_id, chat_id, "Admin authenticated");
            return Ok(AuthOutcome {
                success: true,
                message: format!(
                    "Authenticated for {} hour(s).",
                    self.settings.session_ttl.num_hours()
                ),
                cooldown_minutes: None,
            });
        }

        attempt.attempts += 1;
        attempt.last_attempt_at = now;
        let outcome = if attempt.attempts >= self.settings.max_attempts {
            let until = now + self.settings.cooldown;
            attempt.cooldown_until = Some(until);
            let minutes = minutes_until(until, now);
            warn!(owner_id, chat_id, attempts = attempt.attempts, "Admin locked out");
            AuthOutcome::rejected(
                format!("Too many failed attempts. Try again in {minutes} minute(s)."),
                Some(minutes),
            )
        } else {
            let remaining = self.settings.max_attempts - attempt.attempts;
            warn!(owner_id, chat_id, attempts = attempt.attempts, "Admin login failed");
            AuthOutcome::rejected(
                format!("Incorrect password. {remaining} attempt(s) remaining."),
                None,
            )
        };

        self.kv
            .put(
                &attempts_key(owner_id),
                &serde_json::to_string(&attempt).map_err(anyhow::Error::from)?,
                Some(self.settings.cooldown.num_seconds().max(1) as u64 * 2),
            )
            .await?;

        Ok(outcome)
    }

    pub async fn is_authenticated(&self, owner_id: &str) -> Result<bool, AppError> {
        self.is_authenticated_at(owner_id, Utc::now()).await
    }

    /// Expired sessions count as absent and are deleted on the way out.
    pub(crate) async fn is_authenticated_at(
        &self,
        owner_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        if !self.is_auth_required() {
            return Ok(true);
        }

        let Some(raw) = self.kv.get(&session_key(owner_id)).await? else {
            return Ok(false);
        };
        let session: AdminSession = match serde_json::from_str(&raw) {
            Ok(session) => session,
            Err(e) => {
                warn!(owner_id, "Discarding unreadable admin session: {e}");
                self.kv.delete(&session_key(owner_id)).await?;
                return Ok(false);
            }
        };

        if session.expires_at <= now {
            self.kv.delete(&session_key(owner_id)).await?;
            return Ok(false);
        }
        Ok(true)
    }

    pub async fn logout(&self, owner_id: &str) -> Result<(), AppError> {
        self.kv.delete(&session_key(owner_id)).await?;
        info!(owner_id, "Admin logged out");
        Ok(())
    }

    async fn load_attempts(&self, owner_id: &str) -> Result<Option<LoginAttempt>, AppError> {
        let Some(raw) = self.kv.get(&attempts_key(owner_id)).await? else {
            return Ok(None);
        };
        Ok(serde_json::from_str(&raw).ok())
    }
}
