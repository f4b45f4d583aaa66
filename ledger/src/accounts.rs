use chrono::{DateTime, Duration, Utc};
use common::{models::User, utils::RegisterRequest};
use rand::Rng;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    error::require,
    password::{hash_password, verify_password},
    Ledger, LedgerError, Result,
};

pub const RESET_CODE_TTL_SECS: i64 = 120;

/// A freshly issued password reset code. Delivering it is the caller's job.
#[derive(Debug, Clone)]
pub struct ResetCode {
    pub email: String,
    pub code: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Last 8 alphanumeric characters of the user id, uppercased.
pub fn referral_code_for(user_id: &str) -> String {
    let compact: Vec<char> = user_id.chars().filter(char::is_ascii_alphanumeric).collect();
    let start = compact.len().saturating_sub(8);
    compact[start..].iter().collect::<String>().to_uppercase()
}

fn generate_reset_code() -> String {
    rand::thread_rng().gen_range(1000..10000).to_string()
}

impl Ledger {
    pub async fn register_user(&self, req: &RegisterRequest) -> Result<User> {
        let email = req.email.trim();
        require("Email", email)?;
        require("Password", &req.password)?;

        let existing: Option<String> = sqlx::query_scalar("SELECT id FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        if existing.is_some() {
            return Err(LedgerError::EmailInUse);
        }

        let referred_by = match req.referral_code.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() => {
                let referrer = self.resolve_referral_code(code).await?;
                if referrer.is_none() {
                    info!("Ignoring unknown referral code {} for {}", code, email);
                }
                referrer
            }
            _ => None,
        };

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let password_hash = hash_password(&req.password)?;

        let mut tx = self.pool.begin().await?;
        let user: User = sqlx::query_as(
            "INSERT INTO users (id, email, name, password_hash, balance, referral_code, referred_by, created_at, updated_at)
             VALUES (?, ?, ?, ?, 0.0, ?, ?, ?, ?) RETURNING *",
        )
        .bind(&id)
        .bind(email)
        .bind(req.name.as_deref().map(str::trim).filter(|n| !n.is_empty()))
        .bind(&password_hash)
        .bind(referral_code_for(&id))
        .bind(&referred_by)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            let email_taken = matches!(&e, sqlx::Error::Database(db) if db.message().contains("users.email"));
            if email_taken {
                LedgerError::EmailInUse
            } else {
                LedgerError::Database(e)
            }
        })?;
        tx.commit().await?;

        info!(
            "Registered user {} ({}) referral_code={} referred_by={:?}",
            user.id, user.email, user.referral_code, user.referred_by
        );
        Ok(user)
    }

    pub async fn authenticate(&self, email: &str, password: &str) -> Result<User> {
        let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = ?")
            .bind(email.trim())
            .fetch_optional(&self.pool)
            .await?;

        match user {
            Some(user) if verify_password(password, &user.password_hash) => Ok(user),
            Some(_) => {
                warn!("Login failed: invalid password for {}", email);
                Err(LedgerError::InvalidCredentials)
            }
            None => {
                warn!("Login failed: no user with email {}", email);
                Err(LedgerError::InvalidCredentials)
            }
        }
    }

    pub async fn get_user(&self, user_id: &str) -> Result<User> {
        sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(LedgerError::UserNotFound)
    }

    pub async fn get_balance(&self, user_id: &str) -> Result<f64> {
        sqlx::query_scalar("SELECT balance FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(LedgerError::UserNotFound)
    }

    pub async fn issue_reset_code(&self, email: &str, now: DateTime<Utc>) -> Result<ResetCode> {
        let email = email.trim();
        let code = generate_reset_code();
        let expires_at = now + Duration::seconds(RESET_CODE_TTL_SECS);

        let result = sqlx::query(
            "UPDATE users SET reset_code = ?, reset_code_expires_at = ?, updated_at = ? WHERE email = ?",
        )
        .bind(&code)
        .bind(expires_at)
        .bind(now)
        .bind(email)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::UserNotFound);
        }

        info!("Issued password reset code for {}", email);
        Ok(ResetCode {
            email: email.to_string(),
            code,
            issued_at: now,
            expires_at,
        })
    }

    async fn reset_target(&self, email: &str, code: &str, now: DateTime<Utc>) -> Result<User> {
        let user: Option<User> =
            sqlx::query_as("SELECT * FROM users WHERE email = ? AND reset_code = ?")
                .bind(email.trim())
                .bind(code.trim())
                .fetch_optional(&self.pool)
                .await?;

        match user {
            Some(user) if user.reset_code_expires_at.is_some_and(|exp| exp >= now) => Ok(user),
            _ => Err(LedgerError::InvalidResetCode),
        }
    }

    pub async fn verify_reset_code(&self, email: &str, code: &str, now: DateTime<Utc>) -> Result<()> {
        self.reset_target(email, code, now).await.map(|_| ())
    }

    pub async fn reset_password(
        &self,
        email: &str,
        code: &str,
        new_password: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        require("New password", new_password)?;
        let user = self.reset_target(email, code, now).await?;

        if verify_password(new_password, &user.password_hash) {
            return Err(LedgerError::SamePassword);
        }

        let password_hash = hash_password(new_password)?;
        // consumes the code; a concurrent reset with the same code loses here
        let result = sqlx::query(
            "UPDATE users SET password_hash = ?, reset_code = NULL, reset_code_expires_at = NULL, updated_at = ?
             WHERE id = ? AND reset_code = ?",
        )
        .bind(&password_hash)
        .bind(now)
        .bind(&user.id)
        .bind(code.trim())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() != 1 {
            return Err(LedgerError::InvalidResetCode);
        }
        info!("Password reset for user {}", user.id);
        Ok(())
    }
}
