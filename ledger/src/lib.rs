//! Balance settlement for the rewards service.
//!
//! A user's `balance` is credited by approved referral rewards and paid task
//! rounds, and debited by withdrawals. Every credit is gated on a conditional
//! update that can succeed once per logical event, so retries and concurrent
//! requests never pay twice. All writes go through the storage transaction; no
//! in-process locks are held.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::info;

mod accounts;
mod deposits;
mod error;
mod password;
mod reconcile;
mod referrals;
mod rewards;
mod tasks;
mod withdrawals;

pub use accounts::{referral_code_for, ResetCode, RESET_CODE_TTL_SECS};
pub use error::{LedgerError, Result};
pub use password::{hash_password, verify_password};
pub use reconcile::{BalanceCheck, BALANCE_EPSILON};
pub use referrals::ReferralStats;
pub use rewards::{PlanReward, RewardRules};
pub use tasks::{
    date_key, next_local_midnight, parse_tz_offset, StepOutcome, TaskStatus, TOTAL_STEPS,
};

pub const MIN_WITHDRAW_AMOUNT: f64 = 10.0;

#[derive(Clone)]
pub struct Ledger {
    pool: SqlitePool,
    rules: Arc<RewardRules>,
    min_withdrawal: f64,
}

impl Ledger {
    pub fn new(pool: SqlitePool, rules: RewardRules) -> Self {
        Ledger {
            pool,
            rules: Arc::new(rules),
            min_withdrawal: MIN_WITHDRAW_AMOUNT,
        }
    }

    pub fn with_min_withdrawal(mut self, amount: f64) -> Self {
        self.min_withdrawal = amount;
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn rules(&self) -> &RewardRules {
        &self.rules
    }

    pub fn min_withdrawal(&self) -> f64 {
        self.min_withdrawal
    }
}

/// Increment-only credit; the caller's transaction decides whether it sticks.
pub(crate) async fn credit_balance(
    conn: &mut SqliteConnection,
    user_id: &str,
    amount: f64,
    now: DateTime<Utc>,
) -> Result<()> {
    let result = sqlx::query("UPDATE users SET balance = balance + ?, updated_at = ? WHERE id = ?")
        .bind(amount)
        .bind(now)
        .bind(user_id)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() != 1 {
        return Err(LedgerError::UserNotFound);
    }
    info!("Credited {} to user {}", amount, user_id);
    Ok(())
}
