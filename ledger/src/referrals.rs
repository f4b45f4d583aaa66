use chrono::Utc;
use common::{
    models::{Referral, ReferralEntry},
    utils::ReferralStatus,
};
use serde::Serialize;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::{credit_balance, Ledger, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReferralStats {
    pub total_referrals: i64,
    /// Sum of rewards already credited (COMPLETED rows only).
    pub total_earnings: f64,
    pub active_referrals: i64,
    pub pending_referrals: i64,
}

impl Ledger {
    /// Maps a referral code to the owning user's id. Codes match exactly after
    /// uppercasing; unknown codes resolve to `None`.
    pub async fn resolve_referral_code(&self, code: &str) -> Result<Option<String>> {
        let referrer = sqlx::query_scalar("SELECT id FROM users WHERE referral_code = ?")
            .bind(code.trim().to_uppercase())
            .fetch_optional(&self.pool)
            .await?;
        Ok(referrer)
    }

    /// Records the PENDING reward owed to `referred_id`'s referrer for a
    /// deposit of `deposit_amount`. Returns `None` when the user has no
    /// referrer or the amount is not a plan price. A second call for the same
    /// referred user returns the row created by the first.
    pub async fn create_pending_reward(
        &self,
        referred_id: &str,
        deposit_amount: f64,
    ) -> Result<Option<Referral>> {
        let referrer: Option<Option<String>> =
            sqlx::query_scalar("SELECT referred_by FROM users WHERE id = ?")
                .bind(referred_id)
                .fetch_optional(&self.pool)
                .await?;
        let Some(referrer_id) = referrer.flatten() else {
            debug!("No referrer for user {}", referred_id);
            return Ok(None);
        };

        let Some(reward_amount) = self.rules.referral_profit_for(deposit_amount) else {
            debug!("No plan matches deposit amount {}", deposit_amount);
            return Ok(None);
        };

        let now = Utc::now();
        let inserted = sqlx::query(
            "INSERT INTO referrals (id, referrer_id, referred_id, reward_amount, plan_amount, status, paid_out, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?)
             ON CONFLICT (referred_id) DO NOTHING",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&referrer_id)
        .bind(referred_id)
        .bind(reward_amount)
        .bind(deposit_amount)
        .bind(ReferralStatus::PENDING)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let referral: Referral = sqlx::query_as("SELECT * FROM referrals WHERE referred_id = ?")
            .bind(referred_id)
            .fetch_one(&self.pool)
            .await?;

        if inserted.rows_affected() == 1 {
            info!(
                "Created pending referral reward {} of {} for referrer {}",
                referral.id, referral.reward_amount, referral.referrer_id
            );
        } else {
            debug!(
                "Referral reward for {} already exists with status {}",
                referred_id, referral.status
            );
        }
        Ok(Some(referral))
    }

    /// Moves a PENDING referral to COMPLETED and credits the referrer, once.
    ///
    /// The status flip is a compare-and-set on `status = 'PENDING'`; only the
    /// request that wins it credits the balance, inside the same transaction.
    /// Every other caller (retry, concurrent approval) gets the current row
    /// back untouched. Returns `None` for an unknown id.
    pub async fn approve_referral(&self, referral_id: &str) -> Result<Option<Referral>> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let completed: Option<Referral> = sqlx::query_as(
            "UPDATE referrals SET status = ?, paid_out = 1, paid_out_at = ?, updated_at = ?
             WHERE id = ? AND status = ? RETURNING *",
        )
        .bind(ReferralStatus::COMPLETED)
        .bind(now)
        .bind(now)
        .bind(referral_id)
        .bind(ReferralStatus::PENDING)
        .fetch_optional(&mut *tx)
        .await?;

        let referral = match completed {
            Some(referral) => {
                credit_balance(&mut tx, &referral.referrer_id, referral.reward_amount, now).await?;
                info!(
                    "Referral {} approved, referrer {} credited {}",
                    referral.id, referral.referrer_id, referral.reward_amount
                );
                Some(referral)
            }
            None => {
                debug!("Referral {} not pending, nothing to credit", referral_id);
                sqlx::query_as("SELECT * FROM referrals WHERE id = ?")
                    .bind(referral_id)
                    .fetch_optional(&mut *tx)
                    .await?
            }
        };

        tx.commit().await?;
        Ok(referral)
    }

    /// Approves every PENDING reward owed for `referred_id`. Failures are
    /// logged and left for a later retry or the self-heal pass.
    pub async fn approve_referrals_for(&self, referred_id: &str) -> usize {
        let pending: Vec<String> = match sqlx::query_scalar(
            "SELECT id FROM referrals WHERE referred_id = ? AND status = ?",
        )
        .bind(referred_id)
        .bind(ReferralStatus::PENDING)
        .fetch_all(&self.pool)
        .await
        {
            Ok(ids) => ids,
            Err(e) => {
                error!("Failed to load pending referrals for {}: {:?}", referred_id, e);
                return 0;
            }
        };

        let mut approved = 0;
        for referral_id in pending {
            match self.approve_referral(&referral_id).await {
                Ok(Some(referral)) if referral.status == ReferralStatus::COMPLETED => approved += 1,
                Ok(_) => {}
                Err(e) => error!("Failed to approve referral {}: {:?}", referral_id, e),
            }
        }
        approved
    }

    pub async fn referral_stats(&self, user_id: &str) -> Result<ReferralStats> {
        let rows: Vec<(ReferralStatus, i64, f64)> = sqlx::query_as(
            "SELECT status, COUNT(*), CAST(COALESCE(SUM(reward_amount), 0) AS REAL)
             FROM referrals WHERE referrer_id = ? GROUP BY status",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut stats = ReferralStats::default();
        for (status, count, sum) in rows {
            stats.total_referrals += count;
            match status {
                ReferralStatus::COMPLETED => {
                    stats.active_referrals = count;
                    stats.total_earnings = sum;
                }
                ReferralStatus::PENDING => stats.pending_referrals = count,
            }
        }
        Ok(stats)
    }

    pub async fn referral_history(&self, user_id: &str) -> Result<Vec<ReferralEntry>> {
        let entries = sqlx::query_as(
            "SELECT r.id, r.referred_id, u.email AS referred_email, u.name AS referred_name,
                    r.reward_amount, r.plan_amount, r.status, r.paid_out, r.created_at
             FROM referrals r JOIN users u ON u.id = r.referred_id
             WHERE r.referrer_id = ?
             ORDER BY r.created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }
}
