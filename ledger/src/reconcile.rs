use chrono::Utc;
use common::utils::ReferralStatus;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{Ledger, LedgerError, Result};

/// Drift below this is floating-point noise, not a missed credit.
pub const BALANCE_EPSILON: f64 = 0.0001;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BalanceCheck {
    pub previous: f64,
    pub expected: f64,
    /// Amount added by this pass, 0 when nothing was missing.
    pub credited: f64,
}

impl Ledger {
    /// Tops the balance up to the sum of recorded credits minus withdrawals.
    ///
    /// Only ever increments: a balance ahead of the records is left alone.
    /// The top-up is a compare-and-set on the balance read in the same
    /// transaction, so a concurrent credit makes this pass skip instead of
    /// double counting.
    pub async fn self_heal(&self, user_id: &str) -> Result<BalanceCheck> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        // COMPLETED implies paid; rows that drifted from that get their flags back
        let repaired = sqlx::query(
            "UPDATE referrals SET paid_out = 1, paid_out_at = COALESCE(paid_out_at, ?), updated_at = ?
             WHERE referrer_id = ? AND status = ? AND paid_out = 0",
        )
        .bind(now)
        .bind(now)
        .bind(user_id)
        .bind(ReferralStatus::COMPLETED)
        .execute(&mut *tx)
        .await?;
        if repaired.rows_affected() > 0 {
            warn!(
                "Repaired paid_out flag on {} completed referral(s) for {}",
                repaired.rows_affected(),
                user_id
            );
        }

        let previous: f64 = sqlx::query_scalar("SELECT balance FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(LedgerError::UserNotFound)?;

        let referral_total: f64 = sqlx::query_scalar(
            "SELECT CAST(COALESCE(SUM(reward_amount), 0) AS REAL) FROM referrals
             WHERE referrer_id = ? AND status = ?",
        )
        .bind(user_id)
        .bind(ReferralStatus::COMPLETED)
        .fetch_one(&mut *tx)
        .await?;

        let task_total: f64 = sqlx::query_scalar(
            "SELECT CAST(COALESCE(SUM(reward_amount), 0) AS REAL) FROM daily_task_rounds
             WHERE user_id = ? AND paid_out = 1",
        )
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        let withdrawn: f64 = sqlx::query_scalar(
            "SELECT CAST(COALESCE(SUM(amount), 0) AS REAL) FROM withdrawals WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        let expected = referral_total + task_total - withdrawn;
        let mut check = BalanceCheck {
            previous,
            expected,
            credited: 0.0,
        };

        if expected > previous + BALANCE_EPSILON {
            let missing = expected - previous;
            let topped_up = sqlx::query(
                "UPDATE users SET balance = balance + ?, updated_at = ? WHERE id = ? AND balance = ?",
            )
            .bind(missing)
            .bind(now)
            .bind(user_id)
            .bind(previous)
            .execute(&mut *tx)
            .await?;

            if topped_up.rows_affected() == 1 {
                check.credited = missing;
                info!(
                    "Self-heal credited {} to user {} (balance {} -> expected {})",
                    missing, user_id, previous, expected
                );
            } else {
                warn!("Balance of {} changed during self-heal, skipping top-up", user_id);
            }
        } else {
            debug!("Balance of {} consistent ({} vs {})", user_id, previous, expected);
        }

        tx.commit().await?;
        Ok(check)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{balance, completed_deposit, ledger, register, set_balance};
    use crate::TOTAL_STEPS;

    #[tokio::test]
    async fn restores_missing_credits_once() {
        let ledger = ledger().await;
        let alice = register(&ledger, "alice@example.com", None).await;
        let bob = register(&ledger, "bob@example.com", Some(&alice.referral_code)).await;
        completed_deposit(&ledger, &bob.id, 75.0).await;
        assert_eq!(balance(&ledger, &alice.id).await, 7.0);

        set_balance(&ledger, &alice.id, 0.0).await;

        let first = ledger.self_heal(&alice.id).await.unwrap();
        assert_eq!(first.previous, 0.0);
        assert_eq!(first.expected, 7.0);
        assert_eq!(first.credited, 7.0);
        assert_eq!(balance(&ledger, &alice.id).await, 7.0);

        let second = ledger.self_heal(&alice.id).await.unwrap();
        assert_eq!(second.credited, 0.0);
        assert_eq!(balance(&ledger, &alice.id).await, 7.0);
    }

    #[tokio::test]
    async fn never_decrements_a_balance_ahead_of_records() {
        let ledger = ledger().await;
        let alice = register(&ledger, "alice@example.com", None).await;
        set_balance(&ledger, &alice.id, 42.0).await;

        let check = ledger.self_heal(&alice.id).await.unwrap();
        assert_eq!(check.expected, 0.0);
        assert_eq!(check.credited, 0.0);
        assert_eq!(balance(&ledger, &alice.id).await, 42.0);
    }

    #[tokio::test]
    async fn accounts_for_task_payouts_and_withdrawals() {
        let ledger = ledger().await;
        let user = register(&ledger, "alice@example.com", None).await;
        completed_deposit(&ledger, &user.id, 250.0).await;
        let now = Utc::now();
        for _ in 0..TOTAL_STEPS {
            ledger.advance_step(&user.id, now, 0).await.unwrap();
        }
        set_balance(&ledger, &user.id, 20.0).await;
        ledger
            .create_withdrawal(
                &user.id,
                &common::utils::WithdrawRequest {
                    asset: "USDT".into(),
                    address: "T9yD14Nj9j7xAB4dbGeiX9h8unkKHxuWwb".into(),
                    amount: 15.0,
                },
            )
            .await
            .unwrap();
        set_balance(&ledger, &user.id, 0.0).await;

        // 8 earned from the round, 15 withdrawn: nothing to restore
        let check = ledger.self_heal(&user.id).await.unwrap();
        assert_eq!(check.expected, -7.0);
        assert_eq!(balance(&ledger, &user.id).await, 0.0);
    }

    #[tokio::test]
    async fn ignores_sub_epsilon_drift() {
        let ledger = ledger().await;
        let alice = register(&ledger, "alice@example.com", None).await;
        let bob = register(&ledger, "bob@example.com", Some(&alice.referral_code)).await;
        completed_deposit(&ledger, &bob.id, 15.0).await;
        set_balance(&ledger, &alice.id, 3.0 - BALANCE_EPSILON / 2.0).await;

        let check = ledger.self_heal(&alice.id).await.unwrap();
        assert_eq!(check.credited, 0.0);
    }

    #[tokio::test]
    async fn repairs_paid_out_flag_on_completed_referrals() {
        let ledger = ledger().await;
        let alice = register(&ledger, "alice@example.com", None).await;
        let bob = register(&ledger, "bob@example.com", Some(&alice.referral_code)).await;
        completed_deposit(&ledger, &bob.id, 25.0).await;
        sqlx::query("UPDATE referrals SET paid_out = 0, paid_out_at = NULL")
            .execute(ledger.pool())
            .await
            .unwrap();

        ledger.self_heal(&alice.id).await.unwrap();
        let history = ledger.referral_history(&alice.id).await.unwrap();
        assert!(history[0].paid_out);
        assert_eq!(balance(&ledger, &alice.id).await, 4.0);
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let ledger = ledger().await;
        assert!(matches!(
            ledger.self_heal("ghost").await,
            Err(LedgerError::UserNotFound)
        ));
    }
}
