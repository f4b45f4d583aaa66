use chrono::Utc;
use common::{
    models::{Deposit, DepositEntry},
    utils::{DepositRequest, DepositStatus},
};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    error::{ensure_positive, require},
    Ledger, LedgerError, Result,
};

impl Ledger {
    /// Records a PENDING deposit and, for referred users, the pending
    /// referral reward it would earn. Nothing is credited here.
    pub async fn submit_deposit(&self, user_id: &str, req: &DepositRequest) -> Result<Deposit> {
        require("Coin", &req.coin)?;
        require("Transaction hash", &req.transaction_hash)?;
        ensure_positive(req.amount)?;

        let exists: Option<String> = sqlx::query_scalar("SELECT id FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        if exists.is_none() {
            return Err(LedgerError::UserNotFound);
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let deposit: Deposit = sqlx::query_as(
            "INSERT INTO deposits (id, user_id, coin, amount, transaction_hash, payment_proof, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING *",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(req.coin.trim())
        .bind(req.amount)
        .bind(req.transaction_hash.trim())
        .bind(req.payment_proof.as_deref())
        .bind(DepositStatus::PENDING)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        info!(
            "Deposit {} of {} {} submitted by {}",
            deposit.id, deposit.amount, deposit.coin, user_id
        );

        if let Err(e) = self.create_pending_reward(user_id, deposit.amount).await {
            error!(
                "Failed to create referral reward for deposit {}: {:?}",
                deposit.id, e
            );
        }

        Ok(deposit)
    }

    /// Admin transition of a deposit. PENDING may move to COMPLETED or
    /// REJECTED; both are terminal. Repeating the current status is accepted,
    /// and for COMPLETED re-runs the referral approval so a failed credit can
    /// be retried.
    pub async fn set_deposit_status(&self, deposit_id: &str, status: DepositStatus) -> Result<Deposit> {
        if !status.is_terminal() {
            let current = self.find_deposit(deposit_id).await?;
            return Err(LedgerError::InvalidTransition {
                kind: "deposit",
                from: current.status.to_string(),
                to: status.to_string(),
            });
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let updated: Option<Deposit> = sqlx::query_as(
            "UPDATE deposits SET status = ?, updated_at = ? WHERE id = ? AND status = ? RETURNING *",
        )
        .bind(status)
        .bind(now)
        .bind(deposit_id)
        .bind(DepositStatus::PENDING)
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;

        let deposit = match updated {
            Some(deposit) => {
                info!("Deposit {} moved to {}", deposit.id, deposit.status);
                deposit
            }
            None => {
                let current = self.find_deposit(deposit_id).await?;
                if current.status != status {
                    warn!(
                        "Rejected deposit {} transition {} -> {}",
                        deposit_id, current.status, status
                    );
                    return Err(LedgerError::InvalidTransition {
                        kind: "deposit",
                        from: current.status.to_string(),
                        to: status.to_string(),
                    });
                }
                current
            }
        };

        if deposit.status == DepositStatus::COMPLETED {
            let approved = self.approve_referrals_for(&deposit.user_id).await;
            if approved > 0 {
                info!(
                    "Deposit {} approval completed {} referral reward(s)",
                    deposit.id, approved
                );
            }
        }

        Ok(deposit)
    }

    async fn find_deposit(&self, deposit_id: &str) -> Result<Deposit> {
        sqlx::query_as("SELECT * FROM deposits WHERE id = ?")
            .bind(deposit_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(LedgerError::DepositNotFound)
    }

    pub async fn deposit_history(&self, user_id: &str) -> Result<Vec<Deposit>> {
        let deposits = sqlx::query_as(
            "SELECT * FROM deposits WHERE user_id = ? ORDER BY created_at DESC, rowid DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(deposits)
    }

    /// Approval queue for admins, optionally filtered by status.
    pub async fn list_deposits(&self, status: Option<DepositStatus>) -> Result<Vec<DepositEntry>> {
        let entries = sqlx::query_as(
            "SELECT d.id, d.user_id, u.email AS user_email, u.name AS user_name, d.coin, d.amount,
                    d.transaction_hash, d.payment_proof, d.status, d.created_at
             FROM deposits d JOIN users u ON u.id = d.user_id
             WHERE ? IS NULL OR d.status = ?
             ORDER BY d.created_at DESC, d.rowid DESC",
        )
        .bind(status)
        .bind(status)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{balance, file_ledger, ledger, register};
    use common::utils::ReferralStatus;

    fn deposit(amount: f64) -> DepositRequest {
        DepositRequest {
            coin: "USDT".into(),
            amount,
            transaction_hash: format!("0x{}", Uuid::new_v4().simple()),
            payment_proof: Some("https://cdn.example.com/proof.png".into()),
        }
    }

    #[tokio::test]
    async fn approving_referred_deposit_credits_referrer_once() {
        let ledger = ledger().await;
        let alice = register(&ledger, "alice@example.com", None).await;
        let bob = register(&ledger, "bob@example.com", Some(&alice.referral_code)).await;

        let submitted = ledger.submit_deposit(&bob.id, &deposit(35.0)).await.unwrap();
        assert_eq!(submitted.status, DepositStatus::PENDING);

        let stats = ledger.referral_stats(&alice.id).await.unwrap();
        assert_eq!(stats.pending_referrals, 1);
        assert_eq!(balance(&ledger, &alice.id).await, 0.0);

        let approved = ledger
            .set_deposit_status(&submitted.id, DepositStatus::COMPLETED)
            .await
            .unwrap();
        assert_eq!(approved.status, DepositStatus::COMPLETED);
        assert_eq!(balance(&ledger, &alice.id).await, 5.0);

        // admin retries the same action
        ledger
            .set_deposit_status(&submitted.id, DepositStatus::COMPLETED)
            .await
            .unwrap();
        assert_eq!(balance(&ledger, &alice.id).await, 5.0);

        let history = ledger.referral_history(&alice.id).await.unwrap();
        assert_eq!(history[0].status, ReferralStatus::COMPLETED);
        assert!(history[0].paid_out);
        // the depositor earns nothing from their own approval
        assert_eq!(balance(&ledger, &bob.id).await, 0.0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn fresh_writes_are_visible_across_connections() {
        let (_dir, ledger) = file_ledger().await;
        let now = Utc::now();

        for round in 0..10 {
            let alice = register(&ledger, &format!("alice{}@example.com", round), None).await;
            let bob = register(
                &ledger,
                &format!("bob{}@example.com", round),
                Some(&alice.referral_code),
            )
            .await;

            let mut set = tokio::task::JoinSet::new();
            for _ in 0..4 {
                let ledger = ledger.clone();
                let id = bob.id.clone();
                set.spawn(async move { ledger.get_user(&id).await });
            }
            while let Some(res) = set.join_next().await {
                assert_eq!(res.unwrap().unwrap().referred_by, Some(alice.id.clone()));
            }

            let submitted = ledger.submit_deposit(&bob.id, &deposit(35.0)).await.unwrap();
            assert_eq!(ledger.referral_stats(&alice.id).await.unwrap().pending_referrals, 1);

            ledger
                .set_deposit_status(&submitted.id, DepositStatus::COMPLETED)
                .await
                .unwrap();
            assert_eq!(balance(&ledger, &alice.id).await, 5.0);
            // the approved deposit unlocks tasks on whichever connection serves the step
            let step = ledger.advance_step(&bob.id, now, 0).await.unwrap();
            assert_eq!(step.round.current_step, 1);
        }
    }

    #[tokio::test]
    async fn rejected_deposit_is_terminal_and_pays_nothing() {
        let ledger = ledger().await;
        let alice = register(&ledger, "alice@example.com", None).await;
        let bob = register(&ledger, "bob@example.com", Some(&alice.referral_code)).await;
        let submitted = ledger.submit_deposit(&bob.id, &deposit(50.0)).await.unwrap();

        ledger
            .set_deposit_status(&submitted.id, DepositStatus::REJECTED)
            .await
            .unwrap();
        let err = ledger
            .set_deposit_status(&submitted.id, DepositStatus::COMPLETED)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTransition { .. }));
        assert_eq!(balance(&ledger, &alice.id).await, 0.0);

        let err = ledger
            .set_deposit_status(&submitted.id, DepositStatus::PENDING)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn unknown_deposit_is_not_found() {
        let ledger = ledger().await;
        assert!(matches!(
            ledger.set_deposit_status("missing", DepositStatus::COMPLETED).await,
            Err(LedgerError::DepositNotFound)
        ));
    }

    #[tokio::test]
    async fn pending_is_not_an_admin_target() {
        let ledger = ledger().await;
        let user = register(&ledger, "alice@example.com", None).await;
        let submitted = ledger.submit_deposit(&user.id, &deposit(20.0)).await.unwrap();

        let err = ledger
            .set_deposit_status(&submitted.id, DepositStatus::PENDING)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTransition { .. }));
        assert!(matches!(
            ledger.set_deposit_status("missing", DepositStatus::PENDING).await,
            Err(LedgerError::DepositNotFound)
        ));

        let history = ledger.deposit_history(&user.id).await.unwrap();
        assert_eq!(history[0].status, DepositStatus::PENDING);
    }

    #[tokio::test]
    async fn invalid_submissions_write_nothing() {
        let ledger = ledger().await;
        let user = register(&ledger, "alice@example.com", None).await;

        assert!(matches!(
            ledger.submit_deposit(&user.id, &deposit(0.0)).await,
            Err(LedgerError::InvalidAmount)
        ));
        assert!(matches!(
            ledger.submit_deposit(&user.id, &deposit(f64::NAN)).await,
            Err(LedgerError::InvalidAmount)
        ));
        let mut missing_hash = deposit(15.0);
        missing_hash.transaction_hash = " ".into();
        assert!(matches!(
            ledger.submit_deposit(&user.id, &missing_hash).await,
            Err(LedgerError::MissingField(_))
        ));
        assert!(matches!(
            ledger.submit_deposit("ghost", &deposit(15.0)).await,
            Err(LedgerError::UserNotFound)
        ));
        assert!(ledger.deposit_history(&user.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_deposits_filters_by_status() {
        let ledger = ledger().await;
        let user = register(&ledger, "alice@example.com", None).await;
        let first = ledger.submit_deposit(&user.id, &deposit(15.0)).await.unwrap();
        ledger.submit_deposit(&user.id, &deposit(25.0)).await.unwrap();
        ledger
            .set_deposit_status(&first.id, DepositStatus::COMPLETED)
            .await
            .unwrap();

        assert_eq!(ledger.list_deposits(None).await.unwrap().len(), 2);
        let pending = ledger
            .list_deposits(Some(DepositStatus::PENDING))
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].amount, 25.0);
        assert_eq!(pending[0].user_email, "alice@example.com");

        let history = ledger.deposit_history(&user.id).await.unwrap();
        assert_eq!(history[0].amount, 25.0);
        assert_eq!(history[1].status, DepositStatus::COMPLETED);
    }
}
