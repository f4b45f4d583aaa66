use chrono::Utc;
use common::{
    models::Withdrawal,
    utils::{WithdrawRequest, WithdrawalStatus},
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    error::{ensure_positive, require},
    Ledger, LedgerError, Result,
};

impl Ledger {
    /// Debits the balance and records a PENDING withdrawal in one transaction.
    /// The debit is final; the withdrawal status only tracks payment.
    pub async fn create_withdrawal(&self, user_id: &str, req: &WithdrawRequest) -> Result<Withdrawal> {
        require("Asset", &req.asset)?;
        require("Address", &req.address)?;
        ensure_positive(req.amount)?;
        if req.amount < self.min_withdrawal {
            return Err(LedgerError::BelowMinimumWithdrawal(self.min_withdrawal));
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        // take the write lock before reading the balance
        let touched = sqlx::query("UPDATE users SET updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        if touched.rows_affected() != 1 {
            return Err(LedgerError::UserNotFound);
        }

        let balance: f64 = sqlx::query_scalar("SELECT balance FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;
        if balance < self.min_withdrawal {
            warn!(
                "Withdrawal of {} rejected for {}: balance {} below minimum",
                req.amount, user_id, balance
            );
            return Err(LedgerError::MinimumBalanceRequired(self.min_withdrawal));
        }
        if balance < req.amount {
            warn!(
                "Withdrawal of {} rejected for {}: balance {}",
                req.amount, user_id, balance
            );
            return Err(LedgerError::InsufficientBalance);
        }

        let debited = sqlx::query(
            "UPDATE users SET balance = balance - ?, updated_at = ? WHERE id = ? AND balance >= ?",
        )
        .bind(req.amount)
        .bind(now)
        .bind(user_id)
        .bind(req.amount)
        .execute(&mut *tx)
        .await?;
        if debited.rows_affected() != 1 {
            return Err(LedgerError::InsufficientBalance);
        }

        let withdrawal: Withdrawal = sqlx::query_as(
            "INSERT INTO withdrawals (id, user_id, asset, address, amount, balance, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING *",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(req.asset.trim())
        .bind(req.address.trim())
        .bind(req.amount)
        .bind(balance)
        .bind(WithdrawalStatus::PENDING)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        info!(
            "Withdrawal {} debited {} from user {} (balance was {})",
            withdrawal.id, withdrawal.amount, user_id, balance
        );
        Ok(withdrawal)
    }

    pub async fn withdrawal_history(&self, user_id: &str) -> Result<Vec<Withdrawal>> {
        let withdrawals = sqlx::query_as(
            "SELECT * FROM withdrawals WHERE user_id = ? ORDER BY created_at DESC, rowid DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(withdrawals)
    }

    /// Payment tracking only: never touches the balance.
    pub async fn set_withdrawal_status(
        &self,
        withdrawal_id: &str,
        status: WithdrawalStatus,
    ) -> Result<Withdrawal> {
        if !status.is_terminal() {
            let current = self.find_withdrawal(withdrawal_id).await?;
            return Err(LedgerError::InvalidTransition {
                kind: "withdrawal",
                from: current.status.to_string(),
                to: status.to_string(),
            });
        }

        let mut tx = self.pool.begin().await?;
        let updated: Option<Withdrawal> = sqlx::query_as(
            "UPDATE withdrawals SET status = ?, updated_at = ? WHERE id = ? AND status = ? RETURNING *",
        )
        .bind(status)
        .bind(Utc::now())
        .bind(withdrawal_id)
        .bind(WithdrawalStatus::PENDING)
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;

        if let Some(withdrawal) = updated {
            info!("Withdrawal {} moved to {}", withdrawal.id, withdrawal.status);
            return Ok(withdrawal);
        }

        let current = self.find_withdrawal(withdrawal_id).await?;
        if current.status != status {
            return Err(LedgerError::InvalidTransition {
                kind: "withdrawal",
                from: current.status.to_string(),
                to: status.to_string(),
            });
        }
        Ok(current)
    }

    async fn find_withdrawal(&self, withdrawal_id: &str) -> Result<Withdrawal> {
        sqlx::query_as("SELECT * FROM withdrawals WHERE id = ?")
            .bind(withdrawal_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(LedgerError::WithdrawalNotFound)
    }
}
