use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::utils::{DepositStatus, ReferralStatus, WithdrawalStatus};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub balance: f64,
    pub referral_code: String,
    pub referred_by: Option<String>,
    #[serde(skip_serializing)]
    pub reset_code: Option<String>,
    #[serde(skip_serializing)]
    pub reset_code_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Deposit {
    pub id: String,
    pub user_id: String,
    pub coin: String,
    pub amount: f64,
    pub transaction_hash: String,
    pub payment_proof: Option<String>,
    pub status: DepositStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Deposit row joined with its owner, as shown in the approval queue.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DepositEntry {
    pub id: String,
    pub user_id: String,
    pub user_email: String,
    pub user_name: Option<String>,
    pub coin: String,
    pub amount: f64,
    pub transaction_hash: String,
    pub payment_proof: Option<String>,
    pub status: DepositStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Referral {
    pub id: String,
    pub referrer_id: String,
    pub referred_id: String,
    pub reward_amount: f64,
    pub plan_amount: f64,
    pub status: ReferralStatus,
    pub paid_out: bool,
    pub paid_out_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ReferralEntry {
    pub id: String,
    pub referred_id: String,
    pub referred_email: String,
    pub referred_name: Option<String>,
    pub reward_amount: f64,
    pub plan_amount: f64,
    pub status: ReferralStatus,
    pub paid_out: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DailyTaskRound {
    pub id: String,
    pub user_id: String,
    pub date_key: String,
    pub total_steps: i64,
    pub current_step: i64,
    pub completed_at: Option<DateTime<Utc>>,
    pub reward_amount: f64,
    pub paid_out: bool,
    pub paid_out_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DailyTaskRound {
    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some() || self.current_step >= self.total_steps
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Withdrawal {
    pub id: String,
    pub user_id: String,
    pub asset: String,
    pub address: String,
    pub amount: f64,
    /// Balance at the moment the withdrawal was requested, before the debit.
    pub balance: f64,
    pub status: WithdrawalStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
