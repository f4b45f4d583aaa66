use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
pub enum DepositStatus {
    PENDING,
    COMPLETED,
    REJECTED,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
pub enum ReferralStatus {
    PENDING,
    COMPLETED,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
pub enum WithdrawalStatus {
    PENDING,
    COMPLETED,
    REJECTED,
}

impl_from_str_for_enum!(DepositStatus, PENDING, COMPLETED, REJECTED);
impl_display_for_enum!(DepositStatus, PENDING, COMPLETED, REJECTED);
impl_from_str_for_enum!(ReferralStatus, PENDING, COMPLETED);
impl_display_for_enum!(ReferralStatus, PENDING, COMPLETED);
impl_from_str_for_enum!(WithdrawalStatus, PENDING, COMPLETED, REJECTED);
impl_display_for_enum!(WithdrawalStatus, PENDING, COMPLETED, REJECTED);

impl DepositStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, DepositStatus::PENDING)
    }
}

impl WithdrawalStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, WithdrawalStatus::PENDING)
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "Email is invalid"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
    pub name: Option<String>,
    #[serde(default, alias = "ref")]
    pub referral_code: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Email is required"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ForgotPasswordRequest {
    #[validate(length(min = 1, message = "Email is required"))]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyResetCodeRequest {
    #[validate(length(min = 1, message = "Email is required"))]
    pub email: String,
    #[validate(length(equal = 4, message = "Code must be 4 digits"))]
    pub code: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    #[validate(length(min = 1, message = "Email is required"))]
    pub email: String,
    #[validate(length(equal = 4, message = "Code must be 4 digits"))]
    pub code: String,
    #[validate(length(min = 1, message = "New password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct DepositRequest {
    #[validate(length(min = 1, message = "Coin is required"))]
    pub coin: String,
    #[validate(range(exclusive_min = 0.0, message = "Invalid amount"))]
    pub amount: f64,
    #[validate(length(min = 1, message = "Transaction hash is required"))]
    pub transaction_hash: String,
    /// Opaque reference to the uploaded proof (URL or data URI).
    pub payment_proof: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApproveDepositRequest {
    pub deposit_id: String,
    pub status: DepositStatus,
}

#[derive(Debug, Deserialize, Validate)]
pub struct WithdrawRequest {
    #[validate(length(min = 1, message = "Asset is required"))]
    pub asset: String,
    #[validate(length(min = 1, message = "Address is required"))]
    pub address: String,
    #[validate(range(exclusive_min = 0.0, message = "Invalid amount"))]
    pub amount: f64,
}

#[derive(Debug, Deserialize)]
pub struct WithdrawalStatusRequest {
    pub withdrawal_id: String,
    pub status: WithdrawalStatus,
}

#[derive(Debug, Deserialize)]
pub struct DepositListQuery {
    pub status: Option<DepositStatus>,
}
