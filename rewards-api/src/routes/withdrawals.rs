use actix_web::{web, HttpResponse};
use common::utils::WithdrawRequest;
use serde_json::json;
use validator::Validate;

use crate::{auth::AuthenticatedUser, error::ApiError, AppState};

#[actix_web::post("/withdraw")]
pub async fn create(
    user: AuthenticatedUser,
    req: web::Json<WithdrawRequest>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    req.validate()?;
    let withdrawal = app_state.ledger.create_withdrawal(&user.user_id, &req).await?;

    app_state.metrics.withdrawals_created.inc();
    app_state.metrics.withdrawal_amount.observe(withdrawal.amount);

    Ok(HttpResponse::Created().json(json!({
        "success": true,
        "message": "Withdrawal request submitted",
        "withdrawal": withdrawal,
    })))
}

#[actix_web::get("/withdraw/history")]
pub async fn history(
    user: AuthenticatedUser,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let withdrawals = app_state.ledger.withdrawal_history(&user.user_id).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "withdrawals": withdrawals })))
}
