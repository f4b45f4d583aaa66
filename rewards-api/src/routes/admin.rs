use actix_web::{web, HttpResponse};
use common::utils::{
    ApproveDepositRequest, DepositListQuery, DepositStatus, WithdrawalStatusRequest,
};
use serde_json::json;
use tracing::info;

use crate::{auth::AdminUser, error::ApiError, AppState};

#[actix_web::post("/admin/deposits/approve")]
pub async fn approve_deposit(
    admin: AdminUser,
    req: web::Json<ApproveDepositRequest>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    info!(
        "Admin {} sets deposit {} to {}",
        admin.subject, req.deposit_id, req.status
    );
    let deposit = app_state
        .ledger
        .set_deposit_status(&req.deposit_id, req.status)
        .await?;
    if req.status == DepositStatus::COMPLETED {
        app_state.metrics.deposits_approved.inc();
    }
    Ok(HttpResponse::Ok().json(json!({ "success": true, "deposit": deposit })))
}

#[actix_web::get("/admin/deposits")]
pub async fn list_deposits(
    _admin: AdminUser,
    query: web::Query<DepositListQuery>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let deposits = app_state.ledger.list_deposits(query.status).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "deposits": deposits })))
}

#[actix_web::post("/admin/withdrawals/status")]
pub async fn set_withdrawal_status(
    admin: AdminUser,
    req: web::Json<WithdrawalStatusRequest>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    info!(
        "Admin {} sets withdrawal {} to {}",
        admin.subject, req.withdrawal_id, req.status
    );
    let withdrawal = app_state
        .ledger
        .set_withdrawal_status(&req.withdrawal_id, req.status)
        .await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "withdrawal": withdrawal })))
}
