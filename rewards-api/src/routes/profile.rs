use actix_web::{web, HttpResponse};
use serde_json::json;
use tracing::error;

use crate::{auth::AuthenticatedUser, error::ApiError, AppState};

#[actix_web::get("/me")]
pub async fn me(
    user: AuthenticatedUser,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    app_state.ledger.self_heal(&user.user_id).await?;
    let user = app_state.ledger.get_user(&user.user_id).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "user": user })))
}

#[actix_web::get("/balance")]
pub async fn balance(
    user: AuthenticatedUser,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let balance = app_state.ledger.get_balance(&user.user_id).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "balance": balance })))
}

#[actix_web::get("/referrals/stats")]
pub async fn referral_stats(
    user: AuthenticatedUser,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let ledger = &app_state.ledger;
    if let Err(e) = ledger.self_heal(&user.user_id).await {
        error!("Self-heal failed for {}: {:?}", user.user_id, e);
    }

    let profile = ledger.get_user(&user.user_id).await?;
    let stats = ledger.referral_stats(&user.user_id).await?;
    let referrals = ledger.referral_history(&user.user_id).await?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "referral_code": profile.referral_code,
        "balance": profile.balance,
        "stats": stats,
        "referrals": referrals,
    })))
}
