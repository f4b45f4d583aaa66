use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use ledger::parse_tz_offset;
use serde_json::json;

use crate::{auth::AuthenticatedUser, error::ApiError, security::TZ_OFFSET_HEADER, AppState};

fn tz_offset(req: &HttpRequest) -> i32 {
    parse_tz_offset(
        req.headers()
            .get(TZ_OFFSET_HEADER)
            .and_then(|v| v.to_str().ok()),
    )
}

#[actix_web::get("/tasks/status")]
pub async fn status(
    user: AuthenticatedUser,
    req: HttpRequest,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let status = app_state
        .ledger
        .task_status(&user.user_id, Utc::now(), tz_offset(&req))
        .await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "status": status })))
}

#[actix_web::post("/tasks/step")]
pub async fn step(
    user: AuthenticatedUser,
    req: HttpRequest,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let outcome = app_state
        .ledger
        .advance_step(&user.user_id, Utc::now(), tz_offset(&req))
        .await?;
    if outcome.paid {
        app_state.metrics.task_payouts.inc();
    }
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "date_key": outcome.date_key,
        "paid": outcome.paid,
        "round": outcome.round,
    })))
}
