use actix_web::{web, HttpResponse};
use common::utils::DepositRequest;
use serde_json::json;
use tracing::info;
use validator::Validate;

use crate::{auth::AuthenticatedUser, error::ApiError, AppState};

#[actix_web::post("/deposit")]
pub async fn submit(
    user: AuthenticatedUser,
    req: web::Json<DepositRequest>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    req.validate()?;
    info!("Deposit request from {}: {:?}", user.user_id, req);

    let deposit = app_state.ledger.submit_deposit(&user.user_id, &req).await?;
    app_state.metrics.deposits_submitted.inc();

    Ok(HttpResponse::Created().json(json!({
        "success": true,
        "message": "Deposit submitted for review",
        "deposit": deposit,
    })))
}

#[actix_web::get("/deposit/history")]
pub async fn history(
    user: AuthenticatedUser,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let deposits = app_state.ledger.deposit_history(&user.user_id).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "deposits": deposits })))
}

#[cfg(test)]
mod tests {
    use crate::routes::test_support::*;
    use actix_web::{http::StatusCode, test};
    use serde_json::json;

    #[actix_web::test]
    async fn deposit_is_pending_until_approved() {
        let app = test_app!(state().await);

        let req = test::TestRequest::post()
            .uri("/auth/register")
            .set_json(json!({ "email": "alice@example.com", "password": "pw" }))
            .to_request();
        let alice = json_body(test::call_service(&app, req).await, StatusCode::CREATED).await;
        let token = alice["token"].as_str().unwrap().to_string();

        let req = test::TestRequest::post()
            .uri("/deposit")
            .insert_header(bearer(&token))
            .set_json(json!({
                "coin": "USDT",
                "amount": 25.0,
                "transaction_hash": "0xfeed",
                "payment_proof": "https://cdn.example.com/p.png"
            }))
            .to_request();
        let body = json_body(test::call_service(&app, req).await, StatusCode::CREATED).await;
        assert_eq!(body["deposit"]["status"], "PENDING");

        let req = test::TestRequest::post()
            .uri("/deposit")
            .insert_header(bearer(&token))
            .set_json(json!({ "coin": "USDT", "amount": -1.0, "transaction_hash": "0xfeed" }))
            .to_request();
        let body = json_body(test::call_service(&app, req).await, StatusCode::BAD_REQUEST).await;
        assert_eq!(body["error"], "Invalid amount");

        let req = test::TestRequest::get()
            .uri("/deposit/history")
            .insert_header(bearer(&token))
            .to_request();
        let body = json_body(test::call_service(&app, req).await, StatusCode::OK).await;
        assert_eq!(body["deposits"].as_array().map(Vec::len), Some(1));
    }
}
