use actix_web::{web, HttpResponse};
use chrono::Utc;
use common::utils::{
    ForgotPasswordRequest, LoginRequest, RegisterRequest, ResetPasswordRequest,
    VerifyResetCodeRequest,
};
use serde_json::json;
use tracing::{info, warn};
use validator::Validate;

use crate::{
    auth::{create_token, Role, TokenResponse},
    error::ApiError,
    AppState,
};

fn token_response(state: &AppState, subject: &str, role: Role) -> Result<TokenResponse, ApiError> {
    Ok(TokenResponse {
        success: true,
        token: create_token(subject, role, &state.jwt_secret, state.jwt_expiration)?,
        expires_in: state.jwt_expiration,
    })
}

#[actix_web::post("/auth/register")]
pub async fn register(
    req: web::Json<RegisterRequest>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    req.validate()?;
    let user = app_state.ledger.register_user(&req).await?;
    let token = token_response(&app_state, &user.id, Role::USER)?;

    Ok(HttpResponse::Created().json(json!({
        "success": true,
        "token": token.token,
        "expires_in": token.expires_in,
        "user": user,
    })))
}

#[actix_web::post("/auth/login")]
pub async fn login(
    req: web::Json<LoginRequest>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    req.validate()?;
    let user = app_state.ledger.authenticate(&req.email, &req.password).await?;
    info!("User {} logged in", user.id);
    Ok(HttpResponse::Ok().json(token_response(&app_state, &user.id, Role::USER)?))
}

#[actix_web::post("/auth/admin-login")]
pub async fn admin_login(
    req: web::Json<LoginRequest>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    req.validate()?;
    let Some(admin) = &app_state.admin else {
        warn!("Admin login attempted but no admin credentials are configured");
        return Err(ApiError::Unauthorized("Invalid email or password".to_string()));
    };
    if req.email.trim() != admin.email || req.password != admin.password {
        warn!("Admin login failed for {}", req.email);
        return Err(ApiError::Unauthorized("Invalid email or password".to_string()));
    }
    info!("Admin {} logged in", admin.email);
    Ok(HttpResponse::Ok().json(token_response(&app_state, &admin.email, Role::ADMIN)?))
}

#[actix_web::post("/auth/forgot-password")]
pub async fn forgot_password(
    req: web::Json<ForgotPasswordRequest>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    req.validate()?;
    let reset = app_state.ledger.issue_reset_code(&req.email, Utc::now()).await?;

    // delivery failures never block issuing the code
    if let Err(e) = app_state
        .mailer
        .send_reset_code(&reset.email, &reset.code, reset.expires_at)
        .await
    {
        warn!("Failed to deliver reset code to {}: {:?}", reset.email, e);
    }

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Reset code sent",
        "expires_at": reset.expires_at,
    })))
}

#[actix_web::put("/auth/reset-password")]
pub async fn verify_reset_code(
    req: web::Json<VerifyResetCodeRequest>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    req.validate()?;
    app_state
        .ledger
        .verify_reset_code(&req.email, &req.code, Utc::now())
        .await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "message": "Code verified" })))
}

#[actix_web::post("/auth/reset-password")]
pub async fn reset_password(
    req: web::Json<ResetPasswordRequest>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    req.validate()?;
    app_state
        .ledger
        .reset_password(&req.email, &req.code, &req.password, Utc::now())
        .await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "message": "Password updated" })))
}
