use actix_web::{web, HttpResponse, Responder};
use tracing::info;

use crate::{error::ApiError, metrics::metrics_endpoint};

mod admin;
mod auth;
mod deposits;
mod profile;
mod tasks;
mod withdrawals;

#[actix_web::get("/health")]
async fn health_check() -> impl Responder {
    info!("Health check request arrived");
    HttpResponse::Ok().content_type("text/plain").body("OK")
}

/// Malformed JSON bodies answer with the same error shape as everything else.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .error_handler(|err, _| ApiError::Validation(format!("Invalid request body: {}", err)).into())
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health_check)
        .service(metrics_endpoint)
        .service(auth::register)
        .service(auth::login)
        .service(auth::admin_login)
        .service(auth::forgot_password)
        .service(auth::verify_reset_code)
        .service(auth::reset_password)
        .service(profile::me)
        .service(profile::balance)
        .service(profile::referral_stats)
        .service(deposits::submit)
        .service(deposits::history)
        .service(tasks::status)
        .service(tasks::step)
        .service(withdrawals::create)
        .service(withdrawals::history)
        .service(admin::approve_deposit)
        .service(admin::list_deposits)
        .service(admin::set_withdrawal_status);
}

#[cfg(test)]
pub(crate) mod test_support {
    use actix_web::{body::MessageBody, dev::ServiceResponse, http::StatusCode, test, web};
    use common::{db::establish_in_memory, notify::Mailer};
    use ledger::{Ledger, RewardRules};
    use prometheus_client::registry::Registry;
    use serde_json::Value;

    use crate::{
        auth::{create_token, Role},
        config::AdminCredentials,
        metrics::Metrics,
        AppState,
    };

    pub const SECRET: &str = "test-secret";
    pub const ADMIN_EMAIL: &str = "admin@example.com";
    pub const ADMIN_PASSWORD: &str = "admin-pw";

    pub async fn state() -> web::Data<AppState> {
        let pool = establish_in_memory()
            .await
            .expect("in-memory database should open");
        let mut registry = Registry::default();
        let metrics = Metrics::new(&mut registry);
        web::Data::new(AppState {
            ledger: Ledger::new(pool, RewardRules::default()),
            mailer: Mailer::new(None),
            metrics,
            registry,
            jwt_secret: SECRET.to_string(),
            jwt_expiration: 3600,
            admin: Some(AdminCredentials {
                email: ADMIN_EMAIL.to_string(),
                password: ADMIN_PASSWORD.to_string(),
            }),
        })
    }

    macro_rules! test_app {
        ($state:expr) => {
            actix_web::test::init_service(
                actix_web::App::new()
                    .app_data($state)
                    .app_data($crate::routes::json_config())
                    .wrap($crate::auth::AuthenticationMiddleware::new(
                        $crate::routes::test_support::SECRET.to_string(),
                    ))
                    .configure($crate::routes::configure),
            )
            .await
        };
    }
    pub(crate) use test_app;

    pub fn admin_token() -> String {
        create_token("admin", Role::ADMIN, SECRET, 3600).expect("token should encode")
    }

    pub fn bearer(token: &str) -> (&'static str, String) {
        ("Authorization", format!("Bearer {}", token))
    }

    pub async fn json_body<B: MessageBody>(res: ServiceResponse<B>, status: StatusCode) -> Value {
        assert_eq!(res.status(), status);
        test::read_body_json(res).await
    }
}
