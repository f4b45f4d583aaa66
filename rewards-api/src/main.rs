use actix_web::{dev::Service, middleware::Logger, web, App, HttpServer};
use anyhow::Context;
use common::{db::establish_connection, notify::Mailer};
use dotenv::dotenv;
use futures::FutureExt;
use ledger::{Ledger, RewardRules};
use prometheus_client::registry::Registry;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod auth;
mod config;
mod error;
mod metrics;
mod routes;
mod security;

use auth::AuthenticationMiddleware;
use config::{AdminCredentials, Config};
use metrics::Metrics;
use security::{configure_cors, RateLimiter};

pub struct AppState {
    pub ledger: Ledger,
    pub mailer: Mailer,
    pub metrics: Metrics,
    pub registry: Registry,
    pub jwt_secret: String,
    pub jwt_expiration: u64,
    pub admin: Option<AdminCredentials>,
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting the rewards service");
    let config = Config::from_env()?;

    let pool = establish_connection(&config.database_url, config.database_max_connections).await?;

    let rules = match &config.reward_rules_path {
        Some(path) => RewardRules::from_path(path)?,
        None => RewardRules::default(),
    };
    info!("Loaded {} reward plans", rules.plans().len());

    let ledger =
        Ledger::new(pool.clone(), rules).with_min_withdrawal(config.withdrawal_min_amount);

    let mut registry = Registry::default();
    let metrics = Metrics::new(&mut registry);

    if config.admin.is_none() {
        info!("ADMIN_EMAIL/ADMIN_PASSWORD not set, admin login disabled");
    }

    let app_state = web::Data::new(AppState {
        ledger,
        mailer: Mailer::new(config.mail_webhook_url.clone()),
        metrics,
        registry,
        jwt_secret: config.jwt_secret.clone(),
        jwt_expiration: config.jwt_expiration,
        admin: config.admin.clone(),
    });

    let rate_limiter = RateLimiter::new(config.rate_limit);
    let allowed_origins = config.allowed_origins.clone();
    let jwt_secret = config.jwt_secret.clone();

    info!("Starting HTTP server on {}", config.server_address());
    HttpServer::new(move || {
        let failed_requests = app_state.metrics.failed_requests.clone();
        App::new()
            .app_data(app_state.clone())
            .app_data(routes::json_config())
            .wrap(AuthenticationMiddleware::new(jwt_secret.clone()))
            .wrap(rate_limiter.clone())
            .wrap_fn(move |req, srv| {
                let failed_requests = failed_requests.clone();
                srv.call(req).map(move |res| {
                    let failed = match &res {
                        Ok(res) => res.status().is_client_error() || res.status().is_server_error(),
                        Err(_) => true,
                    };
                    if failed {
                        failed_requests.inc();
                    }
                    res
                })
            })
            .wrap(configure_cors(&allowed_origins))
            .wrap(Logger::default())
            .configure(routes::configure)
    })
    .bind(config.server_address())
    .with_context(|| format!("Failed to bind {}", config.server_address()))?
    .run()
    .await?;

    info!("HTTP server stopped, closing database pool");
    pool.close().await;
    Ok(())
}
