use anyhow::{Context, Result};
use dotenv::dotenv;
use std::{env, str::FromStr};

#[derive(Debug, Clone)]
pub struct AdminCredentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    // Server configuration
    pub server_host: String,
    pub server_port: u16,

    // Database configuration
    pub database_url: String,
    pub database_max_connections: u32,

    // Security
    pub jwt_secret: String,
    pub jwt_expiration: u64, // in seconds
    pub allowed_origins: Vec<String>,
    pub rate_limit: usize,
    pub admin: Option<AdminCredentials>,

    // Ledger
    pub withdrawal_min_amount: f64,
    pub reward_rules_path: Option<String>,

    // Notifications
    pub mail_webhook_url: Option<String>,
}

fn parse_value<T>(key: &str, raw: Option<String>, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        Some(value) => value
            .trim()
            .parse::<T>()
            .with_context(|| format!("{} has an invalid value: {}", key, value)),
        None => Ok(default),
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let server_port = parse_value("SERVER_PORT", non_empty("SERVER_PORT"), 8080)?;

        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let database_max_connections = parse_value(
            "DATABASE_MAX_CONNECTIONS",
            non_empty("DATABASE_MAX_CONNECTIONS"),
            5,
        )?;

        let jwt_secret =
            env::var("JWT_SECRET").context("JWT_SECRET must be set for secure operation")?;
        let jwt_expiration = parse_value("JWT_EXPIRATION", non_empty("JWT_EXPIRATION"), 86400)?;

        let allowed_origins = parse_origins(
            &env::var("ALLOWED_ORIGINS").unwrap_or_else(|_| "http://localhost:3000".to_string()),
        );
        let rate_limit = parse_value("RATE_LIMIT", non_empty("RATE_LIMIT"), 60)?;

        let admin = match (non_empty("ADMIN_EMAIL"), non_empty("ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(AdminCredentials { email, password }),
            _ => None,
        };

        let withdrawal_min_amount = parse_value(
            "WITHDRAWAL_MIN_AMOUNT",
            non_empty("WITHDRAWAL_MIN_AMOUNT"),
            ledger::MIN_WITHDRAW_AMOUNT,
        )?;

        Ok(Config {
            server_host,
            server_port,
            database_url,
            database_max_connections,
            jwt_secret,
            jwt_expiration,
            allowed_origins,
            rate_limit,
            admin,
            withdrawal_min_amount,
            reward_rules_path: non_empty("REWARD_RULES_PATH"),
            mail_webhook_url: non_empty("MAIL_WEBHOOK_URL"),
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}
