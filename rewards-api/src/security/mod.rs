use actix_cors::Cors;
use actix_web::http;

mod rate_limiter;

pub use rate_limiter::RateLimiter;

/// Header carrying the client's UTC offset in minutes, as JS `getTimezoneOffset()` reports it.
pub const TZ_OFFSET_HEADER: &str = "x-tz-offset-minutes";

pub fn configure_cors(allowed_origins: &[String]) -> Cors {
    let mut cors = Cors::default()
        .allowed_methods(vec!["GET", "POST", "PUT"])
        .allowed_headers(vec![
            http::header::AUTHORIZATION,
            http::header::CONTENT_TYPE,
            http::header::HeaderName::from_static(TZ_OFFSET_HEADER),
        ])
        .max_age(3600);

    if allowed_origins.is_empty() {
        cors = cors.allowed_origin("http://localhost:3000");
    } else {
        for origin in allowed_origins {
            cors = cors.allowed_origin(origin);
        }
    }

    cors
}
