use actix_web::{
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    error, Error,
};
use futures::future::{ok, LocalBoxFuture, Ready};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    task::{Context, Poll},
    time::{Duration, Instant},
};
use tracing::warn;

const WINDOW: Duration = Duration::from_secs(60);
const PRUNE_THRESHOLD: usize = 10_000;

type Windows = Arc<Mutex<HashMap<String, (usize, Instant)>>>;

/// Fixed one-minute window per client IP. Clones share the same counters, so
/// one limiter can be handed to every worker.
#[derive(Clone)]
pub struct RateLimiter {
    requests_per_minute: usize,
    ip_tracking: Windows,
}

impl RateLimiter {
    pub fn new(requests_per_minute: usize) -> Self {
        RateLimiter {
            requests_per_minute,
            ip_tracking: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

/// Counts one request from `ip`; false once the window's budget is spent.
fn admit(windows: &Windows, ip: &str, limit: usize, now: Instant) -> bool {
    let mut ip_map = match windows.lock() {
        Ok(map) => map,
        Err(poisoned) => poisoned.into_inner(),
    };

    if ip_map.len() > PRUNE_THRESHOLD {
        ip_map.retain(|_, (_, start)| now.duration_since(*start) <= WINDOW);
    }

    let (count, start) = ip_map.entry(ip.to_string()).or_insert((0, now));
    if now.duration_since(*start) > WINDOW {
        *count = 0;
        *start = now;
    }
    if *count >= limit {
        return false;
    }
    *count += 1;
    true
}

impl<S, B> Transform<S, ServiceRequest> for RateLimiter
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = RateLimiterMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(RateLimiterMiddleware {
            service,
            requests_per_minute: self.requests_per_minute,
            ip_tracking: self.ip_tracking.clone(),
        })
    }
}

pub struct RateLimiterMiddleware<S> {
    service: S,
    requests_per_minute: usize,
    ip_tracking: Windows,
}

impl<S, B> Service<ServiceRequest> for RateLimiterMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        // Skip rate limiting for health checks
        if req.path() != "/health" {
            let ip = req
                .connection_info()
                .realip_remote_addr()
                .unwrap_or("unknown")
                .to_string();

            if !admit(&self.ip_tracking, &ip, self.requests_per_minute, Instant::now()) {
                warn!("Rate limit exceeded for {}", ip);
                return Box::pin(async move {
                    Err(error::ErrorTooManyRequests(
                        "Rate limit exceeded. Try again later.",
                    ))
                });
            }
        }

        let fut = self.service.call(req);
        Box::pin(async move {
            let res = fut.await?;
            Ok(res)
        })
    }
}
