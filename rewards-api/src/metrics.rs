use actix_web::{web, HttpResponse, Responder};
use prometheus_client::{
    encoding::text::encode,
    metrics::{counter::Counter, histogram::Histogram},
    registry::Registry,
};
use tracing::error;

use crate::AppState;

#[derive(Clone)]
pub struct Metrics {
    // Counters
    pub deposits_submitted: Counter,
    pub deposits_approved: Counter,
    pub task_payouts: Counter,
    pub withdrawals_created: Counter,
    pub failed_requests: Counter,

    // Histograms
    pub withdrawal_amount: Histogram,
}

impl Metrics {
    pub fn new(registry: &mut Registry) -> Self {
        let deposits_submitted = Counter::default();
        let deposits_approved = Counter::default();
        let task_payouts = Counter::default();
        let withdrawals_created = Counter::default();
        let failed_requests = Counter::default();

        let withdrawal_amount = Histogram::new(
            vec![10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 5000.0].into_iter(),
        );

        registry.register(
            "deposits_submitted",
            "Number of deposits submitted",
            deposits_submitted.clone(),
        );
        registry.register(
            "deposits_approved",
            "Number of deposits moved to COMPLETED",
            deposits_approved.clone(),
        );
        registry.register(
            "task_payouts",
            "Number of completed daily task rounds paid out",
            task_payouts.clone(),
        );
        registry.register(
            "withdrawals_created",
            "Number of withdrawals debited",
            withdrawals_created.clone(),
        );
        registry.register(
            "failed_requests",
            "Requests answered with an error status",
            failed_requests.clone(),
        );
        registry.register(
            "withdrawal_amount",
            "Distribution of withdrawal amounts",
            withdrawal_amount.clone(),
        );

        Self {
            deposits_submitted,
            deposits_approved,
            task_payouts,
            withdrawals_created,
            failed_requests,
            withdrawal_amount,
        }
    }
}

#[actix_web::get("/metrics")]
pub async fn metrics_endpoint(app_state: web::Data<AppState>) -> impl Responder {
    let mut body = String::new();
    if let Err(e) = encode(&mut body, &app_state.registry) {
        error!("Failed to encode metrics: {:?}", e);
        return HttpResponse::InternalServerError().finish();
    }
    HttpResponse::Ok()
        .content_type("application/openmetrics-text; version=1.0.0; charset=utf-8")
        .body(body)
}
