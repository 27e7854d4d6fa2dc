//! Route table.

use axum::{
    Router,
    routing::{delete, get, post},
};
use tower_http::trace::TraceLayer;

use crate::handlers::{admin, health, payments, tickets};
use crate::middleware::correlation_id_layer;
use crate::state::AppState;

/// Build the full application router.
///
/// ```text
/// POST   /webhooks/payments
/// POST   /api/payments/:payment_id/finalize
/// POST   /api/checkout
/// POST   /api/tickets/:id/redeem
/// POST   /api/tickets/:id/confirm
/// GET    /api/tickets/:id
/// GET    /api/users/:id/tickets
/// GET    /api/events/:id/scans
/// DELETE /api/admin/tickets/:id
/// POST   /api/admin/tickets/:id/void
/// POST   /api/admin/tiers/:id/print
/// POST   /api/admin/tiers/:id/gift
/// POST   /api/admin/events/:id/raffle
/// POST   /api/admin/reaper/run
/// GET    /health
/// GET    /health/ready
/// ```
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/payments/:payment_id/finalize", post(payments::finalize_payment))
        .route("/checkout", post(payments::checkout))
        .route("/tickets/:id", get(tickets::get_ticket))
        .route("/tickets/:id/redeem", post(tickets::redeem_ticket))
        .route("/tickets/:id/confirm", post(tickets::confirm_ticket))
        .route("/users/:id/tickets", get(tickets::user_tickets))
        .route("/events/:id/scans", get(tickets::event_scans))
        .route("/admin/tickets/:id", delete(admin::delete_ticket))
        .route("/admin/tickets/:id/void", post(admin::void_ticket))
        .route("/admin/tiers/:id/print", post(admin::print_tickets))
        .route("/admin/tiers/:id/gift", post(admin::gift_ticket))
        .route("/admin/events/:id/raffle", post(admin::draw_raffle))
        .route("/admin/reaper/run", post(admin::run_reaper));

    Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness))
        .route("/webhooks/payments", post(payments::payment_webhook))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(correlation_id_layer())
        .with_state(state)
}
