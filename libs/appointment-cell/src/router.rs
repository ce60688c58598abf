// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers::{self, AppointmentState};
use crate::store::AppointmentStore;

pub fn appointment_routes(config: Arc<AppConfig>, store: Arc<dyn AppointmentStore>) -> Router {
    let state = AppointmentState { config: config.clone(), store };

    let public_routes = Router::new()
        .route("/time-slots/{date}/{kind}", get(handlers::get_time_slots));

    let protected_routes = Router::new()
        // Booking and listings
        .route("/appointments", get(handlers::list_appointments))
        .route("/appointments/{kind}", post(handlers::book_appointment))
        .route("/appointments/{kind}/{appointment_id}", get(handlers::get_appointment))
        .route("/appointments/{kind}/{appointment_id}/confirm", post(handlers::confirm_appointment))

        // Patient self-service
        .route("/my-appointments", get(handlers::list_my_appointments))
        .route("/my-appointment", get(handlers::get_recent_appointment))
        .route("/my-appointment/cancel", post(handlers::cancel_my_appointment))
        .route("/my-appointment/reschedule", post(handlers::reschedule_my_appointment))

        // Staff management
        .route("/admin/appointments/summary", get(handlers::get_appointment_summary))
        .route("/admin/appointments/manage", post(handlers::manage_appointment))
        .route(
            "/admin/appointments/{appointment_id}/status",
            put(handlers::update_appointment_status),
        )

        .layer(middleware::from_fn_with_state(config, auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
