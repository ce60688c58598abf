use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers::{self, AuthState};
use crate::store::UserStore;

pub fn auth_routes(config: Arc<AppConfig>, store: Arc<dyn UserStore>) -> Router {
    let state = AuthState { config: config.clone(), store };

    let public_routes = Router::new()
        .route("/register", post(handlers::register))
        .route("/login", post(handlers::login))
        .route("/logout", post(handlers::logout))
        .route("/session", get(handlers::session));

    let protected_routes = Router::new()
        .route("/user", get(handlers::current_user))
        .layer(middleware::from_fn_with_state(config, auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
