// libs/lab-cell/src/router.rs

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post, put},
    Router,
};

use shared_utils::extractor::auth_middleware;

use crate::handlers::{self, LabState};

/// Room for the JSON envelope and file name around the base64 payload.
const UPLOAD_BODY_OVERHEAD: usize = 64 * 1024;

/// Request body limit for a base64 upload of `max_upload_bytes`. Any file up
/// to the configured size fits once encoded.
pub fn upload_body_limit(max_upload_bytes: usize) -> usize {
    max_upload_bytes
        .saturating_add(2)
        .saturating_div(3)
        .saturating_mul(4)
        .saturating_add(UPLOAD_BODY_OVERHEAD)
}

pub fn lab_routes(state: LabState) -> Router {
    let config = state.config.clone();
    let upload_limit = upload_body_limit(config.max_upload_bytes);

    Router::new()
        // Reference catalog
        .route(
            "/lab/categories",
            get(handlers::list_categories).post(handlers::create_category),
        )
        .route(
            "/lab/categories/{id}",
            put(handlers::update_category).delete(handlers::delete_category),
        )
        .route("/lab/tests", get(handlers::list_tests).post(handlers::create_test))
        .route(
            "/lab/tests/{id}",
            get(handlers::get_test).put(handlers::update_test).delete(handlers::delete_test),
        )
        .route("/lab/ranges", post(handlers::create_range))
        .route(
            "/lab/ranges/{id}",
            get(handlers::list_ranges).put(handlers::update_range).delete(handlers::delete_range),
        )

        // Result artifacts
        .route(
            "/appointments/{kind}/{appointment_id}/results",
            get(handlers::get_results).post(handlers::submit_results),
        )
        .route(
            "/appointments/{kind}/{appointment_id}/result-file",
            get(handlers::download_result_file)
                .post(handlers::upload_result_file)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )

        .layer(middleware::from_fn_with_state(config, auth_middleware))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_limit_covers_base64_growth() {
        let ten_mib = 10 * 1024 * 1024;
        let limit = upload_body_limit(ten_mib);
        assert!(limit >= ten_mib.div_ceil(3) * 4);
        assert!(limit > 2 * 1024 * 1024);
        assert_eq!(upload_body_limit(usize::MAX), usize::MAX);
    }
}
