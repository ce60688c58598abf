use std::sync::Arc;

use axum::{
    extract::{Extension, State},
    http::HeaderMap,
    Json,
};
use serde_json::{json, Value};
use tracing::debug;

use shared_config::AppConfig;
use shared_models::auth::{SessionInfo, SessionUser, User};
use shared_models::error::AppError;
use shared_utils::extractor::extract_bearer_token;
use shared_utils::jwt::validate_token;

use crate::models::{LoginRequest, RegisterRequest};
use crate::services::account::AccountService;
use crate::store::UserStore;

#[derive(Clone)]
pub struct AuthState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn UserStore>,
}

impl AuthState {
    fn accounts(&self) -> AccountService {
        AccountService::new(self.config.clone(), self.store.clone())
    }
}

pub async fn register(
    State(state): State<AuthState>,
    Json(request): Json<RegisterRequest>,
) -> Result<Json<Value>, AppError> {
    let account = state.accounts().register(request).await?;

    Ok(Json(json!({
        "success": true,
        "message": "ลงทะเบียนสำเร็จ!",
        "user_id": account.id
    })))
}

pub async fn login(
    State(state): State<AuthState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<Value>, AppError> {
    let outcome = state.accounts().login(request).await?;

    Ok(Json(json!({
        "success": true,
        "message": "เข้าสู่ระบบสำเร็จ",
        "token": outcome.token,
        "redirect": outcome.redirect,
        "user": SessionUser::from(&outcome.user)
    })))
}

/// Tokens are held client-side, so logging out only acknowledges the request.
pub async fn logout() -> Json<Value> {
    Json(json!({
        "success": true,
        "message": "ออกจากระบบสำเร็จ"
    }))
}

/// Reports the caller's session without rejecting anonymous requests.
pub async fn session(
    State(state): State<AuthState>,
    headers: HeaderMap,
) -> Json<SessionInfo> {
    let user = extract_bearer_token(&headers)
        .ok()
        .and_then(|token| match validate_token(token, &state.config.jwt_secret) {
            Ok(user) => Some(user),
            Err(reason) => {
                debug!("Session token rejected: {}", reason);
                None
            }
        });

    Json(SessionInfo {
        logged_in: user.is_some(),
        user: user.as_ref().map(SessionUser::from),
    })
}

pub async fn current_user(
    State(state): State<AuthState>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let profile = state.accounts().profile(&user).await?;

    Ok(Json(json!({
        "success": true,
        "user": profile
    })))
}
