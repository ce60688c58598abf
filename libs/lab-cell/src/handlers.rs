// libs/lab-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};

use appointment_cell::models::AppointmentKind;
use appointment_cell::services::query::to_view;
use appointment_cell::services::slots::ClinicCalendar;
use appointment_cell::store::AppointmentStore;
use shared_config::AppConfig;
use shared_models::auth::{User, UserRole};
use shared_models::error::AppError;
use shared_utils::extractor::require_role;

use crate::models::{
    CategoryInput, LabError, LabTestInput, ReferenceRangeInput, SubmitResultsRequest,
    UploadResultFileRequest,
};
use crate::services::catalog::LabCatalogService;
use crate::services::results::LabResultService;
use crate::storage::FileStorage;
use crate::store::LabCatalogStore;

#[derive(Clone)]
pub struct LabState {
    pub config: Arc<AppConfig>,
    pub catalog: Arc<dyn LabCatalogStore>,
    pub appointments: Arc<dyn AppointmentStore>,
    pub storage: Arc<dyn FileStorage>,
}

impl LabState {
    fn catalog_service(&self) -> LabCatalogService {
        LabCatalogService::new(self.catalog.clone())
    }

    fn result_service(&self) -> LabResultService {
        LabResultService::new(&self.config, self.appointments.clone(), self.storage.clone())
    }
}

fn parse_kind(value: &str) -> Result<AppointmentKind, AppError> {
    value.parse::<AppointmentKind>().map_err(AppError::from)
}

// ==============================================================================
// CATALOG
// ==============================================================================

pub async fn list_categories(State(state): State<LabState>) -> Result<Json<Value>, AppError> {
    let categories = state.catalog_service().list_categories().await?;
    Ok(Json(json!({ "success": true, "categories": categories })))
}

pub async fn create_category(
    State(state): State<LabState>,
    Extension(user): Extension<User>,
    Json(input): Json<CategoryInput>,
) -> Result<Json<Value>, AppError> {
    let category = state.catalog_service().create_category(&user, input).await?;
    Ok(Json(json!({ "success": true, "message": "เพิ่มหมวดหมู่สำเร็จ", "category": category })))
}

pub async fn update_category(
    State(state): State<LabState>,
    Extension(user): Extension<User>,
    Path(id): Path<i64>,
    Json(input): Json<CategoryInput>,
) -> Result<Json<Value>, AppError> {
    let category = state.catalog_service().update_category(&user, id, input).await?;
    Ok(Json(json!({ "success": true, "message": "แก้ไขหมวดหมู่สำเร็จ", "category": category })))
}

pub async fn delete_category(
    State(state): State<LabState>,
    Extension(user): Extension<User>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    state.catalog_service().delete_category(&user, id).await?;
    Ok(Json(json!({ "success": true, "message": "ลบหมวดหมู่สำเร็จ" })))
}

pub async fn list_tests(State(state): State<LabState>) -> Result<Json<Value>, AppError> {
    let tests = state.catalog_service().list_tests().await?;
    Ok(Json(json!({ "success": true, "tests": tests })))
}

pub async fn get_test(
    State(state): State<LabState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    let test = state.catalog_service().get_test(id).await?;
    Ok(Json(json!({ "success": true, "test": test })))
}

pub async fn create_test(
    State(state): State<LabState>,
    Extension(user): Extension<User>,
    Json(input): Json<LabTestInput>,
) -> Result<Json<Value>, AppError> {
    let test = state.catalog_service().create_test(&user, input).await?;
    Ok(Json(json!({ "success": true, "message": "เพิ่มรายการตรวจสำเร็จ", "test": test })))
}

pub async fn update_test(
    State(state): State<LabState>,
    Extension(user): Extension<User>,
    Path(id): Path<i64>,
    Json(input): Json<LabTestInput>,
) -> Result<Json<Value>, AppError> {
    let test = state.catalog_service().update_test(&user, id, input).await?;
    Ok(Json(json!({ "success": true, "message": "แก้ไขรายการตรวจสำเร็จ", "test": test })))
}

pub async fn delete_test(
    State(state): State<LabState>,
    Extension(user): Extension<User>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    state.catalog_service().delete_test(&user, id).await?;
    Ok(Json(json!({ "success": true, "message": "ลบรายการตรวจสำเร็จ" })))
}

/// `GET /lab/ranges/{id}` lists the ranges of test `id`.
pub async fn list_ranges(
    State(state): State<LabState>,
    Path(test_id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    let ranges = state.catalog_service().list_ranges(test_id).await?;
    Ok(Json(json!({ "success": true, "ranges": ranges })))
}

pub async fn create_range(
    State(state): State<LabState>,
    Extension(user): Extension<User>,
    Json(input): Json<ReferenceRangeInput>,
) -> Result<Json<Value>, AppError> {
    let range = state.catalog_service().create_range(&user, input).await?;
    Ok(Json(json!({ "success": true, "message": "เพิ่มช่วงค่าอ้างอิงสำเร็จ", "range": range })))
}

pub async fn update_range(
    State(state): State<LabState>,
    Extension(user): Extension<User>,
    Path(id): Path<i64>,
    Json(input): Json<ReferenceRangeInput>,
) -> Result<Json<Value>, AppError> {
    let range = state.catalog_service().update_range(&user, id, input).await?;
    Ok(Json(json!({ "success": true, "message": "แก้ไขช่วงค่าอ้างอิงสำเร็จ", "range": range })))
}

pub async fn delete_range(
    State(state): State<LabState>,
    Extension(user): Extension<User>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    state.catalog_service().delete_range(&user, id).await?;
    Ok(Json(json!({ "success": true, "message": "ลบช่วงค่าอ้างอิงสำเร็จ" })))
}

// ==============================================================================
// RESULTS
// ==============================================================================

pub async fn get_results(
    State(state): State<LabState>,
    Extension(user): Extension<User>,
    Path((kind, appointment_id)): Path<(String, i64)>,
) -> Result<Json<Value>, AppError> {
    let kind = parse_kind(&kind)?;
    let results = state.result_service().get_results(&user, kind, appointment_id).await?;
    Ok(Json(json!({ "success": true, "results": results })))
}

pub async fn submit_results(
    State(state): State<LabState>,
    Extension(user): Extension<User>,
    Path((kind, appointment_id)): Path<(String, i64)>,
    Json(request): Json<SubmitResultsRequest>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, &[UserRole::Admin, UserRole::Doctor])?;
    let kind = parse_kind(&kind)?;

    let appointment = state
        .result_service()
        .submit_results(&user, kind, appointment_id, request)
        .await?;

    let calendar = ClinicCalendar::from_config(&state.config);
    Ok(Json(json!({
        "success": true,
        "message": "บันทึกผลตรวจสำเร็จ",
        "appointment": to_view(&appointment, calendar.today(Utc::now()))
    })))
}

pub async fn upload_result_file(
    State(state): State<LabState>,
    Extension(user): Extension<User>,
    Path((kind, appointment_id)): Path<(String, i64)>,
    payload: Result<Json<UploadResultFileRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, &[UserRole::Admin, UserRole::Doctor])?;
    let kind = parse_kind(&kind)?;
    let Json(request) = payload.map_err(|rejection| match rejection.status() {
        StatusCode::PAYLOAD_TOO_LARGE => {
            AppError::from(LabError::FileTooLarge(state.config.max_upload_bytes))
        }
        _ => AppError::BadRequest(rejection.body_text()),
    })?;

    let appointment = state
        .result_service()
        .upload_result_file(&user, kind, appointment_id, request)
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "อัปโหลดไฟล์ผลตรวจสำเร็จ",
        "file": appointment.result_file
    })))
}

pub async fn download_result_file(
    State(state): State<LabState>,
    Extension(user): Extension<User>,
    Path((kind, appointment_id)): Path<(String, i64)>,
) -> Result<Response, AppError> {
    let kind = parse_kind(&kind)?;
    let file = state
        .result_service()
        .download_result_file(&user, kind, appointment_id)
        .await?;

    let disposition = format!(
        "attachment; filename*=UTF-8''{}",
        urlencoding::encode(&file.file_name)
    );

    Ok((
        [
            (header::CONTENT_TYPE, file.content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        file.bytes,
    )
        .into_response())
}
