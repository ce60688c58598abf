// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};

use shared_config::AppConfig;
use shared_models::auth::{User, UserRole};
use shared_models::error::AppError;
use shared_utils::extractor::require_role;

use crate::models::{
    AppointmentKind, AppointmentListQuery, BookAppointmentRequest, CancelAppointmentRequest,
    ConfirmAppointmentRequest, ManageAction, ManageAppointmentRequest, PatientRescheduleRequest,
    StatusUpdateRequest,
};
use crate::services::booking::AppointmentBookingService;
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::query::{to_view, AppointmentQueryService};
use crate::services::slots::{parse_date, ClinicCalendar, SlotAvailabilityService};
use crate::store::AppointmentStore;

#[derive(Clone)]
pub struct AppointmentState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn AppointmentStore>,
}

fn parse_kind(value: &str) -> Result<AppointmentKind, AppError> {
    value.parse::<AppointmentKind>().map_err(AppError::from)
}

fn required<T>(value: Option<T>) -> Result<T, AppError> {
    value.ok_or_else(|| AppError::ValidationError("กรุณากรอกข้อมูลให้ครบถ้วน".to_string()))
}

// ==============================================================================
// AVAILABILITY & BOOKING
// ==============================================================================

pub async fn get_time_slots(
    State(state): State<AppointmentState>,
    Path((date, kind)): Path<(String, String)>,
) -> Result<Json<Value>, AppError> {
    let kind = parse_kind(&kind)?;
    let date = parse_date(&date, false)?;

    let service =
        SlotAvailabilityService::new(state.store.clone(), state.config.max_appointments_per_slot);
    let slots = service.availability(date, kind).await?;

    Ok(Json(json!({
        "success": true,
        "date": date,
        "type": kind,
        "slots": slots
    })))
}

pub async fn book_appointment(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    Path(kind): Path<String>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, &[UserRole::Patient])?;
    let kind = parse_kind(&kind)?;

    let service = AppointmentBookingService::new(&state.config, state.store.clone());
    let confirmation = service.book_appointment(&user, kind, request, Utc::now()).await?;

    Ok(Json(json!({
        "success": true,
        "message": "จองนัดหมายสำเร็จ",
        "booking_code": confirmation.booking_code,
        "appointment": confirmation
    })))
}

// ==============================================================================
// QUERIES
// ==============================================================================

pub async fn list_appointments(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    Query(query): Query<AppointmentListQuery>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentQueryService::new(&state.config, state.store.clone());
    let page = service.list_appointments(&user, query, Utc::now()).await?;

    Ok(Json(json!({
        "success": true,
        "appointments": page.appointments,
        "total": page.total,
        "hasMore": page.has_more
    })))
}

pub async fn list_my_appointments(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    Query(query): Query<AppointmentListQuery>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, &[UserRole::Patient])?;
    list_appointments(State(state), Extension(user), Query(query)).await
}

pub async fn get_recent_appointment(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, &[UserRole::Patient])?;

    let service = AppointmentQueryService::new(&state.config, state.store.clone());
    match service.find_recent(&user, Utc::now()).await? {
        Some(appointment) => Ok(Json(json!({
            "success": true,
            "appointment": appointment
        }))),
        None => Ok(Json(json!({
            "success": false,
            "message": "คุณยังไม่มีการจองล่าสุด หรือการจองเก่ากว่า 7 วัน"
        }))),
    }
}

pub async fn get_appointment(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    Path((kind, appointment_id)): Path<(String, i64)>,
) -> Result<Json<Value>, AppError> {
    let kind = parse_kind(&kind)?;

    let service = AppointmentQueryService::new(&state.config, state.store.clone());
    let appointment = service.get_appointment(&user, kind, appointment_id, Utc::now()).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment
    })))
}

pub async fn get_appointment_summary(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, &[UserRole::Admin])?;

    let service = AppointmentQueryService::new(&state.config, state.store.clone());
    let summary = service.summary(&user).await?;

    Ok(Json(json!({
        "success": true,
        "summary": summary
    })))
}

// ==============================================================================
// LIFECYCLE
// ==============================================================================

pub async fn cancel_my_appointment(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    Json(request): Json<CancelAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, &[UserRole::Patient])?;

    let appointment_id = required(request.appointment_id)?;
    let kind = parse_kind(&required(request.kind)?)?;
    let reason = request.reason.unwrap_or_default();

    let service = AppointmentLifecycleService::new(&state.config, state.store.clone());
    service
        .cancel_appointment(&user, kind, appointment_id, &reason, Utc::now())
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "ยกเลิกการนัดหมายสำเร็จ"
    })))
}

pub async fn reschedule_my_appointment(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    Json(_request): Json<PatientRescheduleRequest>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, &[UserRole::Patient])?;

    let service = AppointmentLifecycleService::new(&state.config, state.store.clone());
    service.reschedule_by_patient(&user)?;

    Ok(Json(json!({ "success": true })))
}

pub async fn manage_appointment(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    Json(request): Json<ManageAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, &[UserRole::Admin])?;

    let appointment_id = required(request.appointment_id)?;
    let kind = parse_kind(&required(request.kind)?)?;
    let action: ManageAction = required(request.action)?.parse()?;

    let service = AppointmentLifecycleService::new(&state.config, state.store.clone());
    let calendar = ClinicCalendar::from_config(&state.config);
    let now = Utc::now();

    let (appointment, message) = match action {
        ManageAction::Cancel => {
            let reason = request.reason.unwrap_or_default();
            let appointment = service
                .cancel_appointment(&user, kind, appointment_id, &reason, now)
                .await?;
            (appointment, "ยกเลิกการนัดหมายสำเร็จ")
        }
        ManageAction::Confirm => {
            let appointment = service
                .confirm_appointment(&user, kind, appointment_id, request.doctor_id)
                .await?;
            (appointment, "ยืนยันการนัดหมายสำเร็จ")
        }
        ManageAction::Reschedule => {
            let new_date = required(request.new_date)?;
            let new_time = required(request.new_time)?;
            let appointment = service
                .reschedule_appointment(&user, kind, appointment_id, &new_date, &new_time, now)
                .await?;
            (appointment, "เลื่อนนัดหมายสำเร็จ")
        }
    };

    Ok(Json(json!({
        "success": true,
        "message": message,
        "appointment": to_view(&appointment, calendar.today(now))
    })))
}

pub async fn update_appointment_status(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<i64>,
    Json(request): Json<StatusUpdateRequest>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, &[UserRole::Admin])?;

    let kind = parse_kind(&required(request.kind)?)?;
    let now = Utc::now();

    let service = AppointmentLifecycleService::new(&state.config, state.store.clone());
    let appointment = service
        .apply_status_code(&user, kind, appointment_id, &request.status, request.doctor_id, now)
        .await?;

    let calendar = ClinicCalendar::from_config(&state.config);
    Ok(Json(json!({
        "success": true,
        "message": "อัปเดตสถานะสำเร็จ",
        "appointment": to_view(&appointment, calendar.today(now))
    })))
}

pub async fn confirm_appointment(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    Path((kind, appointment_id)): Path<(String, i64)>,
    request: Option<Json<ConfirmAppointmentRequest>>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, &[UserRole::Admin, UserRole::Doctor])?;
    let kind = parse_kind(&kind)?;
    let doctor_id = request.and_then(|Json(r)| r.doctor_id);

    let service = AppointmentLifecycleService::new(&state.config, state.store.clone());
    let appointment = service
        .confirm_appointment(&user, kind, appointment_id, doctor_id)
        .await?;

    let calendar = ClinicCalendar::from_config(&state.config);
    Ok(Json(json!({
        "success": true,
        "message": "ยืนยันการนัดหมายสำเร็จ",
        "appointment": to_view(&appointment, calendar.today(Utc::now()))
    })))
}
