// libs/appointment-cell/src/models.rs
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use shared_models::error::AppError;

// ==============================================================================
// APPOINTMENT KIND & STATUS
// ==============================================================================

/// The two booking kinds. Each one lives in its own table but shares the
/// same lifecycle and slot catalog.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentKind {
    #[serde(alias = "phy")]
    Physical,
    Blood,
}

impl AppointmentKind {
    pub const ALL: [AppointmentKind; 2] = [AppointmentKind::Physical, AppointmentKind::Blood];

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentKind::Physical => "physical",
            AppointmentKind::Blood => "blood",
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            AppointmentKind::Physical => "appointments",
            AppointmentKind::Blood => "blood_appointments",
        }
    }

    /// Human readable label shown next to each appointment.
    pub fn type_label(&self) -> &'static str {
        match self {
            AppointmentKind::Physical => "นัดหมายทั่วไป",
            AppointmentKind::Blood => "ตรวจเลือด",
        }
    }
}

impl fmt::Display for AppointmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AppointmentKind {
    type Err = AppointmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "physical" | "phy" => Ok(AppointmentKind::Physical),
            "blood" => Ok(AppointmentKind::Blood),
            _ => Err(AppointmentError::InvalidKind(s.to_string())),
        }
    }
}

/// Appointment lifecycle state. Serialized with the API vocabulary; the
/// stored vocabulary is available through [`AppointmentStatus::label`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    #[serde(rename = "pending")]
    Booked,
    Confirmed,
    Cancelled,
    Completed,
    Rescheduled,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 5] = [
        AppointmentStatus::Booked,
        AppointmentStatus::Confirmed,
        AppointmentStatus::Cancelled,
        AppointmentStatus::Completed,
        AppointmentStatus::Rescheduled,
    ];

    /// Label persisted in the `status` column.
    pub fn label(&self) -> &'static str {
        match self {
            AppointmentStatus::Booked => "จองแล้ว",
            AppointmentStatus::Confirmed => "ยืนยันแล้ว",
            AppointmentStatus::Cancelled => "ยกเลิกแล้ว",
            AppointmentStatus::Completed => "เสร็จสิ้น",
            AppointmentStatus::Rescheduled => "เลื่อนแล้ว",
        }
    }

    /// Code exposed to API consumers.
    pub fn code(&self) -> &'static str {
        match self {
            AppointmentStatus::Booked => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Rescheduled => "rescheduled",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.label() == label)
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.code() == code)
    }

    /// Parses a value read back from storage, tolerating English codes that
    /// older rows were written with.
    pub fn from_stored(value: &str) -> Option<Self> {
        Self::from_label(value).or_else(|| Self::from_code(value))
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

/// Kind-specific part of an appointment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "appointment_type", rename_all = "lowercase")]
pub enum AppointmentDetails {
    Physical {
        service_id: Option<i64>,
        service_name: Option<String>,
    },
    Blood {
        services: Vec<String>,
    },
}

impl AppointmentDetails {
    pub fn kind(&self) -> AppointmentKind {
        match self {
            AppointmentDetails::Physical { .. } => AppointmentKind::Physical,
            AppointmentDetails::Blood { .. } => AppointmentKind::Blood,
        }
    }

    pub fn service_label(&self) -> String {
        match self {
            AppointmentDetails::Physical { service_name, .. } => {
                service_name.clone().unwrap_or_default()
            }
            AppointmentDetails::Blood { .. } => AppointmentKind::Blood.type_label().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatientContact {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: i64,
    pub user_id: i64,
    pub doctor_id: Option<i64>,
    pub appointment_date: NaiveDate,
    pub time_slot: String,
    /// Raw stored status; may hold a legacy value outside the enumeration.
    pub status: String,
    pub total_price: Option<f64>,
    pub problem: Option<String>,
    pub details: AppointmentDetails,
    pub patient: Option<PatientContact>,
    pub result_file: Option<String>,
    pub result_uploaded_at: Option<DateTime<Utc>>,
    pub rescheduled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn kind(&self) -> AppointmentKind {
        self.details.kind()
    }

    pub fn parsed_status(&self) -> Option<AppointmentStatus> {
        AppointmentStatus::from_stored(&self.status)
    }

    pub fn booking_code(&self) -> String {
        booking_code(self.id)
    }
}

/// Zero-padded booking reference shown to patients. Pads to five digits and
/// never truncates longer ids.
pub fn booking_code(id: i64) -> String {
    format!("{:05}", id)
}

/// Row to insert when a booking is accepted.
#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub user_id: i64,
    pub appointment_date: NaiveDate,
    pub time_slot: String,
    pub total_price: Option<f64>,
    pub problem: Option<String>,
    pub details: AppointmentDetails,
}

impl NewAppointment {
    pub fn kind(&self) -> AppointmentKind {
        self.details.kind()
    }
}

// ==============================================================================
// RESULT ARTIFACTS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResultFlag {
    Normal,
    Low,
    High,
}

impl ResultFlag {
    pub fn evaluate(value: f64, reference_min: Option<f64>, reference_max: Option<f64>) -> Self {
        match (reference_min, reference_max) {
            (Some(min), _) if value < min => ResultFlag::Low,
            (_, Some(max)) if value > max => ResultFlag::High,
            _ => ResultFlag::Normal,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ResultFlag::Normal => "ปกติ",
            ResultFlag::Low => "ต่ำ",
            ResultFlag::High => "สูง",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabResultRow {
    pub test_name: String,
    pub result: f64,
    pub unit: Option<String>,
    pub reference_min: Option<f64>,
    pub reference_max: Option<f64>,
    pub status: ResultFlag,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredResultFile {
    pub file_name: String,
}

/// Output of a completed appointment, attached by staff.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultArtifact {
    Rows(Vec<LabResultRow>),
    File(StoredResultFile),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentResults {
    pub appointment_id: i64,
    pub appointment_type: AppointmentKind,
    pub status: String,
    pub rows: Vec<LabResultRow>,
    pub result_file: Option<String>,
    pub result_uploaded_at: Option<DateTime<Utc>>,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BookAppointmentRequest {
    pub appointment_date: Option<String>,
    pub time_slot: Option<String>,
    pub service_id: Option<i64>,
    pub services: Option<Vec<String>>,
    pub problem: Option<String>,
    #[serde(alias = "totalPrice")]
    pub total_price: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingConfirmation {
    pub appointment_id: i64,
    pub booking_code: String,
    pub appointment_type: AppointmentKind,
    pub appointment_date: NaiveDate,
    pub time_slot: String,
    pub status: AppointmentStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelAppointmentRequest {
    #[serde(alias = "appointmentId")]
    pub appointment_id: Option<i64>,
    pub reason: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientRescheduleRequest {
    #[serde(alias = "appointmentId")]
    pub appointment_id: Option<i64>,
    #[serde(alias = "newDate")]
    pub new_date: Option<String>,
    #[serde(alias = "newTime")]
    pub new_time: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ManageAction {
    Cancel,
    Confirm,
    Reschedule,
}

impl FromStr for ManageAction {
    type Err = AppointmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cancel" => Ok(ManageAction::Cancel),
            "confirm" => Ok(ManageAction::Confirm),
            "reschedule" => Ok(ManageAction::Reschedule),
            _ => Err(AppointmentError::ValidationError(
                "การดำเนินการไม่ถูกต้อง".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManageAppointmentRequest {
    #[serde(alias = "appointmentId")]
    pub appointment_id: Option<i64>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub action: Option<String>,
    pub reason: Option<String>,
    pub new_date: Option<String>,
    pub new_time: Option<String>,
    pub doctor_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub doctor_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConfirmAppointmentRequest {
    pub doctor_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppointmentListQuery {
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub date: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// Normalized, display-ready appointment merged from either table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentView {
    pub id: i64,
    pub booking_code: String,
    pub appointment_type: AppointmentKind,
    #[serde(rename = "typeText")]
    pub type_text: String,
    #[serde(rename = "patientName")]
    pub patient_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub service: String,
    pub problem: Option<String>,
    pub doctor_id: Option<i64>,
    /// `DD/MM/YYYY`
    pub appointment_date: String,
    pub raw_date: NaiveDate,
    pub time_slot: String,
    pub status: String,
    #[serde(rename = "statusText")]
    pub status_text: String,
    pub total_price: f64,
    pub formatted_price: String,
    pub can_cancel: bool,
    pub can_reschedule: bool,
    pub is_upcoming: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentPage {
    pub appointments: Vec<AppointmentView>,
    pub total: usize,
    #[serde(rename = "hasMore")]
    pub has_more: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct AppointmentSummary {
    pub pending: usize,
    pub confirmed: usize,
    pub cancelled: usize,
    pub completed: usize,
    pub physical: usize,
    pub blood: usize,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Invalid appointment type: {0}")]
    InvalidKind(String),

    #[error("Invalid time slot: {0}")]
    InvalidTimeSlot(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Appointment slot is full")]
    SlotFull,

    #[error("Appointment starts within the cancellation cutoff")]
    CancellationCutoff,

    #[error("No cancellable appointment found")]
    NotCancellable,

    #[error("Cannot transition from {from} to {to}")]
    InvalidStatusTransition { from: String, to: String },

    #[error("Patient rescheduling is not supported")]
    RescheduleNotSupported,

    #[error("Unauthorized access to appointment")]
    Unauthorized,

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<AppointmentError> for AppError {
    fn from(error: AppointmentError) -> Self {
        match error {
            AppointmentError::NotFound => AppError::NotFound("ไม่พบข้อมูลการจอง".to_string()),
            AppointmentError::InvalidKind(_) => {
                AppError::ValidationError("ประเภทการจองไม่ถูกต้อง".to_string())
            }
            AppointmentError::InvalidTimeSlot(slot) => {
                AppError::ValidationError(format!("ช่วงเวลาไม่ถูกต้อง: {}", slot))
            }
            AppointmentError::ValidationError(msg) => AppError::ValidationError(msg),
            AppointmentError::SlotFull => AppError::business("slot_full", "ช่วงเวลานี้เต็มแล้ว"),
            AppointmentError::CancellationCutoff => AppError::business(
                "cancellation_cutoff",
                concat!(
                    "ไม่สามารถยกเลิกการนัดหมายได้ เนื่องจากเหลือเวลาน้อยกว่า 2 ชั่วโมง ",
                    "กรุณาติดต่อเจ้าหน้าที่"
                ),
            ),
            AppointmentError::NotCancellable => AppError::business(
                "not_cancellable",
                "ไม่พบการจองที่สามารถยกเลิกได้ หรือการจองถูกยกเลิกแล้ว",
            ),
            AppointmentError::InvalidStatusTransition { from, to } => AppError::business(
                "invalid_transition",
                format!("ไม่สามารถเปลี่ยนสถานะจาก {} เป็น {} ได้", from, to),
            ),
            AppointmentError::RescheduleNotSupported => AppError::business(
                "not_supported",
                "ยังไม่รองรับการเลื่อนนัดด้วยตนเอง กรุณาติดต่อเจ้าหน้าที่",
            ),
            AppointmentError::Unauthorized => {
                AppError::Forbidden("คุณไม่มีสิทธิ์จัดการการนัดหมายนี้".to_string())
            }
            AppointmentError::DatabaseError(detail) => AppError::Database(detail),
        }
    }
}
