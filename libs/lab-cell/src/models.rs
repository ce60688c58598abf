use serde::{Deserialize, Serialize};

use appointment_cell::models::AppointmentError;
use shared_models::error::AppError;

// ==============================================================================
// CATALOG
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabTestCategory {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabTest {
    pub id: i64,
    pub name: String,
    pub category_id: i64,
    #[serde(default)]
    pub category_name: Option<String>,
    #[serde(default)]
    pub normal_min: Option<f64>,
    #[serde(default)]
    pub normal_max: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabReferenceRange {
    pub id: i64,
    /// Laboratory that publishes the range, when several labs are used.
    #[serde(default)]
    pub lab_id: Option<i64>,
    pub test_id: i64,
    #[serde(default)]
    pub normal_min: Option<f64>,
    #[serde(default)]
    pub normal_max: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CategoryInput {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LabTestInput {
    pub name: Option<String>,
    pub category_id: Option<i64>,
    pub normal_min: Option<f64>,
    pub normal_max: Option<f64>,
    pub unit: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ReferenceRangeInput {
    pub lab_id: Option<i64>,
    pub test_id: Option<i64>,
    pub normal_min: Option<f64>,
    pub normal_max: Option<f64>,
    pub unit: Option<String>,
}

/// Validated catalog writes handed to the store.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LabTestDraft {
    pub name: String,
    pub category_id: i64,
    pub normal_min: Option<f64>,
    pub normal_max: Option<f64>,
    pub unit: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ReferenceRangeDraft {
    pub lab_id: Option<i64>,
    pub test_id: i64,
    pub normal_min: Option<f64>,
    pub normal_max: Option<f64>,
    pub unit: Option<String>,
}

// ==============================================================================
// RESULTS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultRowInput {
    pub test_name: Option<String>,
    pub result: Option<f64>,
    pub unit: Option<String>,
    pub reference_min: Option<f64>,
    pub reference_max: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SubmitResultsRequest {
    #[serde(default)]
    pub results: Vec<ResultRowInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UploadResultFileRequest {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data_base64: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DownloadedFile {
    pub file_name: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum LabError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Category still has lab tests")]
    CategoryInUse,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("File exceeds {0} bytes")]
    FileTooLarge(usize),

    #[error("No result file stored")]
    FileMissing,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error(transparent)]
    Appointment(#[from] AppointmentError),
}

impl From<LabError> for AppError {
    fn from(error: LabError) -> Self {
        match error {
            LabError::NotFound(what) => AppError::NotFound(format!("ไม่พบข้อมูล ({})", what)),
            LabError::ValidationError(msg) => AppError::ValidationError(msg),
            LabError::CategoryInUse => {
                AppError::BadRequest("ไม่สามารถลบหมวดหมู่ที่ยังมีรายการตรวจอยู่".to_string())
            }
            LabError::Unauthorized => {
                AppError::Forbidden("คุณไม่มีสิทธิ์เข้าถึงหน้านี้".to_string())
            }
            LabError::UnsupportedFileType(_) => {
                AppError::ValidationError("ประเภทไฟล์ไม่ถูกต้อง".to_string())
            }
            LabError::FileTooLarge(_) => {
                AppError::ValidationError("ไฟล์มีขนาดใหญ่เกินกำหนด (สูงสุด 10MB)".to_string())
            }
            LabError::FileMissing => AppError::NotFound("ไม่พบไฟล์ผลตรวจ".to_string()),
            LabError::Storage(detail) => AppError::Internal(detail),
            LabError::DatabaseError(detail) => AppError::Database(detail),
            LabError::Appointment(inner) => AppError::from(inner),
        }
    }
}
