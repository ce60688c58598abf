use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine};
use tracing::{info, warn};

use appointment_cell::models::{
    Appointment, AppointmentKind, AppointmentResults, LabResultRow, ResultArtifact, ResultFlag,
    StoredResultFile,
};
use appointment_cell::services::lifecycle::AppointmentLifecycleService;
use appointment_cell::services::query::can_view;
use appointment_cell::services::status::to_external;
use appointment_cell::store::AppointmentStore;
use shared_config::AppConfig;
use shared_models::auth::User;

use crate::models::{
    DownloadedFile, LabError, ResultRowInput, SubmitResultsRequest, UploadResultFileRequest,
};
use crate::storage::FileStorage;

pub const ALLOWED_CONTENT_TYPES: [&str; 6] = [
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "image/jpeg",
    "image/jpg",
    "image/png",
];

/// Content type served on download, from the stored file's extension.
pub fn content_type_for(file_name: &str) -> &'static str {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        _ => "application/octet-stream",
    }
}

fn flag_row(input: ResultRowInput) -> Result<LabResultRow, LabError> {
    let test_name = input
        .test_name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| LabError::ValidationError("กรุณาระบุชื่อรายการตรวจ".to_string()))?;
    let result = input
        .result
        .filter(|r| r.is_finite())
        .ok_or_else(|| {
            LabError::ValidationError(format!("ค่าผลตรวจของ {} ไม่ถูกต้อง", test_name))
        })?;

    Ok(LabResultRow {
        status: ResultFlag::evaluate(result, input.reference_min, input.reference_max),
        test_name,
        result,
        unit: input.unit,
        reference_min: input.reference_min,
        reference_max: input.reference_max,
    })
}

/// Decodes plain base64 or a `data:<type>;base64,` URL.
fn decode_payload(data: &str) -> Result<Vec<u8>, LabError> {
    let encoded = match data.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => data,
    };

    STANDARD
        .decode(encoded.trim())
        .map_err(|_| LabError::ValidationError("ข้อมูลไฟล์ไม่ถูกต้อง".to_string()))
}

pub struct LabResultService {
    appointments: Arc<dyn AppointmentStore>,
    storage: Arc<dyn FileStorage>,
    lifecycle: AppointmentLifecycleService,
    max_upload_bytes: usize,
}

impl LabResultService {
    pub fn new(
        config: &AppConfig,
        appointments: Arc<dyn AppointmentStore>,
        storage: Arc<dyn FileStorage>,
    ) -> Self {
        Self {
            lifecycle: AppointmentLifecycleService::new(config, appointments.clone()),
            appointments,
            storage,
            max_upload_bytes: config.max_upload_bytes,
        }
    }

    async fn visible_appointment(
        &self,
        actor: &User,
        kind: AppointmentKind,
        appointment_id: i64,
    ) -> Result<Appointment, LabError> {
        let appointment = self
            .appointments
            .get(kind, appointment_id)
            .await?
            .ok_or(LabError::NotFound("appointment"))?;

        if !can_view(actor, &appointment) {
            return Err(LabError::Unauthorized);
        }
        Ok(appointment)
    }

    /// Flags every row against its reference bounds and completes the
    /// appointment with them in one store call.
    pub async fn submit_results(
        &self,
        actor: &User,
        kind: AppointmentKind,
        appointment_id: i64,
        request: SubmitResultsRequest,
    ) -> Result<Appointment, LabError> {
        if request.results.is_empty() {
            return Err(LabError::ValidationError("ไม่พบข้อมูลที่จะบันทึก".to_string()));
        }

        let rows = request
            .results
            .into_iter()
            .map(flag_row)
            .collect::<Result<Vec<_>, _>>()?;
        let count = rows.len();

        let appointment = self
            .lifecycle
            .complete_appointment(actor, kind, appointment_id, Some(ResultArtifact::Rows(rows)))
            .await?;

        info!("Stored {} result rows for {} appointment {}", count, kind, appointment_id);
        Ok(appointment)
    }

    pub async fn upload_result_file(
        &self,
        actor: &User,
        kind: AppointmentKind,
        appointment_id: i64,
        request: UploadResultFileRequest,
    ) -> Result<Appointment, LabError> {
        let missing = || LabError::ValidationError("กรุณาเลือกไฟล์".to_string());
        let file_name = request.file_name.filter(|n| !n.trim().is_empty()).ok_or_else(missing)?;
        let content_type = request.content_type.ok_or_else(missing)?.to_ascii_lowercase();
        let data = request.data_base64.ok_or_else(missing)?;

        if !ALLOWED_CONTENT_TYPES.contains(&content_type.as_str()) {
            return Err(LabError::UnsupportedFileType(content_type));
        }

        let bytes = decode_payload(&data)?;
        if bytes.is_empty() {
            return Err(missing());
        }
        if bytes.len() > self.max_upload_bytes {
            return Err(LabError::FileTooLarge(self.max_upload_bytes));
        }

        // Nothing is written for appointments the caller cannot see.
        self.visible_appointment(actor, kind, appointment_id).await?;

        let stored_name = self.storage.store(&file_name, &bytes).await?;
        let artifact = ResultArtifact::File(StoredResultFile { file_name: stored_name.clone() });

        match self
            .lifecycle
            .complete_appointment(actor, kind, appointment_id, Some(artifact))
            .await
        {
            Ok(appointment) => Ok(appointment),
            Err(e) => {
                if let Err(cleanup) = self.storage.remove(&stored_name).await {
                    warn!("Orphaned result file {}: {}", stored_name, cleanup);
                }
                Err(e.into())
            }
        }
    }

    pub async fn get_results(
        &self,
        actor: &User,
        kind: AppointmentKind,
        appointment_id: i64,
    ) -> Result<AppointmentResults, LabError> {
        let appointment = self.visible_appointment(actor, kind, appointment_id).await?;
        let rows = self.appointments.results(kind, appointment_id).await?;

        Ok(AppointmentResults {
            appointment_id,
            appointment_type: kind,
            status: to_external(&appointment.status),
            rows,
            result_file: appointment.result_file,
            result_uploaded_at: appointment.result_uploaded_at,
        })
    }

    pub async fn download_result_file(
        &self,
        actor: &User,
        kind: AppointmentKind,
        appointment_id: i64,
    ) -> Result<DownloadedFile, LabError> {
        let appointment = self.visible_appointment(actor, kind, appointment_id).await?;
        let file_name = appointment.result_file.ok_or(LabError::FileMissing)?;
        let bytes = self.storage.read(&file_name).await?.ok_or(LabError::FileMissing)?;

        Ok(DownloadedFile {
            content_type: content_type_for(&file_name),
            file_name,
            bytes,
        })
    }
}
