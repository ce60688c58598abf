// libs/appointment-cell/src/store/supabase.rs
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, info};

use shared_database::supabase::SupabaseClient;

use crate::models::{
    Appointment, AppointmentDetails, AppointmentError, AppointmentKind, AppointmentStatus,
    LabResultRow, NewAppointment, PatientContact, ResultArtifact,
};

use super::{
    active_markers, AppointmentFilter, AppointmentStore, ConfirmOutcome, RescheduleOutcome,
    SlotBooking, SlotTarget, StatusUpdate,
};

const PATIENT_EMBED: &str = "personal_info(title,first_name,last_name,email,phone)";

#[derive(Debug, Deserialize)]
struct AppointmentRow {
    id: i64,
    user_id: i64,
    #[serde(default)]
    doctor_id: Option<i64>,
    #[serde(default)]
    service_id: Option<i64>,
    appointment_date: NaiveDate,
    time_slot: String,
    status: String,
    #[serde(default)]
    total_price: Option<f64>,
    #[serde(default)]
    problem: Option<String>,
    #[serde(default)]
    result_file: Option<String>,
    #[serde(default)]
    result_uploaded_at: Option<DateTime<Utc>>,
    #[serde(default)]
    rescheduled_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    personal_info: Option<Value>,
    /// Embedded service for physical rows, JSON list for blood rows.
    #[serde(default)]
    services: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct PersonalInfoEmbed {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    phone: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SlotRow {
    time_slot: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
enum RpcOutcome {
    Booked { appointment: Value },
    Confirmed { appointment: Value },
    Moved { appointment: Value },
    Completed { appointment: Value },
    SlotFull,
    NotFound,
}

/// Embedded one-to-one relations arrive as an object or a single-element
/// array depending on how PostgREST resolved the relationship.
fn first_embedded(value: Option<Value>) -> Option<Value> {
    match value? {
        Value::Array(items) => items.into_iter().next(),
        Value::Null => None,
        other => Some(other),
    }
}

fn blood_services(value: Option<Value>) -> Vec<String> {
    let value = match value {
        Some(Value::String(raw)) => serde_json::from_str(&raw).unwrap_or(Value::String(raw)),
        Some(other) => other,
        None => return Vec::new(),
    };

    match value {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .collect(),
        Value::String(s) if !s.is_empty() => vec![s],
        Value::Number(n) => vec![n.to_string()],
        _ => Vec::new(),
    }
}

impl AppointmentRow {
    fn into_appointment(self, kind: AppointmentKind) -> Appointment {
        let patient = first_embedded(self.personal_info)
            .and_then(|v| serde_json::from_value::<PersonalInfoEmbed>(v).ok())
            .map(|info| {
                let name = [info.title, info.first_name, info.last_name]
                    .into_iter()
                    .flatten()
                    .filter(|part| !part.is_empty())
                    .collect::<Vec<_>>()
                    .join(" ");
                PatientContact { name, email: info.email, phone: info.phone }
            });

        let details = match kind {
            AppointmentKind::Physical => AppointmentDetails::Physical {
                service_id: self.service_id,
                service_name: first_embedded(self.services)
                    .and_then(|s| s.get("name").and_then(Value::as_str).map(str::to_string)),
            },
            AppointmentKind::Blood => AppointmentDetails::Blood {
                services: blood_services(self.services),
            },
        };

        Appointment {
            id: self.id,
            user_id: self.user_id,
            doctor_id: self.doctor_id,
            appointment_date: self.appointment_date,
            time_slot: self.time_slot,
            status: self.status,
            total_price: self.total_price,
            problem: self.problem,
            details,
            patient,
            result_file: self.result_file,
            result_uploaded_at: self.result_uploaded_at,
            rescheduled_at: self.rescheduled_at,
            created_at: self.created_at,
            updated_at: self.updated_at.unwrap_or(self.created_at),
        }
    }
}

fn select_clause(kind: AppointmentKind) -> String {
    match kind {
        AppointmentKind::Physical => format!("*,{},services(name)", PATIENT_EMBED),
        AppointmentKind::Blood => format!("*,{}", PATIENT_EMBED),
    }
}

/// PostgREST `in.(…)` list with every member quoted and URL-encoded.
fn in_list(values: &[String]) -> String {
    let quoted = values
        .iter()
        .map(|v| format!("\"{}\"", v.replace('"', "")))
        .collect::<Vec<_>>()
        .join(",");
    format!("in.({})", urlencoding::encode(&quoted))
}

fn db_error(context: &str, e: anyhow::Error) -> AppointmentError {
    error!("{}: {}", context, e);
    AppointmentError::DatabaseError(format!("{}: {}", context, e))
}

pub struct SupabaseAppointmentStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseAppointmentStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    fn parse_row(kind: AppointmentKind, value: Value) -> Result<Appointment, AppointmentError> {
        serde_json::from_value::<AppointmentRow>(value)
            .map(|row| row.into_appointment(kind))
            .map_err(|e| {
                AppointmentError::DatabaseError(format!("Failed to parse appointment: {}", e))
            })
    }

    async fn complete_with_rows(
        &self,
        kind: AppointmentKind,
        id: i64,
        update: StatusUpdate,
        rows: Vec<LabResultRow>,
    ) -> Result<Option<Appointment>, AppointmentError> {
        let args = json!({
            "p_kind": kind.as_str(),
            "p_id": id,
            "p_expected_statuses": update.expected,
            "p_doctor_scope": update.doctor_scope,
            "p_assign_doctor": update.assign_doctor,
            "p_status": update.new_status.label(),
            "p_rows": rows,
        });

        let outcome: RpcOutcome = self
            .supabase
            .rpc("complete_appointment_with_results", args)
            .await
            .map_err(|e| db_error("Failed to store appointment results", e))?;

        match outcome {
            RpcOutcome::Completed { appointment } => {
                Ok(Some(Self::parse_row(kind, appointment)?))
            }
            RpcOutcome::NotFound => Ok(None),
            other => Err(AppointmentError::DatabaseError(format!(
                "Unexpected completion outcome: {:?}",
                other
            ))),
        }
    }

    fn status_update_path(kind: AppointmentKind, id: i64, update: &StatusUpdate) -> String {
        let mut path = format!(
            "/rest/v1/{}?id=eq.{}&status={}",
            kind.table(),
            id,
            in_list(&update.expected)
        );
        if let Some(owner) = update.owner_id {
            path.push_str(&format!("&user_id=eq.{}", owner));
        }
        if let Some(doctor) = update.doctor_scope {
            path.push_str(&format!(
                "&or={}",
                urlencoding::encode(&format!("(doctor_id.is.null,doctor_id.eq.{})", doctor))
            ));
        }
        path
    }
}

#[async_trait]
impl AppointmentStore for SupabaseAppointmentStore {
    async fn book_slot(
        &self,
        new: NewAppointment,
        max_per_slot: u32,
    ) -> Result<SlotBooking, AppointmentError> {
        let kind = new.kind();
        debug!("Booking {} slot {} on {}", kind, new.time_slot, new.appointment_date);

        let (service_id, services) = match &new.details {
            AppointmentDetails::Physical { service_id, .. } => (*service_id, Value::Null),
            AppointmentDetails::Blood { services } => (None, json!(services)),
        };

        let args = json!({
            "p_kind": kind.as_str(),
            "p_user_id": new.user_id,
            "p_appointment_date": new.appointment_date,
            "p_time_slot": new.time_slot,
            "p_service_id": service_id,
            "p_services": services,
            "p_problem": new.problem,
            "p_total_price": new.total_price,
            "p_status": AppointmentStatus::Booked.label(),
            "p_active_statuses": active_markers(),
            "p_max_per_slot": max_per_slot,
        });

        let outcome: RpcOutcome = self
            .supabase
            .rpc("book_appointment_slot", args)
            .await
            .map_err(|e| db_error("Failed to book appointment slot", e))?;

        match outcome {
            RpcOutcome::Booked { appointment } => {
                let appointment = Self::parse_row(kind, appointment)?;
                info!("Stored {} appointment {}", kind, appointment.id);
                Ok(SlotBooking::Booked(appointment))
            }
            RpcOutcome::SlotFull => Ok(SlotBooking::SlotFull),
            other => Err(AppointmentError::DatabaseError(format!(
                "Unexpected booking outcome: {:?}",
                other
            ))),
        }
    }

    async fn active_counts_by_slot(
        &self,
        kind: AppointmentKind,
        date: NaiveDate,
    ) -> Result<HashMap<String, u32>, AppointmentError> {
        let path = format!(
            "/rest/v1/{}?select=time_slot&appointment_date=eq.{}&status={}",
            kind.table(),
            date,
            in_list(&active_markers())
        );

        let rows: Vec<SlotRow> = self
            .supabase
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| db_error("Failed to count booked slots", e))?;

        let mut counts = HashMap::new();
        for row in rows {
            *counts.entry(row.time_slot).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn get(
        &self,
        kind: AppointmentKind,
        id: i64,
    ) -> Result<Option<Appointment>, AppointmentError> {
        let path = format!("/rest/v1/{}?select={}&id=eq.{}", kind.table(), select_clause(kind), id);

        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| db_error("Failed to fetch appointment", e))?;

        rows.into_iter()
            .next()
            .map(|row| Self::parse_row(kind, row))
            .transpose()
    }

    async fn update_status(
        &self,
        kind: AppointmentKind,
        id: i64,
        update: StatusUpdate,
    ) -> Result<Option<Appointment>, AppointmentError> {
        self.complete(kind, id, update, None).await
    }

    async fn confirm(
        &self,
        kind: AppointmentKind,
        id: i64,
        update: StatusUpdate,
        max_per_slot: u32,
    ) -> Result<ConfirmOutcome, AppointmentError> {
        let args = json!({
            "p_kind": kind.as_str(),
            "p_id": id,
            "p_expected_statuses": update.expected,
            "p_doctor_scope": update.doctor_scope,
            "p_assign_doctor": update.assign_doctor,
            "p_status": update.new_status.label(),
            "p_active_statuses": active_markers(),
            "p_max_per_slot": max_per_slot,
        });

        let outcome: RpcOutcome = self
            .supabase
            .rpc("confirm_appointment_slot", args)
            .await
            .map_err(|e| db_error("Failed to confirm appointment", e))?;

        match outcome {
            RpcOutcome::Confirmed { appointment } => {
                Ok(ConfirmOutcome::Confirmed(Self::parse_row(kind, appointment)?))
            }
            RpcOutcome::SlotFull => Ok(ConfirmOutcome::SlotFull),
            RpcOutcome::NotFound => Ok(ConfirmOutcome::NotFound),
            other => Err(AppointmentError::DatabaseError(format!(
                "Unexpected confirm outcome: {:?}",
                other
            ))),
        }
    }

    async fn reschedule(
        &self,
        kind: AppointmentKind,
        id: i64,
        target: SlotTarget,
        max_per_slot: u32,
    ) -> Result<RescheduleOutcome, AppointmentError> {
        let args = json!({
            "p_kind": kind.as_str(),
            "p_id": id,
            "p_new_date": target.appointment_date,
            "p_new_slot": target.time_slot,
            "p_expected_statuses": target.expected,
            "p_active_statuses": active_markers(),
            "p_reset_status": AppointmentStatus::Booked.label(),
            "p_max_per_slot": max_per_slot,
        });

        let outcome: RpcOutcome = self
            .supabase
            .rpc("reschedule_appointment_slot", args)
            .await
            .map_err(|e| db_error("Failed to reschedule appointment", e))?;

        match outcome {
            RpcOutcome::Moved { appointment } => {
                Ok(RescheduleOutcome::Moved(Self::parse_row(kind, appointment)?))
            }
            RpcOutcome::SlotFull => Ok(RescheduleOutcome::SlotFull),
            RpcOutcome::NotFound => Ok(RescheduleOutcome::NotFound),
            other => Err(AppointmentError::DatabaseError(format!(
                "Unexpected reschedule outcome: {:?}",
                other
            ))),
        }
    }

    async fn complete(
        &self,
        kind: AppointmentKind,
        id: i64,
        update: StatusUpdate,
        artifact: Option<ResultArtifact>,
    ) -> Result<Option<Appointment>, AppointmentError> {
        let now = Utc::now();

        let file = match artifact {
            Some(ResultArtifact::Rows(rows)) => {
                return self.complete_with_rows(kind, id, update, rows).await
            }
            Some(ResultArtifact::File(file)) => Some(file),
            None => None,
        };

        let mut body = json!({
            "status": update.new_status.label(),
            "updated_at": now,
        });
        if let Some(doctor_id) = update.assign_doctor {
            body["doctor_id"] = json!(doctor_id);
        }
        if let Some(file) = file {
            body["result_file"] = json!(file.file_name);
            body["result_uploaded_at"] = json!(now);
        }

        let path = Self::status_update_path(kind, id, &update);
        let rows: Vec<Value> = self
            .supabase
            .request_returning(Method::PATCH, &path, Some(body))
            .await
            .map_err(|e| db_error("Failed to update appointment status", e))?;

        rows.into_iter()
            .next()
            .map(|row| Self::parse_row(kind, row))
            .transpose()
    }

    async fn list(
        &self,
        kind: AppointmentKind,
        filter: &AppointmentFilter,
        limit: usize,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let mut path = format!("/rest/v1/{}?select={}", kind.table(), select_clause(kind));

        if let Some(owner) = filter.owner_id {
            path.push_str(&format!("&user_id=eq.{}", owner));
        }
        if let Some(doctor) = filter.doctor_id {
            path.push_str(&format!("&doctor_id=eq.{}", doctor));
        }
        if let Some(statuses) = &filter.statuses {
            path.push_str(&format!("&status={}", in_list(statuses)));
        }
        if let Some(date) = filter.date {
            path.push_str(&format!("&appointment_date=eq.{}", date));
        }
        if let Some(from) = filter.date_from {
            path.push_str(&format!("&appointment_date=gte.{}", from));
        }
        path.push_str(&format!("&order=created_at.desc,id.desc&limit={}", limit));

        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| db_error("Failed to list appointments", e))?;

        rows.into_iter().map(|row| Self::parse_row(kind, row)).collect()
    }

    async fn results(
        &self,
        kind: AppointmentKind,
        id: i64,
    ) -> Result<Vec<LabResultRow>, AppointmentError> {
        let path = format!(
            "/rest/v1/appointment_results?appointment_kind=eq.{}&appointment_id=eq.{}&order=id.asc",
            kind.as_str(),
            id
        );

        self.supabase
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| db_error("Failed to fetch appointment results", e))
    }

    async fn status_counts(
        &self,
        kind: AppointmentKind,
    ) -> Result<HashMap<String, usize>, AppointmentError> {
        self.supabase
            .rpc("appointment_status_counts", json!({ "p_kind": kind.as_str() }))
            .await
            .map_err(|e| db_error("Failed to count appointments by status", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_list_quotes_and_encodes_members() {
        let encoded = in_list(&["จองแล้ว".to_string(), "confirmed".to_string()]);
        let members = encoded.trim_start_matches("in.(").trim_end_matches(')');
        let decoded = urlencoding::decode(members).unwrap();
        assert_eq!(decoded, "\"จองแล้ว\",\"confirmed\"");
    }

    #[test]
    fn test_blood_services_accepts_stringified_json() {
        assert_eq!(blood_services(Some(json!("[\"1\",\"4\"]"))), vec!["1", "4"]);
        assert_eq!(blood_services(Some(json!([2, 3]))), vec!["2", "3"]);
        assert!(blood_services(None).is_empty());
    }

    #[test]
    fn test_row_conversion_builds_patient_name() {
        let row: AppointmentRow = serde_json::from_value(json!({
            "id": 5,
            "user_id": 9,
            "service_id": 2,
            "appointment_date": "2030-01-02",
            "time_slot": "09:00-10:00",
            "status": "จองแล้ว",
            "created_at": "2030-01-01T00:00:00+00:00",
            "personal_info": [{ "title": "นาย", "first_name": "สมชาย", "last_name": "ใจดี" }],
            "services": { "name": "ตรวจสุขภาพ" }
        }))
        .unwrap();

        let appointment = row.into_appointment(AppointmentKind::Physical);
        assert_eq!(appointment.patient.unwrap().name, "นาย สมชาย ใจดี");
        assert_eq!(appointment.details.service_label(), "ตรวจสุขภาพ");
        assert_eq!(appointment.updated_at, appointment.created_at);
    }
}
