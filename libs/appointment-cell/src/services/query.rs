// libs/appointment-cell/src/services/query.rs
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use futures::future::try_join_all;
use tracing::debug;

use shared_config::AppConfig;
use shared_models::auth::{User, UserRole};

use crate::models::{
    Appointment, AppointmentError, AppointmentKind, AppointmentListQuery, AppointmentPage,
    AppointmentStatus, AppointmentSummary, AppointmentView,
};
use crate::services::slots::{parse_date, ClinicCalendar};
use crate::services::status::{parse_status_filter, to_external};
use crate::store::{active_markers, AppointmentFilter, AppointmentStore, ACTIVE_STATUS_MARKERS};

pub const PATIENT_DEFAULT_LIMIT: u32 = 10;
pub const STAFF_DEFAULT_LIMIT: u32 = 1000;
pub const MAX_LIMIT: u32 = 5000;
const RECENT_WINDOW_DAYS: i64 = 7;

/// `1500.0` -> `"1,500 บาท"`. Zero or missing prices read `"ไม่ระบุ"`.
pub fn format_price(price: Option<f64>) -> String {
    let Some(price) = price.filter(|p| p.is_finite() && *p > 0.0) else {
        return "ไม่ระบุ".to_string();
    };

    let cents = (price * 100.0).round() as i64;
    let whole = (cents / 100).to_string();
    let fraction = cents % 100;

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    match fraction {
        0 => format!("{} บาท", grouped),
        f if f % 10 == 0 => format!("{}.{} บาท", grouped, f / 10),
        f => format!("{}.{:02} บาท", grouped, f),
    }
}

/// Read access: owners, staff, and doctors on rows assigned to them or
/// still unassigned.
pub fn can_view(actor: &User, appointment: &Appointment) -> bool {
    match actor.role {
        UserRole::Admin => true,
        UserRole::Patient => appointment.user_id == actor.id,
        UserRole::Doctor => match (actor.doctor_id, appointment.doctor_id) {
            (Some(_), None) => true,
            (Some(own), Some(assigned)) => own == assigned,
            (None, _) => false,
        },
    }
}

pub fn to_view(appointment: &Appointment, today: NaiveDate) -> AppointmentView {
    let kind = appointment.kind();
    let status_text = appointment
        .parsed_status()
        .map(|s| s.label().to_string())
        .unwrap_or_else(|| appointment.status.clone());
    let patient = appointment.patient.as_ref();

    AppointmentView {
        id: appointment.id,
        booking_code: appointment.booking_code(),
        appointment_type: kind,
        type_text: kind.type_label().to_string(),
        patient_name: patient.map(|p| p.name.clone()),
        email: patient.and_then(|p| p.email.clone()),
        phone: patient.and_then(|p| p.phone.clone()),
        service: appointment.details.service_label(),
        problem: appointment.problem.clone(),
        doctor_id: appointment.doctor_id,
        appointment_date: appointment.appointment_date.format("%d/%m/%Y").to_string(),
        raw_date: appointment.appointment_date,
        time_slot: appointment.time_slot.clone(),
        status: to_external(&appointment.status),
        status_text,
        total_price: appointment.total_price.unwrap_or(0.0),
        formatted_price: format_price(appointment.total_price),
        can_cancel: ACTIVE_STATUS_MARKERS.contains(&appointment.status.as_str()),
        can_reschedule: appointment.status == AppointmentStatus::Booked.label(),
        is_upcoming: appointment.appointment_date >= today,
        created_at: appointment.created_at,
        updated_at: appointment.updated_at,
    }
}

fn newest_first(a: &Appointment, b: &Appointment) -> std::cmp::Ordering {
    b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id))
}

pub struct AppointmentQueryService {
    store: Arc<dyn AppointmentStore>,
    calendar: ClinicCalendar,
}

impl AppointmentQueryService {
    pub fn new(config: &AppConfig, store: Arc<dyn AppointmentStore>) -> Self {
        Self {
            store,
            calendar: ClinicCalendar::from_config(config),
        }
    }

    fn scope_filter(&self, actor: &User) -> Result<AppointmentFilter, AppointmentError> {
        match actor.role {
            UserRole::Patient => Ok(AppointmentFilter {
                owner_id: Some(actor.id),
                ..Default::default()
            }),
            UserRole::Doctor => {
                let doctor_id = actor.doctor_id.ok_or(AppointmentError::Unauthorized)?;
                Ok(AppointmentFilter {
                    doctor_id: Some(doctor_id),
                    ..Default::default()
                })
            }
            UserRole::Admin => Ok(AppointmentFilter::default()),
        }
    }

    async fn fetch_merged(
        &self,
        kinds: &[AppointmentKind],
        filter: &AppointmentFilter,
        per_table: usize,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let reads = kinds.iter().map(|kind| self.store.list(*kind, filter, per_table));
        let mut merged: Vec<Appointment> =
            try_join_all(reads).await?.into_iter().flatten().collect();
        merged.sort_by(newest_first);
        Ok(merged)
    }

    /// Lists appointments visible to `actor` across both tables, newest first.
    pub async fn list_appointments(
        &self,
        actor: &User,
        query: AppointmentListQuery,
        now: DateTime<Utc>,
    ) -> Result<AppointmentPage, AppointmentError> {
        debug!("Listing appointments for {} {} with {:?}", actor.role, actor.id, query);

        let mut filter = self.scope_filter(actor)?;

        if let Some(status) = query.status.as_deref().filter(|s| !s.is_empty() && *s != "all") {
            let status = parse_status_filter(status).ok_or_else(|| {
                AppointmentError::ValidationError(format!("สถานะไม่ถูกต้อง: {}", status))
            })?;
            let mut statuses = vec![status.label().to_string()];
            if status == AppointmentStatus::Confirmed {
                statuses.push(status.code().to_string());
            }
            filter.statuses = Some(statuses);
        }

        if let Some(date) = query.date.as_deref().filter(|d| !d.is_empty()) {
            filter.date = Some(parse_date(date, true)?);
        }

        let kind_filter = query.kind.as_deref().filter(|k| !k.is_empty() && *k != "all");
        let kinds: Vec<AppointmentKind> = match kind_filter {
            Some(kind) => vec![kind.parse()?],
            None => AppointmentKind::ALL.to_vec(),
        };

        let default_limit = if actor.is_patient() {
            PATIENT_DEFAULT_LIMIT
        } else {
            STAFF_DEFAULT_LIMIT
        };
        let limit = query.limit.unwrap_or(default_limit).clamp(1, MAX_LIMIT) as usize;
        let offset = query.offset.unwrap_or(0) as usize;

        // One extra row per table tells whether another page exists.
        let merged = self.fetch_merged(&kinds, &filter, offset + limit + 1).await?;
        let has_more = merged.len() > offset + limit;

        let today = self.calendar.today(now);
        let appointments: Vec<AppointmentView> = merged
            .iter()
            .skip(offset)
            .take(limit)
            .map(|a| to_view(a, today))
            .collect();

        Ok(AppointmentPage {
            total: appointments.len(),
            appointments,
            has_more,
        })
    }

    /// Latest active appointment of the patient, dated within the last week
    /// or later.
    pub async fn find_recent(
        &self,
        patient: &User,
        now: DateTime<Utc>,
    ) -> Result<Option<AppointmentView>, AppointmentError> {
        let today = self.calendar.today(now);
        let filter = AppointmentFilter {
            owner_id: Some(patient.id),
            statuses: Some(active_markers()),
            date_from: Some(today - Duration::days(RECENT_WINDOW_DAYS)),
            ..Default::default()
        };

        let merged = self.fetch_merged(&AppointmentKind::ALL, &filter, 1).await?;
        Ok(merged.first().map(|a| to_view(a, today)))
    }

    pub async fn get_appointment(
        &self,
        actor: &User,
        kind: AppointmentKind,
        appointment_id: i64,
        now: DateTime<Utc>,
    ) -> Result<AppointmentView, AppointmentError> {
        let appointment = self
            .store
            .get(kind, appointment_id)
            .await?
            .ok_or(AppointmentError::NotFound)?;

        if !can_view(actor, &appointment) {
            return Err(AppointmentError::Unauthorized);
        }

        Ok(to_view(&appointment, self.calendar.today(now)))
    }

    /// Status and type counts over every appointment, counted in the store so
    /// no page limit applies.
    pub async fn summary(&self, actor: &User) -> Result<AppointmentSummary, AppointmentError> {
        if !actor.is_admin() {
            return Err(AppointmentError::Unauthorized);
        }

        let reads = AppointmentKind::ALL.iter().map(|kind| self.store.status_counts(*kind));
        let per_kind = try_join_all(reads).await?;

        let mut summary = AppointmentSummary::default();
        for (kind, counts) in AppointmentKind::ALL.iter().zip(per_kind) {
            for (status, count) in counts {
                match AppointmentStatus::from_stored(&status) {
                    Some(AppointmentStatus::Booked) => summary.pending += count,
                    Some(AppointmentStatus::Confirmed) => summary.confirmed += count,
                    Some(AppointmentStatus::Cancelled) => summary.cancelled += count,
                    Some(AppointmentStatus::Completed) => summary.completed += count,
                    _ => {}
                }
                match kind {
                    AppointmentKind::Physical => summary.physical += count,
                    AppointmentKind::Blood => summary.blood += count,
                }
            }
        }
        Ok(summary)
    }
}
