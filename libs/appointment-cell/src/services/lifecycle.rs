// libs/appointment-cell/src/services/lifecycle.rs
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use shared_config::AppConfig;
use shared_models::auth::{User, UserRole};

use crate::models::{
    Appointment, AppointmentError, AppointmentKind, AppointmentStatus, ResultArtifact,
};
use crate::services::slots::{find_slot, parse_date, ClinicCalendar};
use crate::services::status::to_external;
use crate::store::{
    active_markers, AppointmentStore, ConfirmOutcome, RescheduleOutcome, SlotTarget,
    StatusUpdate, ACTIVE_STATUS_MARKERS,
};

const LEGACY_CONFIRMED: &str = "confirmed";
const ADMIN_CANCEL_REASON: &str = "ยกเลิกโดยผู้ดูแลระบบ";

pub struct AppointmentLifecycleService {
    store: Arc<dyn AppointmentStore>,
    max_per_slot: u32,
    cancellation_cutoff: Duration,
    calendar: ClinicCalendar,
}

impl AppointmentLifecycleService {
    pub fn new(config: &AppConfig, store: Arc<dyn AppointmentStore>) -> Self {
        Self {
            store,
            max_per_slot: config.max_appointments_per_slot,
            cancellation_cutoff: Duration::hours(config.cancellation_cutoff_hours),
            calendar: ClinicCalendar::from_config(config),
        }
    }

    /// Validate that a status transition is allowed
    pub fn validate_status_transition(
        &self,
        current_status: &AppointmentStatus,
        new_status: &AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        debug!("Validating status transition from {:?} to {:?}", current_status, new_status);

        if !self.get_valid_transitions(current_status).contains(new_status) {
            warn!("Invalid status transition attempted: {:?} -> {:?}", current_status, new_status);
            return Err(AppointmentError::InvalidStatusTransition {
                from: current_status.code().to_string(),
                to: new_status.code().to_string(),
            });
        }

        Ok(())
    }

    /// Get all valid next statuses for a given current status
    pub fn get_valid_transitions(
        &self,
        current_status: &AppointmentStatus,
    ) -> Vec<AppointmentStatus> {
        match current_status {
            AppointmentStatus::Booked => vec![
                AppointmentStatus::Confirmed,
                AppointmentStatus::Cancelled,
                AppointmentStatus::Rescheduled,
            ],
            AppointmentStatus::Confirmed => vec![
                AppointmentStatus::Cancelled,
                AppointmentStatus::Completed,
                AppointmentStatus::Rescheduled,
            ],
            // Rows written before rescheduling became an event. Confirming one
            // re-occupies its slot, so the store checks capacity first.
            AppointmentStatus::Rescheduled => vec![
                AppointmentStatus::Confirmed,
                AppointmentStatus::Cancelled,
            ],
            AppointmentStatus::Completed => vec![],
            AppointmentStatus::Cancelled => vec![],
        }
    }

    /// Stored values a row may hold for `target` to be reachable.
    fn source_labels(&self, target: AppointmentStatus) -> Vec<String> {
        let mut labels: Vec<String> = AppointmentStatus::ALL
            .iter()
            .filter(|s| self.get_valid_transitions(s).contains(&target))
            .map(|s| s.label().to_string())
            .collect();
        if self.get_valid_transitions(&AppointmentStatus::Confirmed).contains(&target) {
            labels.push(LEGACY_CONFIRMED.to_string());
        }
        labels
    }

    /// Scope applied to doctor-initiated writes: rows assigned to them or not
    /// assigned yet.
    fn doctor_scope(&self, actor: &User) -> Result<Option<i64>, AppointmentError> {
        match actor.role {
            UserRole::Doctor => actor.doctor_id.map(Some).ok_or(AppointmentError::Unauthorized),
            _ => Ok(None),
        }
    }

    /// Turns a missed conditional write into the error the caller should see.
    async fn explain_miss(
        &self,
        kind: AppointmentKind,
        id: i64,
        target: AppointmentStatus,
        doctor_scope: Option<i64>,
    ) -> AppointmentError {
        match self.store.get(kind, id).await {
            Ok(None) => AppointmentError::NotFound,
            Ok(Some(current)) => {
                if let (Some(doctor), Some(assigned)) = (doctor_scope, current.doctor_id) {
                    if doctor != assigned {
                        return AppointmentError::Unauthorized;
                    }
                }
                if let Some(Err(e)) = current
                    .parsed_status()
                    .map(|status| self.validate_status_transition(&status, &target))
                {
                    return e;
                }
                // Allowed on paper, so the row changed under us.
                AppointmentError::InvalidStatusTransition {
                    from: to_external(&current.status),
                    to: target.code().to_string(),
                }
            }
            Err(e) => e,
        }
    }

    pub async fn cancel_appointment(
        &self,
        actor: &User,
        kind: AppointmentKind,
        appointment_id: i64,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Cancelling {} appointment {} by user {}", kind, appointment_id, actor.id);

        if reason.trim().is_empty() {
            return Err(AppointmentError::ValidationError(
                "กรุณาระบุเหตุผลในการยกเลิก".to_string(),
            ));
        }

        let update = match actor.role {
            UserRole::Patient => {
                let appointment = self
                    .store
                    .get(kind, appointment_id)
                    .await?
                    .filter(|a| a.user_id == actor.id)
                    .filter(|a| ACTIVE_STATUS_MARKERS.contains(&a.status.as_str()))
                    .ok_or(AppointmentError::NotCancellable)?;

                self.check_cancellation_cutoff(&appointment, now)?;

                StatusUpdate {
                    owner_id: Some(actor.id),
                    ..StatusUpdate::new(active_markers(), AppointmentStatus::Cancelled)
                }
            }
            UserRole::Admin => StatusUpdate::new(
                self.source_labels(AppointmentStatus::Cancelled),
                AppointmentStatus::Cancelled,
            ),
            UserRole::Doctor => return Err(AppointmentError::Unauthorized),
        };

        let cancelled = self
            .store
            .update_status(kind, appointment_id, update)
            .await?
            .ok_or(AppointmentError::NotCancellable)?;

        info!(
            "Appointment {} ({}) cancelled by {} {}: {}",
            appointment_id, kind, actor.role, actor.id, reason
        );
        Ok(cancelled)
    }

    /// Patients may not cancel once the appointment starts within the cutoff.
    /// Appointments already in the past, or further out, are not affected.
    fn check_cancellation_cutoff(
        &self,
        appointment: &Appointment,
        now: DateTime<Utc>,
    ) -> Result<(), AppointmentError> {
        let Some(starts_at) = self
            .calendar
            .slot_starts_at(appointment.appointment_date, &appointment.time_slot)
        else {
            return Ok(());
        };

        let remaining = starts_at - now;
        if remaining > Duration::zero() && remaining < self.cancellation_cutoff {
            warn!(
                "Cancellation of appointment {} rejected, {} minutes before start",
                appointment.id,
                remaining.num_minutes()
            );
            return Err(AppointmentError::CancellationCutoff);
        }
        Ok(())
    }

    pub async fn confirm_appointment(
        &self,
        actor: &User,
        kind: AppointmentKind,
        appointment_id: i64,
        doctor_id: Option<i64>,
    ) -> Result<Appointment, AppointmentError> {
        if !actor.role.is_staff() {
            return Err(AppointmentError::Unauthorized);
        }

        let scope = self.doctor_scope(actor)?;
        let update = StatusUpdate {
            doctor_scope: scope,
            assign_doctor: doctor_id.or(scope),
            ..StatusUpdate::new(
                self.source_labels(AppointmentStatus::Confirmed),
                AppointmentStatus::Confirmed,
            )
        };

        match self
            .store
            .confirm(kind, appointment_id, update, self.max_per_slot)
            .await?
        {
            ConfirmOutcome::Confirmed(appointment) => {
                info!("Appointment {} ({}) confirmed by {}", appointment_id, kind, actor.id);
                Ok(appointment)
            }
            ConfirmOutcome::SlotFull => {
                warn!("Confirmation of appointment {} rejected, slot full", appointment_id);
                Err(AppointmentError::SlotFull)
            }
            ConfirmOutcome::NotFound => Err(self
                .explain_miss(kind, appointment_id, AppointmentStatus::Confirmed, scope)
                .await),
        }
    }

    /// Moves an appointment to another date and slot. The row returns to the
    /// booked state and keeps a `rescheduled_at` stamp.
    pub async fn reschedule_appointment(
        &self,
        actor: &User,
        kind: AppointmentKind,
        appointment_id: i64,
        new_date: &str,
        new_time_slot: &str,
        now: DateTime<Utc>,
    ) -> Result<Appointment, AppointmentError> {
        if !actor.is_admin() {
            return Err(AppointmentError::Unauthorized);
        }

        let appointment_date = parse_date(new_date, true)?;
        if appointment_date < self.calendar.today(now) {
            return Err(AppointmentError::ValidationError(
                "ไม่สามารถเลื่อนไปยังวันที่ผ่านมาแล้วได้".to_string(),
            ));
        }
        if find_slot(new_time_slot).is_none() {
            return Err(AppointmentError::InvalidTimeSlot(new_time_slot.to_string()));
        }

        let target = SlotTarget {
            appointment_date,
            time_slot: new_time_slot.to_string(),
            expected: self.source_labels(AppointmentStatus::Rescheduled),
        };

        match self
            .store
            .reschedule(kind, appointment_id, target, self.max_per_slot)
            .await?
        {
            RescheduleOutcome::Moved(appointment) => {
                info!(
                    "Appointment {} ({}) rescheduled to {} {}",
                    appointment_id, kind, appointment_date, new_time_slot
                );
                Ok(appointment)
            }
            RescheduleOutcome::SlotFull => {
                warn!("Reschedule of appointment {} rejected, target slot full", appointment_id);
                Err(AppointmentError::SlotFull)
            }
            RescheduleOutcome::NotFound => Err(self
                .explain_miss(kind, appointment_id, AppointmentStatus::Rescheduled, None)
                .await),
        }
    }

    /// Self-service rescheduling is not offered to patients.
    pub fn reschedule_by_patient(&self, actor: &User) -> Result<(), AppointmentError> {
        debug!("Patient {} requested self-service reschedule", actor.id);
        Err(AppointmentError::RescheduleNotSupported)
    }

    pub async fn complete_appointment(
        &self,
        actor: &User,
        kind: AppointmentKind,
        appointment_id: i64,
        artifact: Option<ResultArtifact>,
    ) -> Result<Appointment, AppointmentError> {
        if !actor.role.is_staff() {
            return Err(AppointmentError::Unauthorized);
        }

        let scope = self.doctor_scope(actor)?;
        let update = StatusUpdate {
            doctor_scope: scope,
            assign_doctor: scope,
            ..StatusUpdate::new(
                self.source_labels(AppointmentStatus::Completed),
                AppointmentStatus::Completed,
            )
        };

        match self.store.complete(kind, appointment_id, update, artifact).await? {
            Some(appointment) => {
                info!("Appointment {} ({}) completed by {}", appointment_id, kind, actor.id);
                Ok(appointment)
            }
            None => Err(self
                .explain_miss(kind, appointment_id, AppointmentStatus::Completed, scope)
                .await),
        }
    }

    /// Applies an API status code as the matching lifecycle operation.
    pub async fn apply_status_code(
        &self,
        actor: &User,
        kind: AppointmentKind,
        appointment_id: i64,
        code: &str,
        doctor_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<Appointment, AppointmentError> {
        match AppointmentStatus::from_code(code) {
            Some(AppointmentStatus::Confirmed) => {
                self.confirm_appointment(actor, kind, appointment_id, doctor_id).await
            }
            Some(AppointmentStatus::Cancelled) => {
                self.cancel_appointment(actor, kind, appointment_id, ADMIN_CANCEL_REASON, now)
                    .await
            }
            Some(AppointmentStatus::Completed) => {
                self.complete_appointment(actor, kind, appointment_id, None).await
            }
            _ => Err(AppointmentError::ValidationError(format!("สถานะไม่ถูกต้อง: {}", code))),
        }
    }
}
