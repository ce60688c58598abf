// libs/appointment-cell/src/store/mod.rs
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::models::{
    Appointment, AppointmentError, AppointmentKind, AppointmentStatus, LabResultRow,
    NewAppointment, ResultArtifact,
};

pub mod memory;
pub mod supabase;

pub use memory::MemoryAppointmentStore;
pub use supabase::SupabaseAppointmentStore;

/// Stored status values that occupy a slot. Includes the legacy English code
/// older confirmed rows were written with.
pub const ACTIVE_STATUS_MARKERS: [&str; 3] = ["จองแล้ว", "ยืนยันแล้ว", "confirmed"];

pub fn active_markers() -> Vec<String> {
    ACTIVE_STATUS_MARKERS.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone)]
pub enum SlotBooking {
    Booked(Appointment),
    SlotFull,
}

#[derive(Debug, Clone)]
pub enum ConfirmOutcome {
    Confirmed(Appointment),
    SlotFull,
    NotFound,
}

#[derive(Debug, Clone)]
pub enum RescheduleOutcome {
    Moved(Appointment),
    SlotFull,
    NotFound,
}

/// Conditional status write. The row is only touched while its stored status
/// is one of `expected` and it falls inside the owner/doctor scope.
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub expected: Vec<String>,
    pub owner_id: Option<i64>,
    /// Restricts to rows assigned to this doctor or not yet assigned.
    pub doctor_scope: Option<i64>,
    pub new_status: AppointmentStatus,
    pub assign_doctor: Option<i64>,
}

impl StatusUpdate {
    pub fn new(expected: Vec<String>, new_status: AppointmentStatus) -> Self {
        Self {
            expected,
            owner_id: None,
            doctor_scope: None,
            new_status,
            assign_doctor: None,
        }
    }

    pub(crate) fn matches(&self, appointment: &Appointment) -> bool {
        if !self.expected.iter().any(|s| s == &appointment.status) {
            return false;
        }
        if let Some(owner) = self.owner_id {
            if appointment.user_id != owner {
                return false;
            }
        }
        if let Some(doctor) = self.doctor_scope {
            if appointment.doctor_id.is_some_and(|assigned| assigned != doctor) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone)]
pub struct SlotTarget {
    pub appointment_date: NaiveDate,
    pub time_slot: String,
    pub expected: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct AppointmentFilter {
    pub owner_id: Option<i64>,
    pub doctor_id: Option<i64>,
    pub statuses: Option<Vec<String>>,
    pub date: Option<NaiveDate>,
    pub date_from: Option<NaiveDate>,
}

impl AppointmentFilter {
    pub(crate) fn matches(&self, appointment: &Appointment) -> bool {
        self.owner_id.map_or(true, |id| appointment.user_id == id)
            && self.doctor_id.map_or(true, |id| appointment.doctor_id == Some(id))
            && self
                .statuses
                .as_ref()
                .map_or(true, |s| s.iter().any(|v| v == &appointment.status))
            && self.date.map_or(true, |d| appointment.appointment_date == d)
            && self.date_from.map_or(true, |d| appointment.appointment_date >= d)
    }
}

/// Persistence seam for both appointment tables. Every write that depends on
/// a count or a current status is atomic inside the implementation.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    /// Inserts `new` unless the slot already holds `max_per_slot` active rows.
    async fn book_slot(
        &self,
        new: NewAppointment,
        max_per_slot: u32,
    ) -> Result<SlotBooking, AppointmentError>;

    async fn active_counts_by_slot(
        &self,
        kind: AppointmentKind,
        date: NaiveDate,
    ) -> Result<HashMap<String, u32>, AppointmentError>;

    async fn get(
        &self,
        kind: AppointmentKind,
        id: i64,
    ) -> Result<Option<Appointment>, AppointmentError>;

    /// Returns `None` when no row matched the precondition.
    async fn update_status(
        &self,
        kind: AppointmentKind,
        id: i64,
        update: StatusUpdate,
    ) -> Result<Option<Appointment>, AppointmentError>;

    /// Conditional status write for a transition into an active status. A row
    /// that does not occupy its slot yet is only moved when the slot still has
    /// room for it.
    async fn confirm(
        &self,
        kind: AppointmentKind,
        id: i64,
        update: StatusUpdate,
        max_per_slot: u32,
    ) -> Result<ConfirmOutcome, AppointmentError>;

    /// Moves a row to a new slot, counting capacity without the row itself.
    async fn reschedule(
        &self,
        kind: AppointmentKind,
        id: i64,
        target: SlotTarget,
        max_per_slot: u32,
    ) -> Result<RescheduleOutcome, AppointmentError>;

    /// Status change plus result artifact in one write.
    async fn complete(
        &self,
        kind: AppointmentKind,
        id: i64,
        update: StatusUpdate,
        artifact: Option<ResultArtifact>,
    ) -> Result<Option<Appointment>, AppointmentError>;

    /// Newest first (`created_at` desc, `id` desc), at most `limit` rows.
    async fn list(
        &self,
        kind: AppointmentKind,
        filter: &AppointmentFilter,
        limit: usize,
    ) -> Result<Vec<Appointment>, AppointmentError>;

    async fn results(
        &self,
        kind: AppointmentKind,
        id: i64,
    ) -> Result<Vec<LabResultRow>, AppointmentError>;

    /// Row count per stored status value over the whole table.
    async fn status_counts(
        &self,
        kind: AppointmentKind,
    ) -> Result<HashMap<String, usize>, AppointmentError>;
}
