// libs/appointment-cell/src/store/memory.rs
use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use crate::models::{
    Appointment, AppointmentError, AppointmentKind, AppointmentStatus, LabResultRow,
    NewAppointment, ResultArtifact,
};

use super::{
    AppointmentFilter, AppointmentStore, ConfirmOutcome, RescheduleOutcome, SlotBooking,
    SlotTarget, StatusUpdate, ACTIVE_STATUS_MARKERS,
};

#[derive(Default)]
struct Table {
    next_id: i64,
    rows: BTreeMap<i64, Appointment>,
    results: HashMap<i64, Vec<LabResultRow>>,
}

impl Table {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn active_in_slot(&self, date: NaiveDate, slot: &str, exclude: Option<i64>) -> u32 {
        self.rows
            .values()
            .filter(|a| Some(a.id) != exclude)
            .filter(|a| a.appointment_date == date && a.time_slot == slot)
            .filter(|a| ACTIVE_STATUS_MARKERS.contains(&a.status.as_str()))
            .count() as u32
    }
}

fn apply_update(appointment: &mut Appointment, update: &StatusUpdate, now: DateTime<Utc>) {
    appointment.status = update.new_status.label().to_string();
    appointment.updated_at = now;
    if let Some(doctor_id) = update.assign_doctor {
        appointment.doctor_id = Some(doctor_id);
    }
}

/// Process-local store. One lock covers both tables so every count-then-write
/// runs as a single critical section.
#[derive(Default)]
pub struct MemoryAppointmentStore {
    tables: Mutex<HashMap<AppointmentKind, Table>>,
}

impl MemoryAppointmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a fully formed row, assigning a fresh id. Used for fixtures
    /// and imports where status and timestamps are already decided.
    pub async fn seed(&self, mut appointment: Appointment) -> Appointment {
        let mut tables = self.tables.lock().await;
        let table = tables.entry(appointment.kind()).or_default();
        appointment.id = table.allocate_id();
        table.rows.insert(appointment.id, appointment.clone());
        appointment
    }

    pub async fn len(&self, kind: AppointmentKind) -> usize {
        let tables = self.tables.lock().await;
        tables.get(&kind).map_or(0, |t| t.rows.len())
    }
}

#[async_trait]
impl AppointmentStore for MemoryAppointmentStore {
    async fn book_slot(
        &self,
        new: NewAppointment,
        max_per_slot: u32,
    ) -> Result<SlotBooking, AppointmentError> {
        let mut tables = self.tables.lock().await;
        let table = tables.entry(new.kind()).or_default();

        let active = table.active_in_slot(new.appointment_date, &new.time_slot, None);
        if active >= max_per_slot {
            debug!(
                "Slot {} on {} is full ({} active)",
                new.time_slot, new.appointment_date, active
            );
            return Ok(SlotBooking::SlotFull);
        }

        let now = Utc::now();
        let id = table.allocate_id();
        let appointment = Appointment {
            id,
            user_id: new.user_id,
            doctor_id: None,
            appointment_date: new.appointment_date,
            time_slot: new.time_slot,
            status: AppointmentStatus::Booked.label().to_string(),
            total_price: new.total_price,
            problem: new.problem,
            details: new.details,
            patient: None,
            result_file: None,
            result_uploaded_at: None,
            rescheduled_at: None,
            created_at: now,
            updated_at: now,
        };
        table.rows.insert(id, appointment.clone());

        Ok(SlotBooking::Booked(appointment))
    }

    async fn active_counts_by_slot(
        &self,
        kind: AppointmentKind,
        date: NaiveDate,
    ) -> Result<HashMap<String, u32>, AppointmentError> {
        let tables = self.tables.lock().await;
        let mut counts = HashMap::new();
        if let Some(table) = tables.get(&kind) {
            for appointment in table.rows.values() {
                if appointment.appointment_date == date
                    && ACTIVE_STATUS_MARKERS.contains(&appointment.status.as_str())
                {
                    *counts.entry(appointment.time_slot.clone()).or_insert(0) += 1;
                }
            }
        }
        Ok(counts)
    }

    async fn get(
        &self,
        kind: AppointmentKind,
        id: i64,
    ) -> Result<Option<Appointment>, AppointmentError> {
        let tables = self.tables.lock().await;
        Ok(tables.get(&kind).and_then(|t| t.rows.get(&id).cloned()))
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
        let mut tables = self.tables.lock().await;
        let Some(table) = tables.get_mut(&kind) else {
            return Ok(ConfirmOutcome::NotFound);
        };
        let Some(current) = table.rows.get(&id).filter(|a| update.matches(a)) else {
            return Ok(ConfirmOutcome::NotFound);
        };

        // Rows outside the active set do not hold a place in their slot yet.
        if !ACTIVE_STATUS_MARKERS.contains(&current.status.as_str()) {
            let (date, slot) = (current.appointment_date, current.time_slot.as_str());
            if table.active_in_slot(date, slot, Some(id)) >= max_per_slot {
                debug!("Slot {} on {} has no room for appointment {}", slot, date, id);
                return Ok(ConfirmOutcome::SlotFull);
            }
        }

        let Some(appointment) = table.rows.get_mut(&id) else {
            return Ok(ConfirmOutcome::NotFound);
        };
        apply_update(appointment, &update, Utc::now());
        Ok(ConfirmOutcome::Confirmed(appointment.clone()))
    }

    async fn reschedule(
        &self,
        kind: AppointmentKind,
        id: i64,
        target: SlotTarget,
        max_per_slot: u32,
    ) -> Result<RescheduleOutcome, AppointmentError> {
        let mut tables = self.tables.lock().await;
        let Some(table) = tables.get_mut(&kind) else {
            return Ok(RescheduleOutcome::NotFound);
        };

        let eligible = table
            .rows
            .get(&id)
            .is_some_and(|a| target.expected.iter().any(|s| s == &a.status));
        if !eligible {
            return Ok(RescheduleOutcome::NotFound);
        }

        let active = table.active_in_slot(target.appointment_date, &target.time_slot, Some(id));
        if active >= max_per_slot {
            return Ok(RescheduleOutcome::SlotFull);
        }

        let Some(appointment) = table.rows.get_mut(&id) else {
            return Ok(RescheduleOutcome::NotFound);
        };
        let now = Utc::now();
        appointment.appointment_date = target.appointment_date;
        appointment.time_slot = target.time_slot;
        appointment.status = AppointmentStatus::Booked.label().to_string();
        appointment.rescheduled_at = Some(now);
        appointment.updated_at = now;

        Ok(RescheduleOutcome::Moved(appointment.clone()))
    }

    async fn complete(
        &self,
        kind: AppointmentKind,
        id: i64,
        update: StatusUpdate,
        artifact: Option<ResultArtifact>,
    ) -> Result<Option<Appointment>, AppointmentError> {
        let mut tables = self.tables.lock().await;
        let Some(table) = tables.get_mut(&kind) else {
            return Ok(None);
        };
        let Some(appointment) = table.rows.get_mut(&id) else {
            return Ok(None);
        };
        if !update.matches(appointment) {
            return Ok(None);
        }

        let now = Utc::now();
        apply_update(appointment, &update, now);

        match artifact {
            Some(ResultArtifact::File(file)) => {
                appointment.result_file = Some(file.file_name);
                appointment.result_uploaded_at = Some(now);
            }
            Some(ResultArtifact::Rows(rows)) => {
                appointment.result_uploaded_at = Some(now);
                let updated = appointment.clone();
                table.results.insert(id, rows);
                return Ok(Some(updated));
            }
            None => {}
        }

        Ok(Some(appointment.clone()))
    }

    async fn list(
        &self,
        kind: AppointmentKind,
        filter: &AppointmentFilter,
        limit: usize,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let tables = self.tables.lock().await;
        let Some(table) = tables.get(&kind) else {
            return Ok(Vec::new());
        };

        let mut rows: Vec<Appointment> = table
            .rows
            .values()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        rows.truncate(limit);

        Ok(rows)
    }

    async fn results(
        &self,
        kind: AppointmentKind,
        id: i64,
    ) -> Result<Vec<LabResultRow>, AppointmentError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .get(&kind)
            .and_then(|t| t.results.get(&id).cloned())
            .unwrap_or_default())
    }

    async fn status_counts(
        &self,
        kind: AppointmentKind,
    ) -> Result<HashMap<String, usize>, AppointmentError> {
        let tables = self.tables.lock().await;
        let mut counts = HashMap::new();
        if let Some(table) = tables.get(&kind) {
            for appointment in table.rows.values() {
                *counts.entry(appointment.status.clone()).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }
}
