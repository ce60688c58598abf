// libs/appointment-cell/src/services/slots.rs
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use shared_config::AppConfig;

use crate::models::{AppointmentError, AppointmentKind};
use crate::store::AppointmentStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSlot {
    pub slot_time: &'static str,
    pub display_name: &'static str,
}

/// Bookable slots of a clinic day, in display order. Noon is closed.
pub const SLOT_CATALOG: [TimeSlot; 7] = [
    TimeSlot { slot_time: "09:00-10:00", display_name: "9:00 - 10:00 น." },
    TimeSlot { slot_time: "10:00-11:00", display_name: "10:00 - 11:00 น." },
    TimeSlot { slot_time: "11:00-12:00", display_name: "11:00 - 12:00 น." },
    TimeSlot { slot_time: "13:00-14:00", display_name: "13:00 - 14:00 น." },
    TimeSlot { slot_time: "14:00-15:00", display_name: "14:00 - 15:00 น." },
    TimeSlot { slot_time: "15:00-16:00", display_name: "15:00 - 16:00 น." },
    TimeSlot { slot_time: "16:00-17:00", display_name: "16:00 - 17:00 น." },
];

pub fn find_slot(slot_time: &str) -> Option<&'static TimeSlot> {
    SLOT_CATALOG.iter().find(|slot| slot.slot_time == slot_time)
}

/// Start of a `"HH:MM-HH:MM"` slot. Works for legacy values outside the
/// catalog as long as they keep the same shape.
pub fn slot_start(time_slot: &str) -> Option<NaiveTime> {
    let start = time_slot.split('-').next()?.trim();
    NaiveTime::parse_from_str(start, "%H:%M").ok()
}

/// Accepts `YYYY-MM-DD`, and `DD/MM/YYYY` when `allow_display_format` is set.
pub fn parse_date(value: &str, allow_display_format: bool) -> Result<NaiveDate, AppointmentError> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|e| {
            if allow_display_format {
                NaiveDate::parse_from_str(value, "%d/%m/%Y")
            } else {
                Err(e)
            }
        })
        .map_err(|_| {
            AppointmentError::ValidationError(format!("รูปแบบวันที่ไม่ถูกต้อง: {}", value))
        })
}

/// Wall clock of the clinic. Slot times and "today" are interpreted here.
#[derive(Debug, Clone, Copy)]
pub struct ClinicCalendar {
    offset: FixedOffset,
}

impl ClinicCalendar {
    pub fn new(utc_offset_hours: i32) -> Self {
        let offset = FixedOffset::east_opt(utc_offset_hours * 3600).unwrap_or_else(|| {
            warn!("Invalid clinic UTC offset {}h, using UTC", utc_offset_hours);
            Utc.fix()
        });
        Self { offset }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.clinic_utc_offset_hours)
    }

    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.offset).date_naive()
    }

    /// Absolute start instant of `time_slot` on `date`.
    pub fn slot_starts_at(&self, date: NaiveDate, time_slot: &str) -> Option<DateTime<Utc>> {
        let start = slot_start(time_slot)?;
        self.offset
            .from_local_datetime(&date.and_time(start))
            .single()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SlotAvailability {
    pub slot_time: String,
    pub display_name: String,
    pub max_appointments: u32,
    pub booked_count: u32,
    pub available_slots: u32,
    pub is_available: bool,
}

pub struct SlotAvailabilityService {
    store: Arc<dyn AppointmentStore>,
    max_per_slot: u32,
}

impl SlotAvailabilityService {
    pub fn new(store: Arc<dyn AppointmentStore>, max_per_slot: u32) -> Self {
        Self { store, max_per_slot }
    }

    /// Remaining capacity of every catalog slot for `date`. One store read.
    pub async fn availability(
        &self,
        date: NaiveDate,
        kind: AppointmentKind,
    ) -> Result<Vec<SlotAvailability>, AppointmentError> {
        debug!("Computing {} availability for {}", kind, date);

        let counts = self.store.active_counts_by_slot(kind, date).await?;

        Ok(SLOT_CATALOG
            .iter()
            .map(|slot| {
                let booked = counts.get(slot.slot_time).copied().unwrap_or(0);
                let available = self.max_per_slot.saturating_sub(booked);
                SlotAvailability {
                    slot_time: slot.slot_time.to_string(),
                    display_name: slot.display_name.to_string(),
                    max_appointments: self.max_per_slot,
                    booked_count: booked,
                    available_slots: available,
                    is_available: available > 0,
                }
            })
            .collect())
    }
}
