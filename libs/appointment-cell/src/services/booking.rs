// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info, warn};

use shared_config::AppConfig;
use shared_models::auth::User;

use crate::models::{
    AppointmentDetails, AppointmentError, AppointmentKind, AppointmentStatus,
    BookAppointmentRequest, BookingConfirmation, NewAppointment,
};
use crate::services::slots::{find_slot, parse_date, ClinicCalendar};
use crate::store::{AppointmentStore, SlotBooking};

pub struct AppointmentBookingService {
    store: Arc<dyn AppointmentStore>,
    max_per_slot: u32,
    calendar: ClinicCalendar,
}

impl AppointmentBookingService {
    pub fn new(config: &AppConfig, store: Arc<dyn AppointmentStore>) -> Self {
        Self {
            store,
            max_per_slot: config.max_appointments_per_slot,
            calendar: ClinicCalendar::from_config(config),
        }
    }

    /// Books a slot for `patient`. Capacity check and insert happen in one
    /// store call, so concurrent requests cannot overfill a slot.
    pub async fn book_appointment(
        &self,
        patient: &User,
        kind: AppointmentKind,
        request: BookAppointmentRequest,
        now: DateTime<Utc>,
    ) -> Result<BookingConfirmation, AppointmentError> {
        info!("Booking {} appointment for patient {}", kind, patient.id);

        if !patient.is_patient() {
            return Err(AppointmentError::Unauthorized);
        }

        let new = self.validate_booking_request(patient, kind, request, now)?;
        let date = new.appointment_date;
        let slot = new.time_slot.clone();

        match self.store.book_slot(new, self.max_per_slot).await? {
            SlotBooking::Booked(appointment) => {
                info!(
                    "Appointment {} booked for patient {} at {} {}",
                    appointment.id, patient.id, date, slot
                );
                Ok(BookingConfirmation {
                    appointment_id: appointment.id,
                    booking_code: appointment.booking_code(),
                    appointment_type: kind,
                    appointment_date: appointment.appointment_date,
                    time_slot: appointment.time_slot,
                    status: AppointmentStatus::Booked,
                })
            }
            SlotBooking::SlotFull => {
                warn!("Slot {} on {} is full for {} bookings", slot, date, kind);
                Err(AppointmentError::SlotFull)
            }
        }
    }

    fn validate_booking_request(
        &self,
        patient: &User,
        kind: AppointmentKind,
        request: BookAppointmentRequest,
        now: DateTime<Utc>,
    ) -> Result<NewAppointment, AppointmentError> {
        debug!("Validating booking request: {:?}", request);

        let (Some(date), Some(time_slot)) = (request.appointment_date, request.time_slot) else {
            return Err(AppointmentError::ValidationError(
                "กรุณากรอกข้อมูลให้ครบถ้วน".to_string(),
            ));
        };

        let appointment_date: NaiveDate = parse_date(&date, false)?;
        if appointment_date < self.calendar.today(now) {
            return Err(AppointmentError::ValidationError(
                "ไม่สามารถจองวันที่ผ่านมาแล้วได้".to_string(),
            ));
        }

        if find_slot(&time_slot).is_none() {
            return Err(AppointmentError::InvalidTimeSlot(time_slot));
        }

        if let Some(price) = request.total_price {
            if !price.is_finite() || price < 0.0 {
                return Err(AppointmentError::ValidationError("ราคาไม่ถูกต้อง".to_string()));
            }
        }

        let details = match kind {
            AppointmentKind::Physical => {
                let service_id = request.service_id.ok_or_else(|| {
                    AppointmentError::ValidationError("กรุณาเลือกบริการ".to_string())
                })?;
                AppointmentDetails::Physical { service_id: Some(service_id), service_name: None }
            }
            AppointmentKind::Blood => {
                let services: Vec<String> = request
                    .services
                    .unwrap_or_default()
                    .into_iter()
                    .filter(|s| !s.trim().is_empty())
                    .collect();
                if services.is_empty() {
                    return Err(AppointmentError::ValidationError(
                        "กรุณาเลือกรายการตรวจอย่างน้อย 1 รายการ".to_string(),
                    ));
                }
                AppointmentDetails::Blood { services }
            }
        };

        Ok(NewAppointment {
            user_id: patient.id,
            appointment_date,
            time_slot,
            total_price: request.total_price,
            problem: request.problem.filter(|p| !p.trim().is_empty()),
            details,
        })
    }
}
