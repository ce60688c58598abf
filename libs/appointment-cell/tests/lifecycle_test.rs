use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use appointment_cell::models::{
    Appointment, AppointmentDetails, AppointmentError, AppointmentKind, AppointmentStatus,
    LabResultRow, NewAppointment, ResultArtifact, ResultFlag,
};
use appointment_cell::services::lifecycle::AppointmentLifecycleService;
use appointment_cell::store::{AppointmentStore, MemoryAppointmentStore, SlotBooking};
use shared_config::AppConfig;
use shared_models::auth::User;
use shared_utils::test_utils::TestUser;

const PHYSICAL: AppointmentKind = AppointmentKind::Physical;

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 1, day).unwrap()
}

/// 10:00 clinic time on 2030-01-10 is 03:00 UTC.
fn ninety_minutes_before_ten() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 1, 10, 1, 30, 0).unwrap()
}

fn setup() -> (Arc<MemoryAppointmentStore>, AppointmentLifecycleService) {
    let store = Arc::new(MemoryAppointmentStore::new());
    let service = AppointmentLifecycleService::new(&AppConfig::default(), store.clone());
    (store, service)
}

async fn book(store: &MemoryAppointmentStore, user: &User, day: u32, slot: &str) -> Appointment {
    let new = NewAppointment {
        user_id: user.id,
        appointment_date: date(day),
        time_slot: slot.to_string(),
        total_price: Some(1500.0),
        problem: None,
        details: AppointmentDetails::Physical { service_id: Some(1), service_name: None },
    };
    match store.book_slot(new, 3).await.unwrap() {
        SlotBooking::Booked(appointment) => appointment,
        SlotBooking::SlotFull => panic!("slot unexpectedly full"),
    }
}

/// Stores a copy of `template` under a fresh id with a raw status value.
async fn seed_with_status(
    store: &MemoryAppointmentStore,
    template: &Appointment,
    user: &User,
    status: &str,
) -> Appointment {
    store
        .seed(Appointment {
            user_id: user.id,
            status: status.to_string(),
            ..template.clone()
        })
        .await
}

#[tokio::test]
async fn patient_cannot_cancel_inside_cutoff_but_admin_can() {
    let (store, service) = setup();
    let patient = TestUser::patient("cutoff@example.com").to_user();
    let admin = TestUser::admin("admin@upam.com").to_user();
    let appointment = book(&store, &patient, 10, "10:00-11:00").await;
    let now = ninety_minutes_before_ten();

    let result = service
        .cancel_appointment(&patient, PHYSICAL, appointment.id, "ติดธุระ", now)
        .await;
    assert_matches!(result, Err(AppointmentError::CancellationCutoff));

    let cancelled = service
        .cancel_appointment(&admin, PHYSICAL, appointment.id, "ผู้ป่วยโทรแจ้ง", now)
        .await
        .unwrap();
    assert_eq!(cancelled.status, "ยกเลิกแล้ว");
}

#[tokio::test]
async fn patient_can_cancel_past_or_distant_appointments() {
    let (store, service) = setup();
    let patient = TestUser::patient("distant@example.com").to_user();
    let distant = book(&store, &patient, 10, "16:00-17:00").await;
    let past = book(&store, &patient, 10, "09:00-10:00").await;
    // 09:30 clinic time: the 09:00 slot already started.
    let now = Utc.with_ymd_and_hms(2030, 1, 10, 2, 30, 0).unwrap();

    service
        .cancel_appointment(&patient, PHYSICAL, distant.id, "ไม่สะดวก", now)
        .await
        .unwrap();
    service
        .cancel_appointment(&patient, PHYSICAL, past.id, "ไม่สะดวก", now)
        .await
        .unwrap();
}

#[tokio::test]
async fn second_cancel_is_not_cancellable() {
    let (store, service) = setup();
    let patient = TestUser::patient("twice@example.com").to_user();
    let appointment = book(&store, &patient, 20, "13:00-14:00").await;
    let now = ninety_minutes_before_ten();

    service
        .cancel_appointment(&patient, PHYSICAL, appointment.id, "เปลี่ยนใจ", now)
        .await
        .unwrap();
    let again = service
        .cancel_appointment(&patient, PHYSICAL, appointment.id, "เปลี่ยนใจ", now)
        .await;
    assert_matches!(again, Err(AppointmentError::NotCancellable));
}

#[tokio::test]
async fn patient_cannot_cancel_someone_elses_appointment() {
    let (store, service) = setup();
    let owner = TestUser::patient("owner@example.com").to_user();
    let other = TestUser::patient("other@example.com").to_user();
    let appointment = book(&store, &owner, 20, "13:00-14:00").await;
    let now = ninety_minutes_before_ten();

    let result = service
        .cancel_appointment(&other, PHYSICAL, appointment.id, "x", now)
        .await;
    assert_matches!(result, Err(AppointmentError::NotCancellable));

    let missing_reason = service
        .cancel_appointment(&owner, PHYSICAL, appointment.id, "  ", now)
        .await;
    assert_matches!(missing_reason, Err(AppointmentError::ValidationError(_)));
}

#[tokio::test]
async fn legacy_english_confirmed_rows_are_cancellable() {
    let (store, service) = setup();
    let admin = TestUser::admin("admin@upam.com").to_user();
    let patient = TestUser::patient("legacy@example.com").to_user();
    let template = book(&store, &patient, 25, "11:00-12:00").await;
    let now = ninety_minutes_before_ten();

    let by_admin = seed_with_status(&store, &template, &patient, "confirmed").await;
    let cancelled = service
        .cancel_appointment(&admin, PHYSICAL, by_admin.id, "คลินิกปิด", now)
        .await
        .unwrap();
    assert_eq!(cancelled.status, "ยกเลิกแล้ว");

    let by_patient = seed_with_status(&store, &template, &patient, "confirmed").await;
    let cancelled = service
        .cancel_appointment(&patient, PHYSICAL, by_patient.id, "ติดธุระ", now)
        .await
        .unwrap();
    assert_eq!(cancelled.status, "ยกเลิกแล้ว");

    let stored = store.get(PHYSICAL, by_patient.id).await.unwrap().unwrap();
    assert_eq!(stored.status, "ยกเลิกแล้ว");
}

#[tokio::test]
async fn confirming_legacy_rescheduled_row_respects_capacity() {
    let (store, service) = setup();
    let admin = TestUser::admin("admin@upam.com").to_user();
    let first = TestUser::patient("first@example.com").to_user();
    let template = book(&store, &first, 12, "09:00-10:00").await;

    let moved_label = AppointmentStatus::Rescheduled.label();
    let legacy = seed_with_status(&store, &template, &first, moved_label).await;
    for i in 0..2 {
        let patient = TestUser::patient(&format!("slot{}@example.com", i)).to_user();
        book(&store, &patient, 12, "09:00-10:00").await;
    }

    let result = service
        .confirm_appointment(&admin, PHYSICAL, legacy.id, Some(2))
        .await;
    assert_matches!(result, Err(AppointmentError::SlotFull));

    let counts = store.active_counts_by_slot(PHYSICAL, date(12)).await.unwrap();
    assert_eq!(counts.get("09:00-10:00"), Some(&3));
    let unchanged = store.get(PHYSICAL, legacy.id).await.unwrap().unwrap();
    assert_eq!(unchanged.status, moved_label);

    // With room in the slot the legacy row can still be confirmed.
    let elsewhere = book(&store, &first, 12, "10:00-11:00").await;
    let roomy = seed_with_status(&store, &elsewhere, &first, moved_label).await;
    let confirmed = service
        .confirm_appointment(&admin, PHYSICAL, roomy.id, Some(2))
        .await
        .unwrap();
    assert_eq!(confirmed.status, "ยืนยันแล้ว");
    assert_eq!(confirmed.doctor_id, Some(2));
}

#[tokio::test]
async fn confirming_a_finished_row_reports_the_transition() {
    let (store, service) = setup();
    let admin = TestUser::admin("admin@upam.com").to_user();
    let patient = TestUser::patient("done@example.com").to_user();
    let appointment = book(&store, &patient, 14, "15:00-16:00").await;

    service
        .cancel_appointment(&admin, PHYSICAL, appointment.id, "ผู้ป่วยแจ้ง", Utc::now())
        .await
        .unwrap();

    let result = service
        .confirm_appointment(&admin, PHYSICAL, appointment.id, None)
        .await;
    assert_matches!(
        result,
        Err(AppointmentError::InvalidStatusTransition { from, to })
            if from == "cancelled" && to == "confirmed"
    );

    let missing = service.confirm_appointment(&admin, PHYSICAL, 9999, None).await;
    assert_matches!(missing, Err(AppointmentError::NotFound));
}

#[tokio::test]
async fn reschedule_into_full_slot_keeps_original() {
    let (store, service) = setup();
    let admin = TestUser::admin("admin@upam.com").to_user();
    let now = ninety_minutes_before_ten();

    for i in 0..3 {
        let patient = TestUser::patient(&format!("full{}@example.com", i)).to_user();
        book(&store, &patient, 15, "14:00-15:00").await;
    }
    let patient = TestUser::patient("mover@example.com").to_user();
    let appointment = book(&store, &patient, 15, "09:00-10:00").await;

    let result = service
        .reschedule_appointment(&admin, PHYSICAL, appointment.id, "2030-01-15", "14:00-15:00", now)
        .await;
    assert_matches!(result, Err(AppointmentError::SlotFull));

    let unchanged = store.get(PHYSICAL, appointment.id).await.unwrap().unwrap();
    assert_eq!(unchanged.time_slot, "09:00-10:00");
    assert_eq!(unchanged.appointment_date, date(15));
    assert!(unchanged.rescheduled_at.is_none());
}

#[tokio::test]
async fn reschedule_moves_row_and_resets_to_booked() {
    let (store, service) = setup();
    let admin = TestUser::admin("admin@upam.com").to_user();
    let doctor = TestUser::doctor("doc@upam.com", 3).to_user();
    let patient = TestUser::patient("moved@example.com").to_user();
    let appointment = book(&store, &patient, 15, "09:00-10:00").await;
    let now = ninety_minutes_before_ten();

    service
        .confirm_appointment(&doctor, PHYSICAL, appointment.id, None)
        .await
        .unwrap();

    let moved = service
        .reschedule_appointment(&admin, PHYSICAL, appointment.id, "16/01/2030", "11:00-12:00", now)
        .await
        .unwrap();

    assert_eq!(moved.appointment_date, date(16));
    assert_eq!(moved.time_slot, "11:00-12:00");
    assert_eq!(moved.status, "จองแล้ว");
    assert!(moved.rescheduled_at.is_some());
    assert_eq!(moved.doctor_id, Some(3));
}

#[tokio::test]
async fn only_admins_reschedule() {
    let (store, service) = setup();
    let patient = TestUser::patient("self@example.com").to_user();
    let appointment = book(&store, &patient, 15, "09:00-10:00").await;
    let now = ninety_minutes_before_ten();

    let result = service
        .reschedule_appointment(
            &patient,
            PHYSICAL,
            appointment.id,
            "2030-01-16",
            "11:00-12:00",
            now,
        )
        .await;
    assert_matches!(result, Err(AppointmentError::Unauthorized));
    assert_matches!(
        service.reschedule_by_patient(&patient),
        Err(AppointmentError::RescheduleNotSupported)
    );
}

#[tokio::test]
async fn confirm_then_complete_with_results() {
    let (store, service) = setup();
    let doctor = TestUser::doctor("doc@upam.com", 8).to_user();
    let patient = TestUser::patient("lab@example.com").to_user();
    let appointment = book(&store, &patient, 18, "13:00-14:00").await;

    let early = service
        .complete_appointment(&doctor, PHYSICAL, appointment.id, None)
        .await;
    assert_matches!(early, Err(AppointmentError::InvalidStatusTransition { .. }));

    let confirmed = service
        .confirm_appointment(&doctor, PHYSICAL, appointment.id, None)
        .await
        .unwrap();
    assert_eq!(confirmed.status, "ยืนยันแล้ว");
    assert_eq!(confirmed.doctor_id, Some(8));

    let rows = vec![LabResultRow {
        test_name: "Glucose".to_string(),
        result: 130.0,
        unit: Some("mg/dL".to_string()),
        reference_min: Some(70.0),
        reference_max: Some(100.0),
        status: ResultFlag::evaluate(130.0, Some(70.0), Some(100.0)),
    }];
    let completed = service
        .complete_appointment(&doctor, PHYSICAL, appointment.id, Some(ResultArtifact::Rows(rows)))
        .await
        .unwrap();

    assert_eq!(completed.status, "เสร็จสิ้น");
    let stored = store.results(PHYSICAL, appointment.id).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].status, ResultFlag::High);
}

#[tokio::test]
async fn doctor_cannot_touch_rows_assigned_elsewhere() {
    let (store, service) = setup();
    let admin = TestUser::admin("admin@upam.com").to_user();
    let doctor = TestUser::doctor("doc@upam.com", 8).to_user();
    let patient = TestUser::patient("assigned@example.com").to_user();
    let appointment = book(&store, &patient, 18, "13:00-14:00").await;

    service
        .confirm_appointment(&admin, PHYSICAL, appointment.id, Some(99))
        .await
        .unwrap();

    let result = service
        .complete_appointment(&doctor, PHYSICAL, appointment.id, None)
        .await;
    assert_matches!(result, Err(AppointmentError::Unauthorized));
}

#[tokio::test]
async fn status_codes_map_onto_operations() {
    let (store, service) = setup();
    let admin = TestUser::admin("admin@upam.com").to_user();
    let patient = TestUser::patient("codes@example.com").to_user();
    let appointment = book(&store, &patient, 22, "15:00-16:00").await;
    let id = appointment.id;
    let now = ninety_minutes_before_ten();

    assert_matches!(
        service.apply_status_code(&admin, PHYSICAL, id, "pending", None, now).await,
        Err(AppointmentError::ValidationError(_))
    );

    let confirmed = service
        .apply_status_code(&admin, PHYSICAL, id, "confirmed", Some(4), now)
        .await
        .unwrap();
    assert_eq!(confirmed.doctor_id, Some(4));

    let completed = service
        .apply_status_code(&admin, PHYSICAL, id, "completed", None, now)
        .await
        .unwrap();
    assert_eq!(completed.status, "เสร็จสิ้น");

    assert_matches!(
        service.apply_status_code(&admin, PHYSICAL, id, "cancelled", None, now).await,
        Err(AppointmentError::NotCancellable)
    );
}
