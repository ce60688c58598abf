use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use futures::future::join_all;

use appointment_cell::models::{AppointmentError, AppointmentKind, BookAppointmentRequest};
use appointment_cell::services::booking::AppointmentBookingService;
use appointment_cell::services::slots::SlotAvailabilityService;
use appointment_cell::store::{AppointmentStore, MemoryAppointmentStore};
use shared_config::AppConfig;
use shared_utils::test_utils::TestUser;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 6, 1, 1, 0, 0).unwrap()
}

fn blood_request(date: &str, slot: &str) -> BookAppointmentRequest {
    BookAppointmentRequest {
        appointment_date: Some(date.to_string()),
        time_slot: Some(slot.to_string()),
        services: Some(vec!["1".to_string(), "4".to_string()]),
        total_price: Some(350.0),
        ..Default::default()
    }
}

fn setup() -> (Arc<MemoryAppointmentStore>, Arc<AppointmentBookingService>) {
    let store = Arc::new(MemoryAppointmentStore::new());
    let service = AppointmentBookingService::new(&AppConfig::default(), store.clone());
    (store, Arc::new(service))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_bookings_never_exceed_capacity() {
    let (store, service) = setup();

    let attempts = (0..10).map(|i| {
        let service = service.clone();
        tokio::spawn(async move {
            let patient = TestUser::patient(&format!("p{}@example.com", i)).to_user();
            service
                .book_appointment(
                    &patient,
                    AppointmentKind::Blood,
                    blood_request("2030-06-10", "13:00-14:00"),
                    now(),
                )
                .await
        })
    });

    let results: Vec<_> = join_all(attempts).await.into_iter().map(|r| r.unwrap()).collect();

    let successes = results.iter().filter(|r| r.is_ok()).count();
    let full = results
        .iter()
        .filter(|r| matches!(r, Err(AppointmentError::SlotFull)))
        .count();

    assert_eq!(successes, 3);
    assert_eq!(full, 7);
    assert_eq!(store.len(AppointmentKind::Blood).await, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn two_sequential_then_two_concurrent_leaves_one_winner() {
    let (store, service) = setup();
    let date = "2030-06-12";
    let slot = "10:00-11:00";

    for i in 0..2 {
        let patient = TestUser::patient(&format!("seq{}@example.com", i)).to_user();
        service
            .book_appointment(&patient, AppointmentKind::Blood, blood_request(date, slot), now())
            .await
            .unwrap();
    }

    let racers = (0..2).map(|i| {
        let service = service.clone();
        tokio::spawn(async move {
            let patient = TestUser::patient(&format!("race{}@example.com", i)).to_user();
            service
                .book_appointment(
                    &patient,
                    AppointmentKind::Blood,
                    blood_request(date, slot),
                    now(),
                )
                .await
        })
    });
    let results: Vec<_> = join_all(racers).await.into_iter().map(|r| r.unwrap()).collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        results.iter().filter(|r| matches!(r, Err(AppointmentError::SlotFull))).count(),
        1
    );

    let counts = store
        .active_counts_by_slot(
            AppointmentKind::Blood,
            NaiveDate::from_ymd_opt(2030, 6, 12).unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(counts.get(slot).copied(), Some(3));
}

#[tokio::test]
async fn availability_sums_to_active_rows() {
    let (store, service) = setup();
    let slots = ["09:00-10:00", "09:00-10:00", "15:00-16:00", "16:00-17:00", "16:00-17:00"];

    for (i, slot) in slots.iter().enumerate() {
        let patient = TestUser::patient(&format!("sum{}@example.com", i)).to_user();
        service
            .book_appointment(
                &patient,
                AppointmentKind::Blood,
                blood_request("2030-06-15", slot),
                now(),
            )
            .await
            .unwrap();
    }

    let availability = SlotAvailabilityService::new(store.clone(), 3)
        .availability(NaiveDate::from_ymd_opt(2030, 6, 15).unwrap(), AppointmentKind::Blood)
        .await
        .unwrap();

    let total: u32 = availability.iter().map(|s| s.booked_count).sum();
    assert_eq!(total as usize, store.len(AppointmentKind::Blood).await);
    assert!(availability.iter().all(|s| s.booked_count + s.available_slots == 3));
}

#[tokio::test]
async fn kinds_do_not_share_capacity() {
    let (_, service) = setup();

    for i in 0..3 {
        let patient = TestUser::patient(&format!("k{}@example.com", i)).to_user();
        service
            .book_appointment(
                &patient,
                AppointmentKind::Blood,
                blood_request("2030-06-20", "11:00-12:00"),
                now(),
            )
            .await
            .unwrap();
    }

    let patient = TestUser::patient("physical@example.com").to_user();
    let physical = BookAppointmentRequest {
        service_id: Some(2),
        ..blood_request("2030-06-20", "11:00-12:00")
    };
    let result = service
        .book_appointment(&patient, AppointmentKind::Physical, physical, now())
        .await;

    assert_matches!(result, Ok(confirmation) => {
        assert_eq!(confirmation.booking_code, "00001");
    });
}
