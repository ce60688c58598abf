use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::NaiveDate;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use appointment_cell::models::{AppointmentDetails, AppointmentKind, NewAppointment};
use appointment_cell::services::lifecycle::AppointmentLifecycleService;
use appointment_cell::store::{AppointmentStore, MemoryAppointmentStore, SlotBooking};
use lab_cell::{lab_routes, DiskFileStorage, LabState, MemoryLabCatalogStore};
use shared_config::AppConfig;
use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};

struct Harness {
    config: Arc<AppConfig>,
    appointments: Arc<MemoryAppointmentStore>,
    app: Router,
    _uploads: TempDir,
}

fn harness() -> Harness {
    harness_with_upload_limit(64)
}

fn harness_with_upload_limit(max_upload_bytes: usize) -> Harness {
    let uploads = tempfile::tempdir().unwrap();
    let config = Arc::new(AppConfig {
        upload_dir: uploads.path().display().to_string(),
        max_upload_bytes,
        ..TestConfig::default().to_app_config()
    });
    let appointments = Arc::new(MemoryAppointmentStore::new());

    let state = LabState {
        config: config.clone(),
        catalog: Arc::new(MemoryLabCatalogStore::new()),
        appointments: appointments.clone(),
        storage: Arc::new(DiskFileStorage::new(uploads.path())),
    };

    Harness { config, appointments, app: lab_routes(state), _uploads: uploads }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

fn request(method: &str, uri: &str, auth: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Authorization", auth)
        .header("Content-Type", "application/json");
    match body {
        Some(body) => builder.body(Body::from(body.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn upload_body(file_name: &str, content_type: &str, bytes: &[u8]) -> Value {
    json!({
        "file_name": file_name,
        "content_type": content_type,
        "data_base64": STANDARD.encode(bytes)
    })
}

/// Books a blood appointment for `patient` and moves it to confirmed.
async fn confirmed_blood_appointment(h: &Harness, patient: &TestUser) -> i64 {
    let new = NewAppointment {
        user_id: patient.id,
        appointment_date: NaiveDate::from_ymd_opt(2030, 2, 1).unwrap(),
        time_slot: "09:00-10:00".to_string(),
        total_price: Some(450.0),
        problem: None,
        details: AppointmentDetails::Blood { services: vec!["1".to_string()] },
    };
    let appointment = match h.appointments.book_slot(new, 3).await.unwrap() {
        SlotBooking::Booked(appointment) => appointment,
        SlotBooking::SlotFull => panic!("slot unexpectedly full"),
    };

    let admin = TestUser::admin("admin@upam.com").to_user();
    AppointmentLifecycleService::new(&h.config, h.appointments.clone())
        .confirm_appointment(&admin, AppointmentKind::Blood, appointment.id, None)
        .await
        .unwrap();
    appointment.id
}

#[tokio::test]
async fn catalog_reads_need_session_and_writes_need_admin() {
    let h = harness();
    let admin = JwtTestUtils::bearer(&TestUser::admin("admin@upam.com"), &h.config);
    let patient = JwtTestUtils::bearer(&TestUser::patient("p@example.com"), &h.config);

    let unauthenticated = Request::builder().uri("/lab/categories").body(Body::empty()).unwrap();
    let (status, _) = send(&h.app, unauthenticated).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &h.app,
        request("POST", "/lab/categories", &patient, Some(json!({ "name": "CBC" }))),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &h.app,
        request("POST", "/lab/categories", &admin, Some(json!({ "name": "โลหิตวิทยา" }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let category_id = body["category"]["id"].as_i64().unwrap();

    let (status, body) = send(
        &h.app,
        request(
            "POST",
            "/lab/tests",
            &admin,
            Some(json!({
                "name": "Hemoglobin",
                "category_id": category_id,
                "normal_min": 12.0,
                "normal_max": 16.0,
                "unit": "g/dL"
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let test_id = body["test"]["id"].as_i64().unwrap();

    let (status, _) = send(
        &h.app,
        request(
            "POST",
            "/lab/ranges",
            &admin,
            Some(json!({
                "test_id": test_id,
                "normal_min": 13.0,
                "normal_max": 17.0,
                "unit": "g/dL"
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&h.app, request("GET", "/lab/tests", &patient, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tests"][0]["category_name"], "โลหิตวิทยา");

    let ranges_uri = format!("/lab/ranges/{}", test_id);
    let (_, body) = send(&h.app, request("GET", &ranges_uri, &patient, None)).await;
    assert_eq!(body["ranges"].as_array().unwrap().len(), 1);

    let (status, _) = send(
        &h.app,
        request("DELETE", &format!("/lab/categories/{}", category_id), &admin, None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn doctor_records_flagged_results_and_patient_reads_them() {
    let h = harness();
    let patient = TestUser::patient("results@example.com");
    let doctor = JwtTestUtils::bearer(&TestUser::doctor("doc@upam.com", 5), &h.config);
    let patient_auth = JwtTestUtils::bearer(&patient, &h.config);
    let id = confirmed_blood_appointment(&h, &patient).await;
    let uri = format!("/appointments/blood/{}/results", id);

    let (status, _) = send(
        &h.app,
        request("POST", &uri, &patient_auth, Some(json!({ "results": [] }))),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &h.app,
        request(
            "POST",
            &uri,
            &doctor,
            Some(json!({
                "results": [
                    {
                        "test_name": "Hemoglobin",
                        "result": 10.5,
                        "unit": "g/dL",
                        "reference_min": 12.0,
                        "reference_max": 16.0
                    },
                    {
                        "test_name": "Glucose",
                        "result": 140.0,
                        "unit": "mg/dL",
                        "reference_min": 70.0,
                        "reference_max": 100.0
                    },
                    {
                        "test_name": "Platelets",
                        "result": 250.0,
                        "reference_min": 150.0,
                        "reference_max": 400.0
                    }
                ]
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["appointment"]["status"], "completed");

    let (status, body) = send(&h.app, request("GET", &uri, &patient_auth, None)).await;
    assert_eq!(status, StatusCode::OK);
    let rows = body["results"]["rows"].as_array().unwrap();
    let flags: Vec<&str> = rows.iter().map(|r| r["status"].as_str().unwrap()).collect();
    assert_eq!(flags, vec!["low", "high", "normal"]);
    assert_eq!(body["results"]["status"], "completed");

    let stranger = JwtTestUtils::bearer(&TestUser::patient("other@example.com"), &h.config);
    let (status, _) = send(&h.app, request("GET", &uri, &stranger, None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn result_file_upload_validation_and_download() {
    let h = harness();
    let patient = TestUser::patient("file@example.com");
    let admin = JwtTestUtils::bearer(&TestUser::admin("admin@upam.com"), &h.config);
    let id = confirmed_blood_appointment(&h, &patient).await;
    let uri = format!("/appointments/blood/{}/result-file", id);

    let (status, body) = send(
        &h.app,
        request(
            "POST",
            &uri,
            &admin,
            Some(upload_body("run.exe", "application/x-msdownload", b"MZ")),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "ประเภทไฟล์ไม่ถูกต้อง");

    let (status, _) = send(
        &h.app,
        request(
            "POST",
            &uri,
            &admin,
            Some(upload_body("big.pdf", "application/pdf", &[0u8; 65])),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &h.app,
        request(
            "POST",
            &uri,
            &admin,
            Some(upload_body("blood report.pdf", "application/pdf", b"%PDF-1.4 ok")),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["file"].as_str().unwrap().ends_with("_blood_report.pdf"));

    let response = h
        .app
        .clone()
        .oneshot(request("GET", &uri, &JwtTestUtils::bearer(&patient, &h.config), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"%PDF-1.4 ok");
}

#[tokio::test]
async fn download_without_file_is_not_found() {
    let h = harness();
    let patient = TestUser::patient("nofile@example.com");
    let id = confirmed_blood_appointment(&h, &patient).await;

    let (status, body) = send(
        &h.app,
        request(
            "GET",
            &format!("/appointments/blood/{}/result-file", id),
            &JwtTestUtils::bearer(&patient, &h.config),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "ไม่พบไฟล์ผลตรวจ");
}

#[tokio::test]
async fn default_upload_limit_accepts_multi_megabyte_files() {
    let h = harness_with_upload_limit(AppConfig::default().max_upload_bytes);
    let max = h.config.max_upload_bytes;
    let patient = TestUser::patient("scan@example.com");
    let admin = JwtTestUtils::bearer(&TestUser::admin("admin@upam.com"), &h.config);
    let id = confirmed_blood_appointment(&h, &patient).await;
    let uri = format!("/appointments/blood/{}/result-file", id);

    // Just over the limit: the body fits, the size check answers.
    let just_over = vec![0u8; max + 1];
    let (status, body) = send(
        &h.app,
        request("POST", &uri, &admin, Some(upload_body("over.pdf", "application/pdf", &just_over))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "ไฟล์มีขนาดใหญ่เกินกำหนด (สูงสุด 10MB)");

    // Far over the limit: the body itself is refused, still inside the envelope.
    let far_over = vec![0u8; max * 2];
    let (status, body) = send(
        &h.app,
        request("POST", &uri, &admin, Some(upload_body("huge.pdf", "application/pdf", &far_over))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "ไฟล์มีขนาดใหญ่เกินกำหนด (สูงสุด 10MB)");

    let scan = vec![b'%'; 3 * 1024 * 1024];
    let (status, body) = send(
        &h.app,
        request("POST", &uri, &admin, Some(upload_body("scan.pdf", "application/pdf", &scan))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["file"].as_str().unwrap().ends_with("_scan.pdf"));

    let response = h
        .app
        .clone()
        .oneshot(request("GET", &uri, &JwtTestUtils::bearer(&patient, &h.config), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(bytes.len(), scan.len());
}
