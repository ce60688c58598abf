use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use serde_json::json;

use shared_config::{AppConfig, DataBackend};
use shared_models::auth::{User, UserRole};

use crate::jwt::issue_token;

static NEXT_TEST_USER_ID: AtomicI64 = AtomicI64::new(1000);

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_service_key: String,
    pub data_backend: DataBackend,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_service_key: "test-service-key".to_string(),
            data_backend: DataBackend::Memory,
        }
    }
}

impl TestConfig {
    pub fn with_supabase(url: &str) -> Self {
        Self {
            supabase_url: url.to_string(),
            data_backend: DataBackend::Supabase,
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_service_key: self.supabase_service_key.clone(),
            jwt_secret: self.jwt_secret.clone(),
            data_backend: self.data_backend,
            ..AppConfig::default()
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: i64,
    pub email: String,
    pub role: UserRole,
    pub doctor_id: Option<i64>,
}

impl TestUser {
    pub fn new(email: &str, role: UserRole) -> Self {
        Self {
            id: NEXT_TEST_USER_ID.fetch_add(1, Ordering::SeqCst),
            email: email.to_string(),
            role,
            doctor_id: None,
        }
    }

    pub fn doctor(email: &str, doctor_id: i64) -> Self {
        Self {
            doctor_id: Some(doctor_id),
            ..Self::new(email, UserRole::Doctor)
        }
    }

    pub fn patient(email: &str) -> Self {
        Self::new(email, UserRole::Patient)
    }

    pub fn admin(email: &str) -> Self {
        Self::new(email, UserRole::Admin)
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id,
            email: Some(self.email.clone()),
            role: self.role,
            doctor_id: self.doctor_id,
            created_at: None,
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        issue_token(&user.to_user(), secret, exp_hours.unwrap_or(24))
            .expect("test secret must not be empty")
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "wrong-secret", Some(24))
    }

    pub fn bearer(user: &TestUser, config: &AppConfig) -> String {
        format!("Bearer {}", Self::create_test_token(user, &config.jwt_secret, Some(24)))
    }
}

pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn physical_appointment_row(
        id: i64,
        user_id: i64,
        date: &str,
        slot: &str,
        status: &str,
    ) -> serde_json::Value {
        json!({
            "id": id,
            "user_id": user_id,
            "doctor_id": null,
            "service_id": 1,
            "appointment_date": date,
            "time_slot": slot,
            "status": status,
            "total_price": 1500.0,
            "problem": null,
            "result_file": null,
            "result_uploaded_at": null,
            "rescheduled_at": null,
            "created_at": "2024-01-01T00:00:00+00:00",
            "updated_at": "2024-01-01T00:00:00+00:00",
            "personal_info": {
                "title": "นาย",
                "first_name": "สมชาย",
                "last_name": "ใจดี",
                "email": "patient@example.com",
                "phone": "0800000000"
            },
            "services": { "name": "ตรวจสุขภาพทั่วไป" }
        })
    }

    pub fn blood_appointment_row(
        id: i64,
        user_id: i64,
        date: &str,
        slot: &str,
        status: &str,
    ) -> serde_json::Value {
        json!({
            "id": id,
            "user_id": user_id,
            "doctor_id": null,
            "services": ["1", "4"],
            "appointment_date": date,
            "time_slot": slot,
            "status": status,
            "total_price": 0,
            "problem": "อ่อนเพลีย",
            "result_file": null,
            "result_uploaded_at": null,
            "rescheduled_at": null,
            "created_at": "2024-01-02T00:00:00+00:00",
            "updated_at": "2024-01-02T00:00:00+00:00",
            "personal_info": {
                "title": "นาง",
                "first_name": "สมศรี",
                "last_name": "ใจงาม",
                "email": "blood@example.com",
                "phone": "0811111111"
            }
        })
    }

    pub fn account_row(id: i64, email: &str, password_hash: &str, role: &str) -> serde_json::Value {
        json!({
            "id": id,
            "email": email,
            "password": password_hash,
            "role": role,
            "created_at": "2024-01-01T00:00:00+00:00",
            "doctors": []
        })
    }

    pub fn error_response(message: &str, code: &str) -> serde_json::Value {
        json!({
            "message": message,
            "code": code
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwt::validate_token;

    #[test]
    fn test_config_creation() {
        let config = TestConfig::default();
        let app_config = config.to_app_config();

        assert_eq!(app_config.supabase_url, "http://localhost:54321");
        assert_eq!(app_config.data_backend, DataBackend::Memory);
        assert_eq!(app_config.max_appointments_per_slot, 3);
        assert!(!app_config.jwt_secret.is_empty());
    }

    #[test]
    fn test_user_ids_are_unique() {
        let a = TestUser::patient("a@example.com");
        let b = TestUser::patient("b@example.com");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_jwt_token_roundtrip() {
        let user = TestUser::doctor("doc@example.com", 7);
        let token = JwtTestUtils::create_test_token(&user, "test-secret", Some(1));

        let decoded = validate_token(&token, "test-secret").unwrap();
        assert_eq!(decoded.id, user.id);
        assert_eq!(decoded.doctor_id, Some(7));
    }
}
