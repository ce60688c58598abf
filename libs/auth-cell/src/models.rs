use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use shared_models::auth::{User, UserRole};
use shared_models::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RegisterRequest {
    pub title: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub permanent_address: Option<String>,
    pub current_address: Option<String>,
    pub use_permanent_as_current: Option<bool>,
    pub birth_date: Option<String>,
    pub phone: Option<String>,
    pub congenital_disease: Option<String>,
    pub drug_allergy: Option<String>,
    pub newsletter: Option<bool>,
    pub medical_data_consent: Option<bool>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Contact and intake details captured at registration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersonalInfo {
    pub title: String,
    pub first_name: String,
    pub last_name: String,
    pub permanent_address: String,
    pub current_address: Option<String>,
    pub use_permanent_as_current: bool,
    pub birth_date: NaiveDate,
    pub phone: String,
    pub email: String,
    pub congenital_disease: Option<String>,
    pub drug_allergy: Option<String>,
    pub newsletter: bool,
    pub medical_data_consent: bool,
}

/// Stored account, including the password hash. Never serialized to clients.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub role: UserRole,
    pub doctor_id: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Account {
    pub fn to_user(&self) -> User {
        User {
            id: self.id,
            email: Some(self.email.clone()),
            role: self.role,
            doctor_id: self.doctor_id,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub password_hash: String,
    pub role: UserRole,
    pub personal_info: Option<PersonalInfo>,
    /// Creates a linked doctor profile in the same write.
    pub with_doctor_profile: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub id: i64,
    pub email: String,
    pub role: UserRole,
    pub doctor_id: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
    pub personal_info: Option<PersonalInfo>,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Email already registered")]
    DuplicateEmail,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Account not found")]
    NotFound,

    #[error("Password hashing failed: {0}")]
    HashingError(String),

    #[error("Token error: {0}")]
    TokenError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<AuthError> for AppError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::InvalidCredentials => {
                AppError::BadRequest("อีเมลหรือรหัสผ่านไม่ถูกต้อง".to_string())
            }
            AuthError::DuplicateEmail => AppError::BadRequest("อีเมลนี้ถูกใช้งานแล้ว".to_string()),
            AuthError::ValidationError(msg) => AppError::ValidationError(msg),
            AuthError::NotFound => AppError::NotFound("ไม่พบข้อมูลผู้ใช้".to_string()),
            AuthError::HashingError(detail) | AuthError::TokenError(detail) => {
                AppError::Internal(detail)
            }
            AuthError::DatabaseError(detail) => AppError::Database(detail),
        }
    }
}
