use std::sync::Arc;

use chrono::NaiveDate;
use regex::Regex;
use tracing::{debug, info, warn};

use shared_config::{AppConfig, StaffSeed};
use shared_models::auth::{User, UserRole};
use shared_utils::jwt::issue_token;

use crate::models::{
    Account, AuthError, LoginRequest, NewAccount, PersonalInfo, RegisterRequest, UserProfile,
};
use crate::services::password::PasswordService;
use crate::store::UserStore;

const MISSING_FIELDS: &str = "กรุณากรอกข้อมูลให้ครบถ้วน";
const EMAIL_PATTERN: &str = r"^[^\s@]+@[^\s@]+\.[^\s@]+$";

#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub token: String,
    pub user: User,
    pub redirect: &'static str,
}

/// Landing page the client should open after login.
pub fn redirect_for(role: UserRole) -> &'static str {
    match role {
        UserRole::Admin => "/admin/listadmin",
        UserRole::Doctor | UserRole::Patient => "/home",
    }
}

fn required(value: Option<String>) -> Result<String, AuthError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AuthError::ValidationError(MISSING_FIELDS.to_string()))
}

fn optional(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn validate_email(email: &str) -> Result<(), AuthError> {
    let pattern = Regex::new(EMAIL_PATTERN).map_err(|e| AuthError::ValidationError(e.to_string()))?;
    if pattern.is_match(email) {
        Ok(())
    } else {
        Err(AuthError::ValidationError("รูปแบบอีเมลไม่ถูกต้อง".to_string()))
    }
}

pub struct AccountService {
    config: Arc<AppConfig>,
    store: Arc<dyn UserStore>,
}

impl AccountService {
    pub fn new(config: Arc<AppConfig>, store: Arc<dyn UserStore>) -> Self {
        Self { config, store }
    }

    pub async fn register(&self, request: RegisterRequest) -> Result<Account, AuthError> {
        let title = required(request.title)?;
        let first_name = required(request.first_name)?;
        let last_name = required(request.last_name)?;
        let permanent_address = required(request.permanent_address)?;
        let birth_date = required(request.birth_date)?;
        let phone = required(request.phone)?;
        let email = required(request.email)?;
        let password = required(request.password)?;

        validate_email(&email)?;
        let birth_date = NaiveDate::parse_from_str(&birth_date, "%Y-%m-%d")
            .map_err(|_| AuthError::ValidationError("รูปแบบวันเกิดไม่ถูกต้อง".to_string()))?;

        let use_permanent_as_current = request.use_permanent_as_current.unwrap_or(false);
        let current_address = if use_permanent_as_current {
            Some(permanent_address.clone())
        } else {
            optional(request.current_address)
        };

        let personal_info = PersonalInfo {
            title,
            first_name,
            last_name,
            permanent_address,
            current_address,
            use_permanent_as_current,
            birth_date,
            phone,
            email: email.clone(),
            congenital_disease: optional(request.congenital_disease),
            drug_allergy: optional(request.drug_allergy),
            newsletter: request.newsletter.unwrap_or(false),
            medical_data_consent: request.medical_data_consent.unwrap_or(false),
        };

        let account = self
            .store
            .create_account(NewAccount {
                email,
                password_hash: PasswordService::hash_password(&password)?,
                role: UserRole::Patient,
                personal_info: Some(personal_info),
                with_doctor_profile: false,
            })
            .await?;

        info!("Registered patient account {}", account.id);
        Ok(account)
    }

    pub async fn login(&self, request: LoginRequest) -> Result<LoginOutcome, AuthError> {
        let email = required(request.email)?;
        let password = request
            .password
            .filter(|p| !p.is_empty())
            .ok_or_else(|| AuthError::ValidationError(MISSING_FIELDS.to_string()))?;

        let account = match self.store.find_by_email(&email).await? {
            Some(account) => account,
            None => {
                debug!("Login attempt for unknown e-mail");
                return Err(AuthError::InvalidCredentials);
            }
        };

        if !PasswordService::verify_password(&password, &account.password_hash)? {
            warn!("Failed login for account {}", account.id);
            return Err(AuthError::InvalidCredentials);
        }

        let user = account.to_user();
        let token = issue_token(&user, &self.config.jwt_secret, self.config.session_ttl_hours)
            .map_err(AuthError::TokenError)?;

        info!("Account {} logged in as {}", user.id, user.role);
        Ok(LoginOutcome {
            token,
            redirect: redirect_for(user.role),
            user,
        })
    }

    pub async fn profile(&self, user: &User) -> Result<UserProfile, AuthError> {
        let account = self.store.find_by_id(user.id).await?.ok_or(AuthError::NotFound)?;
        let personal_info = self.store.personal_info(account.id).await?;

        Ok(UserProfile {
            id: account.id,
            email: account.email,
            role: account.role,
            doctor_id: account.doctor_id,
            created_at: account.created_at,
            personal_info,
        })
    }

    /// Creates the configured admin and doctor accounts unless they exist.
    pub async fn seed_staff(&self) -> Result<(), AuthError> {
        let seeds = [
            (self.config.admin_seed.as_ref(), UserRole::Admin),
            (self.config.doctor_seed.as_ref(), UserRole::Doctor),
        ];

        for (seed, role) in seeds {
            if let Some(seed) = seed {
                self.seed_account(seed, role).await?;
            }
        }
        Ok(())
    }

    async fn seed_account(&self, seed: &StaffSeed, role: UserRole) -> Result<(), AuthError> {
        if self.store.find_by_email(&seed.email).await?.is_some() {
            debug!("{} account {} already present", role, seed.email);
            return Ok(());
        }

        let created = self
            .store
            .create_account(NewAccount {
                email: seed.email.clone(),
                password_hash: PasswordService::hash_password(&seed.password)?,
                role,
                personal_info: None,
                with_doctor_profile: role == UserRole::Doctor,
            })
            .await;

        match created {
            Ok(account) => {
                info!("Seeded {} account {}", role, account.id);
                Ok(())
            }
            // Another instance seeded it first.
            Err(AuthError::DuplicateEmail) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use shared_utils::jwt::validate_token;
    use shared_utils::test_utils::TestConfig;

    use crate::store::MemoryUserStore;

    fn register_request(email: &str) -> RegisterRequest {
        RegisterRequest {
            title: Some("นาย".to_string()),
            first_name: Some("สมชาย".to_string()),
            last_name: Some("ใจดี".to_string()),
            permanent_address: Some("123 ถนนสุขุมวิท กรุงเทพฯ".to_string()),
            birth_date: Some("1990-05-17".to_string()),
            phone: Some("0812345678".to_string()),
            email: Some(email.to_string()),
            password: Some("password123".to_string()),
            ..RegisterRequest::default()
        }
    }

    fn service_with(config: AppConfig) -> AccountService {
        AccountService::new(Arc::new(config), Arc::new(MemoryUserStore::new()))
    }

    fn service() -> AccountService {
        service_with(TestConfig::default().to_app_config())
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let service = service();
        let account = service.register(register_request("somchai@example.com")).await.unwrap();
        assert_eq!(account.role, UserRole::Patient);
        assert_ne!(account.password_hash, "password123");

        let outcome = service
            .login(LoginRequest {
                email: Some("somchai@example.com".to_string()),
                password: Some("password123".to_string()),
            })
            .await
            .unwrap();

        assert_eq!(outcome.redirect, "/home");
        let user = validate_token(&outcome.token, &TestConfig::default().jwt_secret).unwrap();
        assert_eq!(user.id, account.id);
        assert_eq!(user.role, UserRole::Patient);
    }

    #[tokio::test]
    async fn test_missing_required_field() {
        let mut request = register_request("a@example.com");
        request.phone = Some("  ".to_string());

        assert_matches!(
            service().register(request).await,
            Err(AuthError::ValidationError(msg)) if msg == MISSING_FIELDS
        );
    }

    #[tokio::test]
    async fn test_bad_email_and_birth_date() {
        let service = service();
        assert_matches!(
            service.register(register_request("not-an-email")).await,
            Err(AuthError::ValidationError(_))
        );

        let mut request = register_request("ok@example.com");
        request.birth_date = Some("17/05/1990".to_string());
        assert_matches!(service.register(request).await, Err(AuthError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let service = service();
        service.register(register_request("dup@example.com")).await.unwrap();
        assert_matches!(
            service.register(register_request("DUP@example.com")).await,
            Err(AuthError::DuplicateEmail)
        );
    }

    #[tokio::test]
    async fn test_permanent_address_copied_to_current() {
        let service = service();
        let mut request = register_request("addr@example.com");
        request.use_permanent_as_current = Some(true);
        request.current_address = Some("ignored".to_string());
        let account = service.register(request).await.unwrap();

        let profile = service.profile(&account.to_user()).await.unwrap();
        let info = profile.personal_info.unwrap();
        assert_eq!(info.current_address.as_deref(), Some("123 ถนนสุขุมวิท กรุงเทพฯ"));
    }

    #[tokio::test]
    async fn test_wrong_password_and_unknown_email_look_the_same() {
        let service = service();
        service.register(register_request("login@example.com")).await.unwrap();

        let wrong = service
            .login(LoginRequest {
                email: Some("login@example.com".to_string()),
                password: Some("nope".to_string()),
            })
            .await;
        let unknown = service
            .login(LoginRequest {
                email: Some("ghost@example.com".to_string()),
                password: Some("password123".to_string()),
            })
            .await;

        assert_matches!(wrong, Err(AuthError::InvalidCredentials));
        assert_matches!(unknown, Err(AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_seed_staff_is_idempotent() {
        let config = AppConfig {
            admin_seed: Some(StaffSeed {
                email: "admin@clinic.test".to_string(),
                password: "admin-pass".to_string(),
            }),
            doctor_seed: Some(StaffSeed {
                email: "doctor@clinic.test".to_string(),
                password: "doctor-pass".to_string(),
            }),
            ..TestConfig::default().to_app_config()
        };
        let service = service_with(config);

        service.seed_staff().await.unwrap();
        service.seed_staff().await.unwrap();

        let admin = service
            .login(LoginRequest {
                email: Some("admin@clinic.test".to_string()),
                password: Some("admin-pass".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(admin.redirect, "/admin/listadmin");

        let doctor = service
            .login(LoginRequest {
                email: Some("doctor@clinic.test".to_string()),
                password: Some("doctor-pass".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(doctor.user.role, UserRole::Doctor);
        assert!(doctor.user.doctor_id.is_some());
    }
}
