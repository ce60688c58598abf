use std::env;
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataBackend {
    Supabase,
    Memory,
}

#[derive(Debug, Clone)]
pub struct StaffSeed {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_service_key: String,
    pub jwt_secret: String,
    pub session_ttl_hours: i64,
    pub data_backend: DataBackend,
    pub max_appointments_per_slot: u32,
    pub cancellation_cutoff_hours: i64,
    pub clinic_utc_offset_hours: i32,
    pub upload_dir: String,
    pub max_upload_bytes: usize,
    pub port: u16,
    pub admin_seed: Option<StaffSeed>,
    pub doctor_seed: Option<StaffSeed>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_service_key: String::new(),
            jwt_secret: String::new(),
            session_ttl_hours: 24,
            data_backend: DataBackend::Supabase,
            max_appointments_per_slot: 3,
            cancellation_cutoff_hours: 2,
            clinic_utc_offset_hours: 7,
            upload_dir: "uploads".to_string(),
            max_upload_bytes: 10 * 1024 * 1024,
            port: 3000,
            admin_seed: None,
            doctor_seed: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_service_key: env::var("SUPABASE_SERVICE_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_SERVICE_KEY not set, using empty value");
                    String::new()
                }),
            jwt_secret: env::var("JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("JWT_SECRET not set, every session token will be rejected");
                    String::new()
                }),
            session_ttl_hours: parse_or("SESSION_TTL_HOURS", defaults.session_ttl_hours),
            data_backend: match env::var("DATA_BACKEND").as_deref() {
                Ok("memory") => DataBackend::Memory,
                Ok("supabase") | Err(_) => DataBackend::Supabase,
                Ok(other) => {
                    warn!("Unknown DATA_BACKEND '{}', using supabase", other);
                    DataBackend::Supabase
                }
            },
            max_appointments_per_slot: parse_or(
                "MAX_APPOINTMENTS_PER_SLOT",
                defaults.max_appointments_per_slot,
            ),
            cancellation_cutoff_hours: parse_or(
                "CANCELLATION_CUTOFF_HOURS",
                defaults.cancellation_cutoff_hours,
            ),
            clinic_utc_offset_hours: parse_or(
                "CLINIC_UTC_OFFSET_HOURS",
                defaults.clinic_utc_offset_hours,
            ),
            upload_dir: env::var("UPLOAD_DIR").unwrap_or(defaults.upload_dir),
            max_upload_bytes: parse_or("MAX_UPLOAD_BYTES", defaults.max_upload_bytes),
            port: parse_or("PORT", defaults.port),
            admin_seed: staff_seed("ADMIN_EMAIL", "ADMIN_PASSWORD"),
            doctor_seed: staff_seed("DOCTOR_EMAIL", "DOCTOR_PASSWORD"),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        let datastore_ready = match self.data_backend {
            DataBackend::Memory => true,
            DataBackend::Supabase => {
                !self.supabase_url.is_empty() && !self.supabase_service_key.is_empty()
            }
        };

        datastore_ready && !self.jwt_secret.is_empty()
    }
}

fn parse_or<T>(key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}

fn staff_seed(email_key: &str, password_key: &str) -> Option<StaffSeed> {
    match (env::var(email_key), env::var(password_key)) {
        (Ok(email), Ok(password)) if !email.is_empty() && !password.is_empty() => {
            Some(StaffSeed { email, password })
        }
        _ => None,
    }
}
