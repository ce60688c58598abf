use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, info};

use shared_database::supabase::SupabaseClient;
use shared_models::auth::UserRole;

use crate::models::{Account, AuthError, NewAccount, PersonalInfo};

use super::UserStore;

const ACCOUNT_SELECT: &str = "id,email,password,role,created_at,doctors(id)";

#[derive(Debug, Deserialize)]
struct AccountRow {
    id: i64,
    email: String,
    password: String,
    role: UserRole,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    /// One-to-one doctor profile; an empty list for patients and admins.
    #[serde(default)]
    doctors: Option<Value>,
}

impl AccountRow {
    fn into_account(self) -> Account {
        let doctor_id = match self.doctors {
            Some(Value::Array(items)) => {
                items.first().and_then(|d| d.get("id")).and_then(Value::as_i64)
            }
            Some(Value::Object(map)) => map.get("id").and_then(Value::as_i64),
            _ => None,
        };

        Account {
            id: self.id,
            email: self.email,
            password_hash: self.password,
            role: self.role,
            doctor_id,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
enum RegisterOutcome {
    Created { account: AccountRow },
    DuplicateEmail,
}

fn db_error(context: &str, e: anyhow::Error) -> AuthError {
    error!("{}: {}", context, e);
    AuthError::DatabaseError(format!("{}: {}", context, e))
}

pub struct SupabaseUserStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseUserStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    async fn find_one(&self, filter: &str) -> Result<Option<Account>, AuthError> {
        let path = format!("/rest/v1/users?select={}&{}&limit=1", ACCOUNT_SELECT, filter);

        let rows: Vec<AccountRow> = self
            .supabase
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| db_error("Failed to look up account", e))?;

        Ok(rows.into_iter().next().map(AccountRow::into_account))
    }
}

#[async_trait]
impl UserStore for SupabaseUserStore {
    async fn create_account(&self, account: NewAccount) -> Result<Account, AuthError> {
        debug!("Registering {} account {}", account.role, account.email);

        let args = json!({
            "p_email": account.email,
            "p_password_hash": account.password_hash,
            "p_role": account.role.as_str(),
            "p_personal_info": account.personal_info,
            "p_with_doctor_profile": account.with_doctor_profile,
        });

        let outcome: RegisterOutcome = self
            .supabase
            .rpc("register_account", args)
            .await
            .map_err(|e| db_error("Failed to register account", e))?;

        match outcome {
            RegisterOutcome::Created { account } => {
                let account = account.into_account();
                info!("Created {} account {}", account.role, account.id);
                Ok(account)
            }
            RegisterOutcome::DuplicateEmail => Err(AuthError::DuplicateEmail),
        }
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, AuthError> {
        self.find_one(&format!("email=ilike.{}", urlencoding::encode(email))).await
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Account>, AuthError> {
        self.find_one(&format!("id=eq.{}", id)).await
    }

    async fn personal_info(&self, user_id: i64) -> Result<Option<PersonalInfo>, AuthError> {
        let path = format!("/rest/v1/personal_info?user_id=eq.{}&limit=1", user_id);

        let rows: Vec<PersonalInfo> = self
            .supabase
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| db_error("Failed to load personal info", e))?;

        Ok(rows.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doctor_embed_sets_doctor_id() {
        let row: AccountRow = serde_json::from_value(json!({
            "id": 4,
            "email": "doc@clinic.test",
            "password": "$argon2id$...",
            "role": "doctor",
            "created_at": "2024-01-01T00:00:00+00:00",
            "doctors": [{ "id": 9 }]
        }))
        .unwrap();

        let account = row.into_account();
        assert_eq!(account.doctor_id, Some(9));
        assert_eq!(account.role, UserRole::Doctor);
    }

    #[test]
    fn test_missing_embed_means_no_doctor_profile() {
        let row: AccountRow = serde_json::from_value(json!({
            "id": 5,
            "email": "p@clinic.test",
            "password": "x",
            "role": "patient",
            "doctors": []
        }))
        .unwrap();

        assert_eq!(row.into_account().doctor_id, None);
    }
}
