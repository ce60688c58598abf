use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::models::{Account, AuthError, NewAccount, PersonalInfo};

use super::UserStore;

#[derive(Default)]
struct Users {
    next_user_id: i64,
    next_doctor_id: i64,
    accounts: BTreeMap<i64, Account>,
    personal: HashMap<i64, PersonalInfo>,
}

#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<Users>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create_account(&self, account: NewAccount) -> Result<Account, AuthError> {
        let mut users = self.users.lock().await;

        let email = account.email.to_lowercase();
        if users.accounts.values().any(|a| a.email.to_lowercase() == email) {
            return Err(AuthError::DuplicateEmail);
        }

        users.next_user_id += 1;
        let id = users.next_user_id;
        let doctor_id = if account.with_doctor_profile {
            users.next_doctor_id += 1;
            Some(users.next_doctor_id)
        } else {
            None
        };

        let stored = Account {
            id,
            email: account.email,
            password_hash: account.password_hash,
            role: account.role,
            doctor_id,
            created_at: Some(Utc::now()),
        };
        users.accounts.insert(id, stored.clone());
        if let Some(info) = account.personal_info {
            users.personal.insert(id, info);
        }

        Ok(stored)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, AuthError> {
        let users = self.users.lock().await;
        let email = email.to_lowercase();
        Ok(users
            .accounts
            .values()
            .find(|a| a.email.to_lowercase() == email)
            .cloned())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Account>, AuthError> {
        let users = self.users.lock().await;
        Ok(users.accounts.get(&id).cloned())
    }

    async fn personal_info(&self, user_id: i64) -> Result<Option<PersonalInfo>, AuthError> {
        let users = self.users.lock().await;
        Ok(users.personal.get(&user_id).cloned())
    }
}
