use async_trait::async_trait;

use crate::models::{Account, AuthError, NewAccount, PersonalInfo};

pub mod memory;
pub mod supabase;

pub use memory::MemoryUserStore;
pub use supabase::SupabaseUserStore;

/// Account persistence. `create_account` writes the user, personal info and
/// optional doctor profile as one unit and rejects duplicate e-mails.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_account(&self, account: NewAccount) -> Result<Account, AuthError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, AuthError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<Account>, AuthError>;

    async fn personal_info(&self, user_id: i64) -> Result<Option<PersonalInfo>, AuthError>;
}
