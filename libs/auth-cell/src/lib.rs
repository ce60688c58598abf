pub mod handlers;
pub mod models;
pub mod router;
pub mod services;
pub mod store;

pub use router::auth_routes;
pub use services::account::AccountService;
pub use store::{MemoryUserStore, SupabaseUserStore, UserStore};
