pub mod handlers;
pub mod models;
pub mod router;
pub mod services;
pub mod storage;
pub mod store;

pub use handlers::LabState;
pub use router::lab_routes;
pub use storage::{DiskFileStorage, FileStorage};
pub use store::{LabCatalogStore, MemoryLabCatalogStore, SupabaseLabCatalogStore};
