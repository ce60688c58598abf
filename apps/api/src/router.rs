use std::sync::Arc;

use axum::{routing::get, Router};

use appointment_cell::{
    appointment_routes, AppointmentStore, MemoryAppointmentStore, SupabaseAppointmentStore,
};
use auth_cell::{auth_routes, MemoryUserStore, SupabaseUserStore, UserStore};
use lab_cell::{
    lab_routes, DiskFileStorage, FileStorage, LabCatalogStore, LabState, MemoryLabCatalogStore,
    SupabaseLabCatalogStore,
};
use shared_config::{AppConfig, DataBackend};
use shared_database::supabase::SupabaseClient;

/// Store handles shared by every cell router.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub appointments: Arc<dyn AppointmentStore>,
    pub catalog: Arc<dyn LabCatalogStore>,
    pub files: Arc<dyn FileStorage>,
}

impl Stores {
    pub fn from_config(config: &AppConfig) -> Self {
        let files: Arc<dyn FileStorage> = Arc::new(DiskFileStorage::new(&config.upload_dir));

        match config.data_backend {
            DataBackend::Supabase => {
                let supabase = Arc::new(SupabaseClient::new(config));
                Self {
                    users: Arc::new(SupabaseUserStore::new(supabase.clone())),
                    appointments: Arc::new(SupabaseAppointmentStore::new(supabase.clone())),
                    catalog: Arc::new(SupabaseLabCatalogStore::new(supabase)),
                    files,
                }
            }
            DataBackend::Memory => Self {
                users: Arc::new(MemoryUserStore::new()),
                appointments: Arc::new(MemoryAppointmentStore::new()),
                catalog: Arc::new(MemoryLabCatalogStore::new()),
                files,
            },
        }
    }
}

pub fn create_router(config: Arc<AppConfig>, stores: Stores) -> Router {
    let lab_state = LabState {
        config: config.clone(),
        catalog: stores.catalog,
        appointments: stores.appointments.clone(),
        storage: stores.files,
    };

    let api = Router::new()
        .merge(auth_routes(config.clone(), stores.users))
        .merge(appointment_routes(config, stores.appointments))
        .merge(lab_routes(lab_state));

    Router::new()
        .route("/", get(|| async { "UPAM Clinic API is running!" }))
        .nest("/api", api)
}
