use async_trait::async_trait;

use crate::models::{
    LabError, LabReferenceRange, LabTest, LabTestCategory, LabTestDraft, ReferenceRangeDraft,
};

pub mod memory;
pub mod supabase;

pub use memory::MemoryLabCatalogStore;
pub use supabase::SupabaseLabCatalogStore;

/// Reference data for blood tests. Updates and deletes return `None`/`false`
/// when the id does not exist.
#[async_trait]
pub trait LabCatalogStore: Send + Sync {
    async fn list_categories(&self) -> Result<Vec<LabTestCategory>, LabError>;
    async fn create_category(&self, name: &str) -> Result<LabTestCategory, LabError>;
    async fn update_category(
        &self,
        id: i64,
        name: &str,
    ) -> Result<Option<LabTestCategory>, LabError>;
    /// Fails with `CategoryInUse` while tests still reference the category.
    async fn delete_category(&self, id: i64) -> Result<bool, LabError>;

    async fn list_tests(&self) -> Result<Vec<LabTest>, LabError>;
    async fn get_test(&self, id: i64) -> Result<Option<LabTest>, LabError>;
    async fn create_test(&self, draft: LabTestDraft) -> Result<LabTest, LabError>;
    async fn update_test(&self, id: i64, draft: LabTestDraft) -> Result<Option<LabTest>, LabError>;
    async fn delete_test(&self, id: i64) -> Result<bool, LabError>;

    async fn list_ranges(&self, test_id: i64) -> Result<Vec<LabReferenceRange>, LabError>;
    async fn create_range(&self, draft: ReferenceRangeDraft) -> Result<LabReferenceRange, LabError>;
    async fn update_range(
        &self,
        id: i64,
        normal_min: Option<f64>,
        normal_max: Option<f64>,
        unit: Option<String>,
    ) -> Result<Option<LabReferenceRange>, LabError>;
    async fn delete_range(&self, id: i64) -> Result<bool, LabError>;
}
