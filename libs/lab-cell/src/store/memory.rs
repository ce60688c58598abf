use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::models::{
    LabError, LabReferenceRange, LabTest, LabTestCategory, LabTestDraft, ReferenceRangeDraft,
};

use super::LabCatalogStore;

#[derive(Default)]
struct Catalog {
    next_id: i64,
    categories: BTreeMap<i64, LabTestCategory>,
    tests: BTreeMap<i64, LabTest>,
    ranges: BTreeMap<i64, LabReferenceRange>,
}

impl Catalog {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn build_test(&self, id: i64, draft: LabTestDraft) -> Result<LabTest, LabError> {
        let category = self
            .categories
            .get(&draft.category_id)
            .ok_or(LabError::NotFound("category"))?;

        Ok(LabTest {
            id,
            name: draft.name,
            category_id: draft.category_id,
            category_name: Some(category.name.clone()),
            normal_min: draft.normal_min,
            normal_max: draft.normal_max,
            unit: draft.unit,
            description: draft.description,
        })
    }

    fn refresh_category_names(&mut self, category: &LabTestCategory) {
        for test in self.tests.values_mut().filter(|t| t.category_id == category.id) {
            test.category_name = Some(category.name.clone());
        }
    }
}

#[derive(Default)]
pub struct MemoryLabCatalogStore {
    catalog: Mutex<Catalog>,
}

impl MemoryLabCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LabCatalogStore for MemoryLabCatalogStore {
    async fn list_categories(&self) -> Result<Vec<LabTestCategory>, LabError> {
        Ok(self.catalog.lock().await.categories.values().cloned().collect())
    }

    async fn create_category(&self, name: &str) -> Result<LabTestCategory, LabError> {
        let mut catalog = self.catalog.lock().await;
        let id = catalog.allocate_id();
        let category = LabTestCategory { id, name: name.to_string() };
        catalog.categories.insert(id, category.clone());
        Ok(category)
    }

    async fn update_category(
        &self,
        id: i64,
        name: &str,
    ) -> Result<Option<LabTestCategory>, LabError> {
        let mut catalog = self.catalog.lock().await;
        let updated = match catalog.categories.get_mut(&id) {
            Some(category) => {
                category.name = name.to_string();
                category.clone()
            }
            None => return Ok(None),
        };
        catalog.refresh_category_names(&updated);
        Ok(Some(updated))
    }

    async fn delete_category(&self, id: i64) -> Result<bool, LabError> {
        let mut catalog = self.catalog.lock().await;
        if catalog.tests.values().any(|t| t.category_id == id) {
            return Err(LabError::CategoryInUse);
        }
        Ok(catalog.categories.remove(&id).is_some())
    }

    async fn list_tests(&self) -> Result<Vec<LabTest>, LabError> {
        Ok(self.catalog.lock().await.tests.values().cloned().collect())
    }

    async fn get_test(&self, id: i64) -> Result<Option<LabTest>, LabError> {
        Ok(self.catalog.lock().await.tests.get(&id).cloned())
    }

    async fn create_test(&self, draft: LabTestDraft) -> Result<LabTest, LabError> {
        let mut catalog = self.catalog.lock().await;
        let id = catalog.allocate_id();
        let test = catalog.build_test(id, draft)?;
        catalog.tests.insert(id, test.clone());
        Ok(test)
    }

    async fn update_test(&self, id: i64, draft: LabTestDraft) -> Result<Option<LabTest>, LabError> {
        let mut catalog = self.catalog.lock().await;
        if !catalog.tests.contains_key(&id) {
            return Ok(None);
        }
        let test = catalog.build_test(id, draft)?;
        catalog.tests.insert(id, test.clone());
        Ok(Some(test))
    }

    async fn delete_test(&self, id: i64) -> Result<bool, LabError> {
        let mut catalog = self.catalog.lock().await;
        let removed = catalog.tests.remove(&id).is_some();
        if removed {
            catalog.ranges.retain(|_, r| r.test_id != id);
        }
        Ok(removed)
    }

    async fn list_ranges(&self, test_id: i64) -> Result<Vec<LabReferenceRange>, LabError> {
        let catalog = self.catalog.lock().await;
        Ok(catalog
            .ranges
            .values()
            .filter(|r| r.test_id == test_id)
            .cloned()
            .collect())
    }

    async fn create_range(
        &self,
        draft: ReferenceRangeDraft,
    ) -> Result<LabReferenceRange, LabError> {
        let mut catalog = self.catalog.lock().await;
        if !catalog.tests.contains_key(&draft.test_id) {
            return Err(LabError::NotFound("lab test"));
        }

        let id = catalog.allocate_id();
        let range = LabReferenceRange {
            id,
            lab_id: draft.lab_id,
            test_id: draft.test_id,
            normal_min: draft.normal_min,
            normal_max: draft.normal_max,
            unit: draft.unit,
        };
        catalog.ranges.insert(id, range.clone());
        Ok(range)
    }

    async fn update_range(
        &self,
        id: i64,
        normal_min: Option<f64>,
        normal_max: Option<f64>,
        unit: Option<String>,
    ) -> Result<Option<LabReferenceRange>, LabError> {
        let mut catalog = self.catalog.lock().await;
        Ok(catalog.ranges.get_mut(&id).map(|range| {
            range.normal_min = normal_min;
            range.normal_max = normal_max;
            range.unit = unit;
            range.clone()
        }))
    }

    async fn delete_range(&self, id: i64) -> Result<bool, LabError> {
        Ok(self.catalog.lock().await.ranges.remove(&id).is_some())
    }
}
