use std::sync::Arc;

use tracing::info;

use shared_models::auth::User;

use crate::models::{
    CategoryInput, LabError, LabReferenceRange, LabTest, LabTestCategory, LabTestDraft,
    LabTestInput, ReferenceRangeDraft, ReferenceRangeInput,
};
use crate::store::LabCatalogStore;

const MISSING_FIELDS: &str = "กรุณากรอกข้อมูลให้ครบถ้วน";

fn required_name(value: Option<String>) -> Result<String, LabError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| LabError::ValidationError(MISSING_FIELDS.to_string()))
}

fn check_bounds(min: Option<f64>, max: Option<f64>) -> Result<(), LabError> {
    if [min, max].iter().flatten().any(|v| !v.is_finite()) {
        return Err(LabError::ValidationError("ค่าอ้างอิงต้องเป็นตัวเลข".to_string()));
    }
    match (min, max) {
        (Some(min), Some(max)) if min > max => Err(LabError::ValidationError(
            "ค่าต่ำสุดต้องไม่มากกว่าค่าสูงสุด".to_string(),
        )),
        _ => Ok(()),
    }
}

fn require_admin(actor: &User) -> Result<(), LabError> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(LabError::Unauthorized)
    }
}

/// Catalog reads are open to any session; writes are admin-only.
pub struct LabCatalogService {
    store: Arc<dyn LabCatalogStore>,
}

impl LabCatalogService {
    pub fn new(store: Arc<dyn LabCatalogStore>) -> Self {
        Self { store }
    }

    pub async fn list_categories(&self) -> Result<Vec<LabTestCategory>, LabError> {
        self.store.list_categories().await
    }

    pub async fn create_category(
        &self,
        actor: &User,
        input: CategoryInput,
    ) -> Result<LabTestCategory, LabError> {
        require_admin(actor)?;
        let category = self.store.create_category(&required_name(input.name)?).await?;
        info!("Lab category {} created by {}", category.id, actor.id);
        Ok(category)
    }

    pub async fn update_category(
        &self,
        actor: &User,
        id: i64,
        input: CategoryInput,
    ) -> Result<LabTestCategory, LabError> {
        require_admin(actor)?;
        self.store
            .update_category(id, &required_name(input.name)?)
            .await?
            .ok_or(LabError::NotFound("category"))
    }

    pub async fn delete_category(&self, actor: &User, id: i64) -> Result<(), LabError> {
        require_admin(actor)?;
        if !self.store.delete_category(id).await? {
            return Err(LabError::NotFound("category"));
        }
        info!("Lab category {} deleted by {}", id, actor.id);
        Ok(())
    }

    pub async fn list_tests(&self) -> Result<Vec<LabTest>, LabError> {
        self.store.list_tests().await
    }

    pub async fn get_test(&self, id: i64) -> Result<LabTest, LabError> {
        self.store.get_test(id).await?.ok_or(LabError::NotFound("lab test"))
    }

    fn test_draft(input: LabTestInput) -> Result<LabTestDraft, LabError> {
        let name = required_name(input.name)?;
        let category_id = input
            .category_id
            .ok_or_else(|| LabError::ValidationError(MISSING_FIELDS.to_string()))?;
        check_bounds(input.normal_min, input.normal_max)?;

        Ok(LabTestDraft {
            name,
            category_id,
            normal_min: input.normal_min,
            normal_max: input.normal_max,
            unit: input.unit.filter(|u| !u.trim().is_empty()),
            description: input.description.filter(|d| !d.trim().is_empty()),
        })
    }

    pub async fn create_test(
        &self,
        actor: &User,
        input: LabTestInput,
    ) -> Result<LabTest, LabError> {
        require_admin(actor)?;
        let test = self.store.create_test(Self::test_draft(input)?).await?;
        info!("Lab test {} created by {}", test.id, actor.id);
        Ok(test)
    }

    pub async fn update_test(
        &self,
        actor: &User,
        id: i64,
        input: LabTestInput,
    ) -> Result<LabTest, LabError> {
        require_admin(actor)?;
        self.store
            .update_test(id, Self::test_draft(input)?)
            .await?
            .ok_or(LabError::NotFound("lab test"))
    }

    pub async fn delete_test(&self, actor: &User, id: i64) -> Result<(), LabError> {
        require_admin(actor)?;
        if !self.store.delete_test(id).await? {
            return Err(LabError::NotFound("lab test"));
        }
        Ok(())
    }

    pub async fn list_ranges(&self, test_id: i64) -> Result<Vec<LabReferenceRange>, LabError> {
        self.store.list_ranges(test_id).await
    }

    pub async fn create_range(
        &self,
        actor: &User,
        input: ReferenceRangeInput,
    ) -> Result<LabReferenceRange, LabError> {
        require_admin(actor)?;
        let test_id = input
            .test_id
            .ok_or_else(|| LabError::ValidationError(MISSING_FIELDS.to_string()))?;
        check_bounds(input.normal_min, input.normal_max)?;

        self.store
            .create_range(ReferenceRangeDraft {
                lab_id: input.lab_id,
                test_id,
                normal_min: input.normal_min,
                normal_max: input.normal_max,
                unit: input.unit,
            })
            .await
    }

    pub async fn update_range(
        &self,
        actor: &User,
        id: i64,
        input: ReferenceRangeInput,
    ) -> Result<LabReferenceRange, LabError> {
        require_admin(actor)?;
        check_bounds(input.normal_min, input.normal_max)?;

        self.store
            .update_range(id, input.normal_min, input.normal_max, input.unit)
            .await?
            .ok_or(LabError::NotFound("reference range"))
    }

    pub async fn delete_range(&self, actor: &User, id: i64) -> Result<(), LabError> {
        require_admin(actor)?;
        if !self.store.delete_range(id).await? {
            return Err(LabError::NotFound("reference range"));
        }
        Ok(())
    }
}
