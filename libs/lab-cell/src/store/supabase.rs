use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error};

use shared_database::supabase::SupabaseClient;

use crate::models::{
    LabError, LabReferenceRange, LabTest, LabTestCategory, LabTestDraft, ReferenceRangeDraft,
};

use super::LabCatalogStore;

const TEST_SELECT: &str = "*,lab_test_categories(name)";

#[derive(Debug, Deserialize)]
struct LabTestRow {
    id: i64,
    name: String,
    category_id: i64,
    #[serde(default)]
    normal_min: Option<f64>,
    #[serde(default)]
    normal_max: Option<f64>,
    #[serde(default)]
    unit: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    lab_test_categories: Option<Value>,
}

impl From<LabTestRow> for LabTest {
    fn from(row: LabTestRow) -> Self {
        let category_name = match row.lab_test_categories {
            Some(Value::Array(items)) => items.into_iter().next(),
            Some(Value::Null) | None => None,
            Some(other) => Some(other),
        }
        .and_then(|c| c.get("name").and_then(Value::as_str).map(str::to_string));

        LabTest {
            id: row.id,
            name: row.name,
            category_id: row.category_id,
            category_name,
            normal_min: row.normal_min,
            normal_max: row.normal_max,
            unit: row.unit,
            description: row.description,
        }
    }
}

/// PostgREST answers foreign-key violations with 409.
fn is_conflict(e: &anyhow::Error) -> bool {
    e.to_string().starts_with("Conflict")
}

fn db_error(context: &str, e: anyhow::Error) -> LabError {
    error!("{}: {}", context, e);
    LabError::DatabaseError(format!("{}: {}", context, e))
}

pub struct SupabaseLabCatalogStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseLabCatalogStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    async fn fetch<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        context: &str,
    ) -> Result<Vec<T>, LabError> {
        self.supabase
            .request(Method::GET, path, None)
            .await
            .map_err(|e| db_error(context, e))
    }

    async fn write<T: serde::de::DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        on_conflict: LabError,
        context: &str,
    ) -> Result<Vec<T>, LabError> {
        match self.supabase.request_returning(method, path, body).await {
            Ok(rows) => Ok(rows),
            Err(e) if is_conflict(&e) => {
                debug!("{} rejected by constraint: {}", context, e);
                Err(on_conflict)
            }
            Err(e) => Err(db_error(context, e)),
        }
    }
}

#[async_trait]
impl LabCatalogStore for SupabaseLabCatalogStore {
    async fn list_categories(&self) -> Result<Vec<LabTestCategory>, LabError> {
        self.fetch("/rest/v1/lab_test_categories?order=id.asc", "Failed to list lab categories")
            .await
    }

    async fn create_category(&self, name: &str) -> Result<LabTestCategory, LabError> {
        let rows: Vec<LabTestCategory> = self
            .write(
                Method::POST,
                "/rest/v1/lab_test_categories",
                Some(json!({ "name": name })),
                LabError::ValidationError("มีหมวดหมู่นี้อยู่แล้ว".to_string()),
                "Failed to create lab category",
            )
            .await?;

        rows.into_iter()
            .next()
            .ok_or_else(|| LabError::DatabaseError("Category insert returned no row".to_string()))
    }

    async fn update_category(
        &self,
        id: i64,
        name: &str,
    ) -> Result<Option<LabTestCategory>, LabError> {
        let rows: Vec<LabTestCategory> = self
            .write(
                Method::PATCH,
                &format!("/rest/v1/lab_test_categories?id=eq.{}", id),
                Some(json!({ "name": name })),
                LabError::ValidationError("มีหมวดหมู่นี้อยู่แล้ว".to_string()),
                "Failed to update lab category",
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn delete_category(&self, id: i64) -> Result<bool, LabError> {
        let rows: Vec<LabTestCategory> = self
            .write(
                Method::DELETE,
                &format!("/rest/v1/lab_test_categories?id=eq.{}", id),
                None,
                LabError::CategoryInUse,
                "Failed to delete lab category",
            )
            .await?;
        Ok(!rows.is_empty())
    }

    async fn list_tests(&self) -> Result<Vec<LabTest>, LabError> {
        let path = format!("/rest/v1/lab_tests?select={}&order=id.asc", TEST_SELECT);
        let rows: Vec<LabTestRow> = self.fetch(&path, "Failed to list lab tests").await?;
        Ok(rows.into_iter().map(LabTest::from).collect())
    }

    async fn get_test(&self, id: i64) -> Result<Option<LabTest>, LabError> {
        let path = format!("/rest/v1/lab_tests?select={}&id=eq.{}&limit=1", TEST_SELECT, id);
        let rows: Vec<LabTestRow> = self.fetch(&path, "Failed to load lab test").await?;
        Ok(rows.into_iter().next().map(LabTest::from))
    }

    async fn create_test(&self, draft: LabTestDraft) -> Result<LabTest, LabError> {
        let rows: Vec<LabTestRow> = self
            .write(
                Method::POST,
                &format!("/rest/v1/lab_tests?select={}", TEST_SELECT),
                Some(json!(draft)),
                LabError::NotFound("category"),
                "Failed to create lab test",
            )
            .await?;

        rows.into_iter()
            .next()
            .map(LabTest::from)
            .ok_or_else(|| LabError::DatabaseError("Lab test insert returned no row".to_string()))
    }

    async fn update_test(&self, id: i64, draft: LabTestDraft) -> Result<Option<LabTest>, LabError> {
        let rows: Vec<LabTestRow> = self
            .write(
                Method::PATCH,
                &format!("/rest/v1/lab_tests?id=eq.{}&select={}", id, TEST_SELECT),
                Some(json!(draft)),
                LabError::NotFound("category"),
                "Failed to update lab test",
            )
            .await?;
        Ok(rows.into_iter().next().map(LabTest::from))
    }

    async fn delete_test(&self, id: i64) -> Result<bool, LabError> {
        let rows: Vec<Value> = self
            .write(
                Method::DELETE,
                &format!("/rest/v1/lab_tests?id=eq.{}", id),
                None,
                LabError::ValidationError("รายการตรวจนี้ยังถูกใช้งานอยู่".to_string()),
                "Failed to delete lab test",
            )
            .await?;
        Ok(!rows.is_empty())
    }

    async fn list_ranges(&self, test_id: i64) -> Result<Vec<LabReferenceRange>, LabError> {
        let path = format!("/rest/v1/lab_reference_range?test_id=eq.{}&order=id.asc", test_id);
        self.fetch(&path, "Failed to list reference ranges").await
    }

    async fn create_range(
        &self,
        draft: ReferenceRangeDraft,
    ) -> Result<LabReferenceRange, LabError> {
        let rows: Vec<LabReferenceRange> = self
            .write(
                Method::POST,
                "/rest/v1/lab_reference_range",
                Some(json!(draft)),
                LabError::NotFound("lab test"),
                "Failed to create reference range",
            )
            .await?;

        rows.into_iter()
            .next()
            .ok_or_else(|| {
                LabError::DatabaseError("Reference range insert returned no row".to_string())
            })
    }

    async fn update_range(
        &self,
        id: i64,
        normal_min: Option<f64>,
        normal_max: Option<f64>,
        unit: Option<String>,
    ) -> Result<Option<LabReferenceRange>, LabError> {
        let rows: Vec<LabReferenceRange> = self
            .write(
                Method::PATCH,
                &format!("/rest/v1/lab_reference_range?id=eq.{}", id),
                Some(json!({ "normal_min": normal_min, "normal_max": normal_max, "unit": unit })),
                LabError::ValidationError("ช่วงค่าอ้างอิงไม่ถูกต้อง".to_string()),
                "Failed to update reference range",
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn delete_range(&self, id: i64) -> Result<bool, LabError> {
        let rows: Vec<Value> = self
            .write(
                Method::DELETE,
                &format!("/rest/v1/lab_reference_range?id=eq.{}", id),
                None,
                LabError::ValidationError("ช่วงค่าอ้างอิงนี้ยังถูกใช้งานอยู่".to_string()),
                "Failed to delete reference range",
            )
            .await?;
        Ok(!rows.is_empty())
    }
}
