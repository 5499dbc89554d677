//! Dataset operations. Arguments travel as a JSON string in `input`.

use super::Gptscript;
use crate::error::Result;
use crate::types::dataset::{DatasetArgs, DatasetRequest};
use crate::types::{DatasetElement, DatasetElementMeta};

impl Gptscript {
    async fn dataset_command(&self, path: &str, args: &DatasetArgs<'_>) -> Result<String> {
        let request = DatasetRequest {
            input: serde_json::to_string(args)?,
            dataset_tool: &self.global.dataset_tool,
            env: &self.global.env,
        };
        self.basic(path, &request).await
    }

    /// IDs of the datasets in the default workspace.
    pub async fn list_datasets(&self) -> Result<Vec<String>> {
        let workspace_id = self.workspace_for(None);
        let args = DatasetArgs {
            workspace_id: &workspace_id,
            dataset_id: None,
            elements: None,
            element: None,
        };
        let out = self.dataset_command("datasets", &args).await?;
        Ok(serde_json::from_str(&out)?)
    }

    /// Create a dataset holding `elements` and return its ID.
    pub async fn create_dataset_with_elements(&self, elements: &[DatasetElement]) -> Result<String> {
        self.add_dataset_elements("", elements).await
    }

    /// Add elements to a dataset (a new one if `dataset_id` is empty) and return its ID.
    pub async fn add_dataset_elements(
        &self,
        dataset_id: &str,
        elements: &[DatasetElement],
    ) -> Result<String> {
        let workspace_id = self.workspace_for(None);
        let args = DatasetArgs {
            workspace_id: &workspace_id,
            dataset_id: Some(dataset_id),
            elements: Some(elements),
            element: None,
        };
        self.dataset_command("datasets/add-elements", &args).await
    }

    pub async fn list_dataset_elements(&self, dataset_id: &str) -> Result<Vec<DatasetElementMeta>> {
        let workspace_id = self.workspace_for(None);
        let args = DatasetArgs {
            workspace_id: &workspace_id,
            dataset_id: Some(dataset_id),
            elements: None,
            element: None,
        };
        let out = self.dataset_command("datasets/list-elements", &args).await?;
        Ok(serde_json::from_str(&out)?)
    }

    pub async fn get_dataset_element(&self, dataset_id: &str, name: &str) -> Result<DatasetElement> {
        let workspace_id = self.workspace_for(None);
        let args = DatasetArgs {
            workspace_id: &workspace_id,
            dataset_id: Some(dataset_id),
            elements: None,
            element: Some(name),
        };
        let out = self.dataset_command("datasets/get-element", &args).await?;
        Ok(serde_json::from_str(&out)?)
    }
}
