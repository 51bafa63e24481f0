//! Code Validator Tool
//!
//! Checks a proposed ICD-10-CM code before it is reported.

use std::sync::Arc;

use async_trait::async_trait;

use agent_core::{ParameterSchema, Result as CoreResult, Tool, ToolCall, ToolSchema};

use crate::catalog::CodeCatalog;
use crate::model::Icd10Code;

/// Tool that verifies code format, catalog presence and billability
pub struct CodeValidatorTool {
    catalog: Arc<dyn CodeCatalog>,
}

impl CodeValidatorTool {
    pub fn new(catalog: Arc<dyn CodeCatalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl Tool for CodeValidatorTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "code_validate".into(),
            description: "Validate an ICD-10-CM code: checks the format, whether the code is known and whether it is billable.".into(),
            parameters: vec![ParameterSchema::required(
                "code",
                "string",
                "ICD-10-CM code to validate (e.g., 'E11.9')",
            )],
        }
    }

    async fn execute(&self, call: &ToolCall) -> CoreResult<String> {
        let code = Icd10Code::parse(call.get_str("code").unwrap_or_default())?;

        let Some(entry) = self.catalog.get(&code).await? else {
            return Ok(format!(
                "{code} has a valid format but is not in the {} catalog; verify it against the full code set",
                self.catalog.name()
            ));
        };

        if entry.billable {
            Ok(format!("{entry}: valid"))
        } else {
            Ok(format!(
                "{entry}: a more specific code under {} is required for billing",
                code.category()
            ))
        }
    }
}
