//! Code Lookup Tool
//!
//! Finds ICD-10-CM codes matching a clinical term.

use std::fmt::Write;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use agent_core::{ParameterSchema, Result as CoreResult, Tool, ToolCall, ToolSchema};

use crate::catalog::CodeCatalog;
use crate::error::CoderError;

const DEFAULT_LIMIT: u64 = 5;
const MAX_LIMIT: u64 = 20;

/// Tool for searching the code catalog by diagnosis or symptom
pub struct CodeLookupTool {
    catalog: Arc<dyn CodeCatalog>,
}

impl CodeLookupTool {
    pub fn new(catalog: Arc<dyn CodeCatalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl Tool for CodeLookupTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "code_lookup".into(),
            description: "Search ICD-10-CM codes by diagnosis, symptom or abbreviation. Returns matching codes with descriptions and billability.".into(),
            parameters: vec![
                ParameterSchema::required(
                    "term",
                    "string",
                    "Clinical term to search for (e.g., 'type 2 diabetes', 'htn')",
                ),
                ParameterSchema::optional("limit", "integer", "Maximum number of matches")
                    .with_default(json!(DEFAULT_LIMIT)),
            ],
        }
    }

    async fn execute(&self, call: &ToolCall) -> CoreResult<String> {
        let term = call.get_str("term").unwrap_or_default().trim();
        if term.is_empty() {
            return Err(CoderError::EmptyTerm.into());
        }
        let limit = call.get_u64("limit").unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

        let matches = self
            .catalog
            .search(term, usize::try_from(limit).unwrap_or(usize::MAX))
            .await?;
        debug!(term, found = matches.len(), catalog = self.catalog.name(), "code lookup");

        if matches.is_empty() {
            return Ok(format!("No ICD-10-CM codes found for '{term}'"));
        }

        let mut output = format!("ICD-10-CM matches for '{term}':\n");
        for entry in &matches {
            let _ = writeln!(output, "  {entry}");
        }
        Ok(output.trim_end().to_string())
    }
}
