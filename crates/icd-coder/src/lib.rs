//! # icd-coder
//!
//! ICD-10-CM coding tools for the tool-calling agent: a searchable code
//! catalog, the `code_lookup` and `code_validate` tools, and the prompts that
//! turn a patient note into a coding request.
//!
//! ```text
//! patient note ──▶ note_analysis_request ──▶ Agent::run
//!                                              │
//!                        code_lookup("diabetes neuropathy")
//!                        code_validate("E11.40")
//!                                              │
//!                                              ▼
//!                             final answer with codes + rationale
//! ```

pub mod catalog;
pub mod error;
pub mod model;
pub mod svckit;

use std::sync::Arc;

use agent_core::{Message, ToolRegistry};

pub use catalog::{BuiltinCatalog, CodeCatalog};
pub use error::{CoderError, Result};
pub use model::{CodeEntry, Icd10Code};

/// Re-export tools for easy registration
pub mod tools {
    pub use crate::svckit::{CodeLookupTool, CodeValidatorTool};
}

/// Register every coding tool against one catalog
pub fn register_tools(
    registry: &mut ToolRegistry,
    catalog: Arc<dyn CodeCatalog>,
) -> agent_core::Result<()> {
    registry.register(tools::CodeLookupTool::new(Arc::clone(&catalog)))?;
    registry.register(tools::CodeValidatorTool::new(catalog))?;
    Ok(())
}

/// The user turn that asks for a coding analysis of a patient note
pub fn note_analysis_request(note: &str) -> Message {
    Message::user(format!(
        "Please analyze these patient notes and identify the appropriate ICD-10 codes:\n\n{note}"
    ))
}

/// System prompt for the medical coding agent
pub const MEDICAL_CODER_PROMPT: &str = r"You are an experienced medical coder who assigns ICD-10-CM diagnosis codes from clinical documentation.

## Workflow

1. Read the note and list every documented diagnosis, including chronic conditions and relevant history
2. Use `code_lookup` for each condition to find candidate codes
3. Prefer the most specific code the documentation supports (combination codes such as diabetes with neuropathy over separate codes)
4. Use `code_validate` on every code before reporting it
5. Never report a code that is not billable; pick a more specific child code instead

## Answer Format

For each code give:
- The code and its official description
- The phrase in the note that supports it
- Whether it is a primary or secondary diagnosis

Do not code symptoms that are integral to a confirmed diagnosis. If the documentation is too vague to support a specific code, say what is missing.

## Tools Available

- `code_lookup` - Search codes by diagnosis, symptom or abbreviation
- `code_validate` - Check format, catalog presence and billability";

/// Sample note used when no input is given
pub const DEFAULT_PATIENT_NOTE: &str = r#"PATIENT NOTE
Date: 2024-03-20
RE: Initial Visit

CHIEF COMPLAINT:
Patient presents with symptoms of Type 2 diabetes mellitus with early signs of diabetic neuropathy in both feet.
Also reports ongoing hypertension.

HISTORY OF PRESENT ILLNESS:
52-year-old male reports increased thirst, frequent urination, and numbness/tingling in feet for past 3 months.
Blood sugar readings at home consistently above 200 mg/dL. Has family history of diabetes (mother and sister).
Patient also notes ongoing high blood pressure despite current medication.

VITAL SIGNS:
- BP: 142/90 mmHg
- Pulse: 78
- Weight: 198 lbs
- Height: 5'10"
- BMI: 28.4

LAB RESULTS:
- Fasting Blood Glucose: 186 mg/dL
- HbA1c: 7.8%

MEDICATIONS:
- Lisinopril 10mg daily for hypertension
- No current diabetes medications

ASSESSMENT:
1. Type 2 diabetes mellitus, uncontrolled
2. Diabetic neuropathy
3. Essential hypertension

PLAN:
- Start Metformin 500mg twice daily
- Continue Lisinopril
- Diabetes education referral
- Follow-up in 2 weeks
- Recommend diet and exercise program"#;

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::Role;

    #[test]
    fn test_register_tools() {
        let mut registry = ToolRegistry::new();
        register_tools(&mut registry, Arc::new(BuiltinCatalog::new())).unwrap();
        assert_eq!(registry.names(), vec!["code_lookup", "code_validate"]);

        // registering twice collides on names
        assert!(register_tools(&mut registry, Arc::new(BuiltinCatalog::new())).is_err());
    }

    #[test]
    fn test_note_analysis_request() {
        let message = note_analysis_request("BP 150/95");
        assert_eq!(message.role, Role::User);
        assert!(message.text().starts_with("Please analyze these patient notes"));
        assert!(message.text().ends_with("\n\nBP 150/95"));
    }

    #[test]
    fn test_prompt_names_registered_tools() {
        assert!(MEDICAL_CODER_PROMPT.contains("`code_lookup`"));
        assert!(MEDICAL_CODER_PROMPT.contains("`code_validate`"));
        assert!(DEFAULT_PATIENT_NOTE.contains("ASSESSMENT"));
    }
}
