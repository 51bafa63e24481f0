//! Built-in Catalog
//!
//! A small table of common outpatient ICD-10-CM codes, for demos and tests.

use async_trait::async_trait;

use super::CodeCatalog;
use crate::error::{CoderError, Result};
use crate::model::{CodeEntry, Icd10Code};

// (code, description, keywords, billable)
const ENTRIES: &[(&str, &str, &[&str], bool)] = &[
    ("E11", "Type 2 diabetes mellitus", &["t2dm"], false),
    ("E11.9", "Type 2 diabetes mellitus without complications", &["diabetes", "t2dm", "dm2", "type 2 diabetes"], true),
    ("E11.40", "Type 2 diabetes mellitus with diabetic neuropathy, unspecified", &["diabetic neuropathy", "neuropathy"], true),
    ("E11.42", "Type 2 diabetes mellitus with diabetic polyneuropathy", &["polyneuropathy", "diabetic polyneuropathy"], true),
    ("E11.65", "Type 2 diabetes mellitus with hyperglycemia", &["hyperglycemia", "uncontrolled diabetes"], true),
    ("E10.9", "Type 1 diabetes mellitus without complications", &["t1dm", "type 1 diabetes", "juvenile diabetes"], true),
    ("E78.5", "Hyperlipidemia, unspecified", &["hyperlipidemia", "high cholesterol", "dyslipidemia"], true),
    ("E66.9", "Obesity, unspecified", &["obesity"], true),
    ("E66.3", "Overweight", &["overweight"], true),
    ("I10", "Essential (primary) hypertension", &["hypertension", "htn", "high blood pressure"], true),
    ("I25.10", "Atherosclerotic heart disease of native coronary artery without angina pectoris", &["cad", "coronary artery disease"], true),
    ("I48.91", "Unspecified atrial fibrillation", &["afib", "atrial fibrillation"], true),
    ("I50.9", "Heart failure, unspecified", &["chf", "heart failure"], true),
    ("J06.9", "Acute upper respiratory infection, unspecified", &["uri", "common cold"], true),
    ("J18.9", "Pneumonia, unspecified organism", &["pneumonia"], true),
    ("J44.9", "Chronic obstructive pulmonary disease, unspecified", &["copd"], true),
    ("J45.909", "Unspecified asthma, uncomplicated", &["asthma"], true),
    ("K21.9", "Gastro-esophageal reflux disease without esophagitis", &["gerd", "reflux", "heartburn"], true),
    ("M54.50", "Low back pain, unspecified", &["low back pain", "lumbago", "back pain"], true),
    ("N18.3", "Chronic kidney disease, stage 3 (moderate)", &["ckd", "ckd 3", "chronic kidney disease"], false),
    ("N39.0", "Urinary tract infection, site not specified", &["uti"], true),
    ("F32.9", "Major depressive disorder, single episode, unspecified", &["depression", "mdd"], true),
    ("F41.1", "Generalized anxiety disorder", &["anxiety", "gad"], true),
    ("G43.909", "Migraine, unspecified, not intractable, without status migrainosus", &["migraine"], true),
    ("R51.9", "Headache, unspecified", &["headache"], true),
    ("R35.0", "Frequency of micturition", &["frequent urination", "urinary frequency"], true),
    ("R63.1", "Polydipsia", &["polydipsia", "increased thirst", "thirst"], true),
    ("Z83.3", "Family history of diabetes mellitus", &["family history of diabetes"], true),
    ("Z79.4", "Long term (current) use of insulin", &["insulin"], true),
    ("Z79.84", "Long term (current) use of oral hypoglycemic drugs", &["metformin", "oral hypoglycemic"], true),
];

/// In-memory catalog over a fixed code table
pub struct BuiltinCatalog {
    entries: Vec<CodeEntry>,
}

impl Default for BuiltinCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl BuiltinCatalog {
    pub fn new() -> Self {
        let entries = ENTRIES
            .iter()
            .filter_map(|(code, description, keywords, billable)| {
                let code = Icd10Code::parse(code).ok()?;
                Some(CodeEntry {
                    code,
                    description: (*description).to_string(),
                    keywords: keywords.iter().map(|k| (*k).to_string()).collect(),
                    billable: *billable,
                })
            })
            .collect();
        Self { entries }
    }

    /// Build from custom entries
    pub fn from_entries(entries: Vec<CodeEntry>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CodeCatalog for BuiltinCatalog {
    async fn search(&self, term: &str, limit: usize) -> Result<Vec<CodeEntry>> {
        let term = term.trim();
        if term.is_empty() {
            return Err(CoderError::EmptyTerm);
        }

        let mut scored: Vec<(u32, &CodeEntry)> = self
            .entries
            .iter()
            .map(|entry| (entry.score(term), entry))
            .filter(|(score, _)| *score > 0)
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.code.cmp(&b.1.code)));

        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(_, entry)| entry.clone())
            .collect())
    }

    async fn get(&self, code: &Icd10Code) -> Result<Option<CodeEntry>> {
        Ok(self.entries.iter().find(|e| e.code == *code).cloned())
    }

    fn name(&self) -> &str {
        "builtin"
    }
}
