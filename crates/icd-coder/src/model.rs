//! Domain Models
//!
//! ICD-10-CM codes and catalog entries.

use serde::{Deserialize, Serialize};

use crate::error::{CoderError, Result};

/// A syntactically valid ICD-10-CM code, normalized to `A00.0000` form
///
/// Layout: a letter, a digit, a letter or digit (the category), then an
/// optional dot followed by one to four letters or digits.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Icd10Code(String);

impl Icd10Code {
    /// Parse and normalize a code; accepts lowercase and a missing dot
    pub fn parse(raw: &str) -> Result<Self> {
        let compact: String = raw
            .trim()
            .chars()
            .filter(|c| *c != '.')
            .map(|c| c.to_ascii_uppercase())
            .collect();

        let invalid = || CoderError::InvalidCode(raw.trim().to_string());
        let chars: Vec<char> = compact.chars().collect();

        if !(3..=7).contains(&chars.len()) || raw.matches('.').count() > 1 {
            return Err(invalid());
        }
        if !chars[0].is_ascii_alphabetic()
            || !chars[1].is_ascii_digit()
            || !chars[2].is_ascii_alphanumeric()
            || !chars[3..].iter().all(char::is_ascii_alphanumeric)
        {
            return Err(invalid());
        }
        if let Some(dot) = raw.trim().find('.') {
            if dot != 3 {
                return Err(invalid());
            }
        }

        let normalized = if chars.len() > 3 {
            format!("{}.{}", &compact[..3], &compact[3..])
        } else {
            compact
        };
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The three-character category, e.g. `E11` for `E11.9`
    pub fn category(&self) -> &str {
        &self.0[..3]
    }

    /// Whether this is a bare category without subdivision
    pub fn is_category(&self) -> bool {
        self.0.len() == 3
    }
}

impl std::fmt::Display for Icd10Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Icd10Code {
    type Error = CoderError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Icd10Code> for String {
    fn from(code: Icd10Code) -> Self {
        code.0
    }
}

/// One catalog entry
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CodeEntry {
    pub code: Icd10Code,
    pub description: String,
    /// Lowercase synonyms and abbreviations used for search
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Whether the code is specific enough to be billed
    pub billable: bool,
}

impl CodeEntry {
    /// Relevance of this entry for a search term; zero means no match
    pub fn score(&self, term: &str) -> u32 {
        let description = self.description.to_lowercase();
        let term = term.to_lowercase();
        let mut score = 0;

        if self.keywords.iter().any(|k| *k == term) {
            score += 4;
        }
        for token in term.split_whitespace() {
            if self.keywords.iter().any(|k| k == token) {
                score += 2;
            }
            if description.contains(token) {
                score += 1;
            }
        }
        score
    }
}

impl std::fmt::Display for CodeEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let billing = if self.billable { "billable" } else { "category, not billable" };
        write!(f, "{} - {} ({})", self.code, self.description, billing)
    }
}
