//! Code Catalogs
//!
//! Abstractions over ICD-10-CM code sources.

mod builtin;

pub use builtin::BuiltinCatalog;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{CodeEntry, Icd10Code};

/// Code catalog trait (Strategy pattern)
///
/// Implement this for each code source: a licensed code file, a terminology
/// server, or the built-in table.
#[async_trait]
pub trait CodeCatalog: Send + Sync {
    /// Entries matching a free-text term, most relevant first
    async fn search(&self, term: &str, limit: usize) -> Result<Vec<CodeEntry>>;

    /// Exact entry for a code
    async fn get(&self, code: &Icd10Code) -> Result<Option<CodeEntry>>;

    /// Catalog name
    fn name(&self) -> &str;
}
