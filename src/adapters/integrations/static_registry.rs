//! Offline registry. Used when the HTTP lookup is disabled, and in tests.

use crate::domain::{CompanyData, DomainError};
use crate::ports::RegistryLookup;
use std::collections::HashMap;
use tracing::info;

/// Answers from a fixed table; unknown tax ids fail like an unreachable registry.
#[derive(Default)]
pub struct StaticRegistry {
    companies: HashMap<String, CompanyData>,
}

impl StaticRegistry {
    /// Registry that knows nothing; every lookup fails.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn with_company(mut self, tax_id: &str, data: CompanyData) -> Self {
        self.companies.insert(tax_id.trim().to_string(), data);
        self
    }
}

#[async_trait::async_trait]
impl RegistryLookup for StaticRegistry {
    async fn lookup(&self, tax_id: &str) -> Result<CompanyData, DomainError> {
        match self.companies.get(tax_id.trim()) {
            Some(data) => Ok(data.clone()),
            None => {
                info!(tax_id, "[STATIC] registry has no entry");
                Err(DomainError::Registry("реестр недоступен".into()))
            }
        }
    }
}
