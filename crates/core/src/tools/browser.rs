//! Headless-browser validation collaborator.

use anyhow::Result;
use async_trait::async_trait;

use crate::state::ValidationReport;

/// Executes a page in a browser and reports what broke
#[async_trait]
pub trait BrowserValidator: Send + Sync {
    async fn validate(&self, html: &str) -> Result<ValidationReport>;
}
