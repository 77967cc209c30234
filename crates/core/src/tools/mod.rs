//! # Collaborators
//!
//! External capabilities the stages call: branding extraction, documentation
//! search, browser validation and export.

pub mod branding;
pub mod browser;
pub mod docs;
pub mod exporter;

pub use branding::{BrandingExtractor, HttpBrandingExtractor};
pub use browser::BrowserValidator;
pub use docs::{DocsSearch, DocsToolset, HttpDocsSearch, UnconfiguredDocs};
pub use exporter::{Exporter, FileExporter};
