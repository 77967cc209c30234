//! # Exporter
//!
//! Persists the final landing page. The exported file is the only durable
//! artifact of a run.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Local;
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::state::{BrandingData, FeaturePlan};

const MAX_NAME_ATTEMPTS: usize = 1000;

/// Storage collaborator; returns where the page was written
#[async_trait]
pub trait Exporter: Send + Sync {
    async fn export(&self, html: &str, branding: &BrandingData, plan: &FeaturePlan)
        -> Result<String>;
}

/// Writes pages to `<dir>/<slug>_<timestamp>.html`
pub struct FileExporter {
    dir: PathBuf,
}

impl FileExporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Create `<stem>.html`, or `<stem>_N.html` when that name is taken
    async fn create_unique(&self, stem: &str) -> Result<(PathBuf, fs::File)> {
        for n in 0..MAX_NAME_ATTEMPTS {
            let name = match n {
                0 => format!("{}.html", stem),
                n => format!("{}_{}.html", stem, n + 1),
            };
            let path = self.dir.join(name);
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("Failed to write landing page: {:?}", path))
                }
            }
        }
        anyhow::bail!("No free export file name for {} in {:?}", stem, self.dir)
    }
}

/// Lower-case, alphanumeric words joined by `_`
fn slug(title: &str) -> String {
    let slug = title
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join("_");
    if slug.is_empty() {
        "landing_page".to_string()
    } else {
        slug
    }
}

#[async_trait]
impl Exporter for FileExporter {
    async fn export(
        &self,
        html: &str,
        _branding: &BrandingData,
        plan: &FeaturePlan,
    ) -> Result<String> {
        fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create export directory: {:?}", self.dir))?;

        let stem = format!(
            "{}_{}",
            slug(&plan.page_title),
            Local::now().format("%Y%m%d_%H%M%S")
        );
        let (path, mut file) = self.create_unique(&stem).await?;
        file.write_all(html.as_bytes())
            .await
            .with_context(|| format!("Failed to write landing page: {:?}", path))?;
        file.flush().await?;

        info!(path = %path.display(), bytes = html.len(), "Landing page exported");
        Ok(path.display().to_string())
    }
}
