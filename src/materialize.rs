// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Cloud provider detection and waiting for files to be available locally

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::CloudConfig;

/// Sync providers we recognise by path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloudProvider {
    ICloud,
    GoogleDrive,
    Dropbox,
    OneDrive,
}

impl CloudProvider {
    pub const ALL: [CloudProvider; 4] = [
        CloudProvider::ICloud,
        CloudProvider::GoogleDrive,
        CloudProvider::Dropbox,
        CloudProvider::OneDrive,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CloudProvider::ICloud => "iCloud Drive",
            CloudProvider::GoogleDrive => "Google Drive",
            CloudProvider::Dropbox => "Dropbox",
            CloudProvider::OneDrive => "OneDrive",
        }
    }

    /// Lower-case path fragments that identify the provider
    fn indicators(&self) -> &'static [&'static str] {
        match self {
            CloudProvider::ICloud => &["library/mobile documents/com~apple~clouddocs", "icloud"],
            CloudProvider::GoogleDrive => &["google drive", "googledrive"],
            CloudProvider::Dropbox => &["dropbox"],
            CloudProvider::OneDrive => &["onedrive"],
        }
    }

    /// Default sync folder, relative to the home directory
    fn default_base(&self) -> &'static str {
        match self {
            CloudProvider::ICloud => "Library/Mobile Documents/com~apple~CloudDocs",
            CloudProvider::GoogleDrive => "Google Drive",
            CloudProvider::Dropbox => "Dropbox",
            CloudProvider::OneDrive => "OneDrive",
        }
    }

    /// Detect the provider a path lives under
    pub fn detect(path: &Path) -> Option<CloudProvider> {
        let normalized = path.to_string_lossy().to_lowercase().replace('\\', "/");
        Self::ALL
            .into_iter()
            .find(|p| p.indicators().iter().any(|i| normalized.contains(i)))
    }

    /// The provider's sync folder, if it exists on this machine
    pub fn base_dir(&self) -> Option<PathBuf> {
        let base = dirs::home_dir()?.join(self.default_base());
        if base.is_dir() {
            Some(base)
        } else {
            None
        }
    }
}

/// Makes sure a file is fully present locally before we touch it
#[async_trait]
pub trait Materializer: Send + Sync {
    /// Returns false if the file did not become ready within the bounded wait
    async fn ensure_materialized(&self, path: &Path) -> bool;
}

/// Plain local folders: a file is ready as soon as it exists
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalMaterializer;

#[async_trait]
impl Materializer for LocalMaterializer {
    async fn ensure_materialized(&self, path: &Path) -> bool {
        path.is_file()
    }
}

/// Polls a cloud-synced file until its size is non-zero and stable
#[derive(Debug, Clone)]
pub struct StabilityMaterializer {
    poll_interval: Duration,
    timeout: Duration,
    stable_checks: u32,
}

impl StabilityMaterializer {
    pub fn new(poll_interval: Duration, timeout: Duration, stable_checks: u32) -> Self {
        Self {
            poll_interval,
            timeout,
            stable_checks: stable_checks.max(1),
        }
    }

    pub fn from_config(config: &CloudConfig) -> Self {
        Self::new(config.poll_interval(), config.timeout(), config.stable_checks)
    }
}

#[async_trait]
impl Materializer for StabilityMaterializer {
    async fn ensure_materialized(&self, path: &Path) -> bool {
        let start = Instant::now();
        let mut last_size: Option<u64> = None;
        let mut stable = 0u32;

        loop {
            match std::fs::metadata(path) {
                // Zero bytes is a placeholder that has not been downloaded yet
                Ok(meta) if meta.is_file() && meta.len() > 0 => {
                    let size = meta.len();
                    if last_size == Some(size) {
                        stable += 1;
                        if stable >= self.stable_checks {
                            return true;
                        }
                    } else {
                        stable = 0;
                    }
                    last_size = Some(size);
                    debug!("{:?} size {} (stable {}/{})", path, size, stable, self.stable_checks);
                }
                Ok(_) => {
                    stable = 0;
                    last_size = None;
                    debug!("Waiting for {:?} to download", path);
                }
                Err(_) => {
                    stable = 0;
                    last_size = None;
                    debug!("Waiting for {:?} to appear", path);
                }
            }

            if start.elapsed() >= self.timeout {
                warn!("Gave up waiting for {:?} after {:?}", path, self.timeout);
                return false;
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

/// Pick the materializer matching the root folder
pub fn materializer_for(root: &Path, config: &CloudConfig) -> Box<dyn Materializer> {
    match CloudProvider::detect(root) {
        Some(provider) => {
            info!("Working in a {} folder; files may take longer to process", provider.name());
            Box::new(StabilityMaterializer::from_config(config))
        }
        None => Box::new(LocalMaterializer),
    }
}

/// Check if a file should be picked up at all
pub fn should_process(path: &Path) -> bool {
    let filename = match path.file_name().and_then(|n| n.to_str()) {
        Some(n) => n,
        None => return false,
    };

    // Skip hidden files
    if filename.starts_with('.') {
        return false;
    }

    // Skip temporary and partial downloads
    let temp_extensions = [".tmp", ".part", ".crdownload", ".partial", ".download", ".icloud"];
    let lower = filename.to_lowercase();
    if temp_extensions.iter().any(|ext| lower.ends_with(ext)) {
        return false;
    }

    let skip_names = ["desktop.ini", "thumbs.db"];
    !skip_names.iter().any(|n| filename.eq_ignore_ascii_case(n))
}
