//! Installation lifecycle
//!
//! [`InstallManager`] owns the configuration and drives every change to it.
//! An install walks through
//!
//! ```text
//! Idle -> Downloading -> Verifying -> Installing -> Registered -> Idle
//!              |             |             |
//!              +-------------+-------------+--> Failed -> Idle
//! ```
//!
//! and always ends back in `Idle`, whatever happened. Failures are reported as
//! a single [`Error::InstallFailed`] after the partial state has been cleaned
//! up. Only one install runs at a time.
//!
//! # Examples
//!
//! ```no_run
//! use blenders::InstallManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut manager = InstallManager::open_default()?;
//! let descriptor = manager.resolve_descriptor("4.2.1", false)?;
//! let entry_point = manager.install(&descriptor)?;
//! println!("Blender 4.2.1 installed at {}", entry_point.display());
//! # Ok(())
//! # }
//! ```

use crate::catalog::{sort_newest_first, CatalogClient, VersionDescriptor};
use crate::config::{Config, ConfigStore};
use crate::download::{DownloadEvent, Downloader};
use crate::installer::{installer_for, PlatformInstaller};
use crate::platform::{version_dir_name, Platform};
use crate::version::BlenderVersion;
use crate::{launcher, Error, Result};
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;
use walkdir::WalkDir;

/// Name of the install root inside the config directory
pub const VERSIONS_DIR_NAME: &str = "versions";

/// Where an install currently is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallPhase {
    Idle,
    Downloading,
    Verifying,
    Installing,
    Registered,
    Failed,
}

/// Notification sent to the observer while an install runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    Phase { version: String, phase: InstallPhase },
    Progress { version: String, percent: u8 },
}

/// Observer for install progress
pub type LifecycleObserver = Arc<dyn Fn(&LifecycleEvent) + Send + Sync>;

/// One row of the catalog view
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub descriptor: VersionDescriptor,
    pub installed: bool,
    pub install_path: Option<PathBuf>,
    pub active: bool,
}

/// An installed version with its footprint on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledVersion {
    pub version: String,
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Owns the configuration and runs installs, uninstalls and reconciliation
pub struct InstallManager {
    store: ConfigStore,
    catalog: CatalogClient,
    platform: Platform,
    installer: Box<dyn PlatformInstaller>,
    downloader: Downloader,
    install_root: PathBuf,
    phase: InstallPhase,
    observer: Option<LifecycleObserver>,
    purged_at_open: Vec<String>,
}

impl InstallManager {
    /// Create a manager and reconcile the stored records with the disk
    ///
    /// Versions are installed under `versions/` next to the config file.
    pub fn new(
        store: ConfigStore,
        catalog: CatalogClient,
        platform: Platform,
        installer: Box<dyn PlatformInstaller>,
    ) -> Result<Self> {
        Self::with_downloader(store, catalog, platform, installer, Downloader::new()?)
    }

    /// Manager for this machine: default config location, detected platform
    ///
    /// Downloads share the process-wide slot with every other manager opened
    /// this way.
    pub fn open_default() -> Result<Self> {
        let store = ConfigStore::load_default()?;
        let catalog = CatalogClient::from_env()?;
        let platform = Platform::detect();
        let installer = installer_for(&platform);
        Self::with_downloader(
            store,
            catalog,
            platform,
            installer,
            Downloader::process_wide()?,
        )
    }

    /// Like [`InstallManager::new`], downloading through `downloader`
    pub fn with_downloader(
        store: ConfigStore,
        catalog: CatalogClient,
        platform: Platform,
        installer: Box<dyn PlatformInstaller>,
        downloader: Downloader,
    ) -> Result<Self> {
        let install_root = store.dir().join(VERSIONS_DIR_NAME);
        fs::create_dir_all(&install_root)?;

        let mut manager = Self {
            store,
            catalog,
            platform,
            installer,
            downloader,
            install_root,
            phase: InstallPhase::Idle,
            observer: None,
            purged_at_open: Vec::new(),
        };
        manager.purged_at_open = manager.verify_installations()?;
        Ok(manager)
    }

    pub fn with_observer(mut self, observer: LifecycleObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn set_observer(&mut self, observer: Option<LifecycleObserver>) {
        self.observer = observer;
    }

    /// Versions whose stale records were removed when the manager was created
    pub fn purged_at_open(&self) -> &[String] {
        &self.purged_at_open
    }

    pub fn phase(&self) -> InstallPhase {
        self.phase
    }

    pub fn config(&self) -> &Config {
        self.store.config()
    }

    pub fn config_path(&self) -> &Path {
        self.store.path()
    }

    pub fn install_root(&self) -> &Path {
        &self.install_root
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    pub fn catalog_client(&self) -> &CatalogClient {
        &self.catalog
    }

    /// Directory a version is installed into
    pub fn version_dir(&self, version: &str) -> PathBuf {
        self.install_root.join(version_dir_name(version))
    }

    /// Where the artifact for `version` is downloaded to
    pub fn artifact_path(&self, version: &str) -> Result<PathBuf> {
        Ok(self
            .install_root
            .join(self.platform.artifact_name(version)?))
    }

    pub fn resolve_descriptor(&self, version: &str, offline: bool) -> Result<VersionDescriptor> {
        self.catalog.descriptor_for(version, offline)
    }

    // ========================================================================
    // Reconciliation and views
    // ========================================================================

    /// Drop records whose install path no longer exists
    ///
    /// Persists once if anything was removed and returns the removed versions.
    pub fn verify_installations(&mut self) -> Result<Vec<String>> {
        let stale = self.store.config().stale_versions();
        if stale.is_empty() {
            return Ok(stale);
        }

        for version in &stale {
            tracing::info!(%version, "removing stale installation record");
        }
        self.store.update(|config| {
            for version in &stale {
                config.installed_versions.remove(version);
            }
        })?;

        Ok(stale)
    }

    /// The catalog with install status, newest first
    ///
    /// Installed versions the catalog does not list (e.g. "4.2" next to the
    /// curated "4.2.0") are shown too. With `offline` set, only the curated
    /// list is used and `last_check` is left alone.
    pub fn catalog(&mut self, offline: bool) -> Result<Vec<CatalogEntry>> {
        self.verify_installations()?;

        let mut descriptors = if offline {
            self.catalog.curated()
        } else {
            self.catalog.list_versions()
        };

        let unlisted: Vec<String> = self
            .store
            .config()
            .installed_versions
            .keys()
            .filter(|version| !descriptors.iter().any(|d| &d.version == *version))
            .cloned()
            .collect();
        for version in unlisted {
            match self.catalog.default_source_url(&version) {
                Ok(url) => descriptors.push(VersionDescriptor::new(&version, url.as_str())),
                Err(e) => tracing::warn!(%version, "ignoring installed version: {}", e),
            }
        }
        let descriptors = sort_newest_first(descriptors);

        if !offline {
            self.store
                .update(|config| config.last_check = Some(Utc::now()))?;
        }

        let config = self.store.config();
        Ok(descriptors
            .into_iter()
            .map(|descriptor| {
                let install_path = config
                    .installed_versions
                    .get(&descriptor.version)
                    .filter(|path| path.exists())
                    .cloned();
                CatalogEntry {
                    installed: install_path.is_some(),
                    active: config.active_version.as_deref() == Some(descriptor.version.as_str()),
                    install_path,
                    descriptor,
                }
            })
            .collect())
    }

    /// True if `version` is recorded and its path exists right now
    pub fn is_installed(&self, version: &str) -> bool {
        self.store.config().is_installed(version)
    }

    /// Installed versions with their size on disk, newest first
    pub fn installed(&mut self) -> Result<Vec<InstalledVersion>> {
        self.verify_installations()?;

        let mut installed: Vec<(Option<BlenderVersion>, InstalledVersion)> = self
            .store
            .config()
            .installed_versions
            .iter()
            .map(|(version, path)| {
                let size_bytes = WalkDir::new(path)
                    .into_iter()
                    .filter_map(|entry| entry.ok())
                    .filter_map(|entry| entry.metadata().ok())
                    .filter(|metadata| metadata.is_file())
                    .map(|metadata| metadata.len())
                    .sum();
                (
                    BlenderVersion::parse(version).ok(),
                    InstalledVersion {
                        version: version.clone(),
                        path: path.clone(),
                        size_bytes,
                    },
                )
            })
            .collect();

        installed.sort_by(|(a, _), (b, _)| b.cmp(a));
        Ok(installed.into_iter().map(|(_, v)| v).collect())
    }

    /// Remember `version` as the selected one
    pub fn select(&mut self, version: &str) -> Result<()> {
        BlenderVersion::parse(version)?;
        self.store
            .update(|config| config.active_version = Some(version.to_string()))
    }

    /// Start an installed version
    pub fn launch(&mut self, version: &str) -> Result<()> {
        self.verify_installations()?;

        let path = self
            .store
            .config()
            .installed_versions
            .get(version)
            .cloned()
            .ok_or_else(|| Error::VersionNotInstalled(version.to_string()))?;

        launcher::launch(&self.platform, &path)
    }

    // ========================================================================
    // Uninstall
    // ========================================================================

    /// Remove an installed version
    ///
    /// Returns `false` without touching anything if the version has no record.
    pub fn uninstall(&mut self, version: &str) -> Result<bool> {
        if !self.store.config().installed_versions.contains_key(version) {
            return Ok(false);
        }

        let version_dir = self.version_dir(version);
        if version_dir.exists() {
            fs::remove_dir_all(&version_dir)?;
            tracing::info!(path = %version_dir.display(), "removed installation");
        } else {
            tracing::warn!(path = %version_dir.display(), "install directory already gone");
        }

        self.store.update(|config| {
            config.installed_versions.remove(version);
        })?;
        Ok(true)
    }

    // ========================================================================
    // Install
    // ========================================================================

    /// Download and install `descriptor`, returning the registered entry point
    pub fn install(&mut self, descriptor: &VersionDescriptor) -> Result<PathBuf> {
        if self.phase != InstallPhase::Idle || self.downloader.is_busy() {
            return Err(Error::DownloadInProgress);
        }

        let version = descriptor.version.clone();
        BlenderVersion::parse(&version)?;

        if self.is_installed(&version) {
            return Err(Error::Other(format!(
                "Blender {} is already installed",
                version
            )));
        }

        match self.run_install(descriptor) {
            Ok(entry_point) => {
                self.transition(&version, InstallPhase::Registered);
                self.transition(&version, InstallPhase::Idle);
                tracing::info!(%version, path = %entry_point.display(), "installation completed");
                Ok(entry_point)
            }
            Err(e) => {
                self.transition(&version, InstallPhase::Failed);
                self.transition(&version, InstallPhase::Idle);
                tracing::error!(%version, "installation failed: {}", e);
                Err(Error::InstallFailed {
                    version,
                    reason: e.to_string(),
                })
            }
        }
    }

    fn run_install(&mut self, descriptor: &VersionDescriptor) -> Result<PathBuf> {
        let version = descriptor.version.as_str();
        let artifact_name = self.platform.artifact_name(version)?;
        let url = descriptor.artifact_url(&artifact_name)?;
        let artifact = self.install_root.join(&artifact_name);
        let target_dir = self.version_dir(version);

        // Leftovers of an unregistered install would mix with the new files
        if target_dir.exists() {
            fs::remove_dir_all(&target_dir)?;
        }

        self.transition(version, InstallPhase::Downloading);
        self.download(version, &url, &artifact)?;

        self.transition(version, InstallPhase::Verifying);
        verify_artifact(&artifact)?;

        self.transition(version, InstallPhase::Installing);
        let registered = self
            .installer
            .install(&artifact, &target_dir)
            .and_then(|entry_point| self.register(version, entry_point));

        registered.inspect_err(|_| self.rollback(&target_dir))
    }

    fn download(&mut self, version: &str, url: &Url, artifact: &Path) -> Result<()> {
        let handle = self.downloader.start(url, artifact)?;

        for event in handle {
            match event {
                DownloadEvent::Progress(percent) => self.emit(&LifecycleEvent::Progress {
                    version: version.to_string(),
                    percent,
                }),
                DownloadEvent::Completed { bytes, .. } => {
                    tracing::debug!(%version, bytes, "artifact downloaded");
                    return Ok(());
                }
                DownloadEvent::Failed(reason) => {
                    if artifact.exists() {
                        let _ = fs::remove_file(artifact);
                    }
                    return Err(Error::DownloadFailed(reason));
                }
            }
        }

        Err(Error::DownloadFailed(
            "download ended without a result".to_string(),
        ))
    }

    fn register(&mut self, version: &str, entry_point: PathBuf) -> Result<PathBuf> {
        self.store.update(|config| {
            config
                .installed_versions
                .insert(version.to_string(), entry_point.clone());
        })?;
        Ok(entry_point)
    }

    /// Undo a failed install; errors here are only logged
    fn rollback(&self, target_dir: &Path) {
        if target_dir.exists() {
            if let Err(e) = fs::remove_dir_all(target_dir) {
                tracing::warn!(
                    path = %target_dir.display(),
                    "failed to remove partial install: {}",
                    e
                );
            }
        }
        self.installer.cleanup();
    }

    fn transition(&mut self, version: &str, phase: InstallPhase) {
        tracing::debug!(%version, from = ?self.phase, to = ?phase, "install phase");
        self.phase = phase;
        self.emit(&LifecycleEvent::Phase {
            version: version.to_string(),
            phase,
        });
    }

    fn emit(&self, event: &LifecycleEvent) {
        if let Some(observer) = &self.observer {
            observer(event);
        }
    }
}

/// Second check on a finished download: the file must exist and be non-empty
pub fn verify_artifact(artifact: &Path) -> Result<()> {
    let metadata = fs::metadata(artifact).map_err(|_| {
        Error::VerificationFailed(format!("{} not found", artifact.display()))
    })?;

    if metadata.len() == 0 {
        return Err(Error::VerificationFailed(format!(
            "{} is empty",
            artifact.display()
        )));
    }
    Ok(())
}
