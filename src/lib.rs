//! blenders - Install, launch and manage multiple Blender versions
//!
//! blenders keeps several Blender releases side by side in one managed
//! directory. It provides:
//!
//! - A release catalog built from a curated list and the official release index
//! - Single-flight downloads with progress reporting on a worker thread
//! - Platform installers for disk images (macOS) and archives (Windows, Linux)
//! - An install state machine that rolls back partial installs on failure
//! - Reconciliation of recorded installs against what is actually on disk
//!
//! # Examples
//!
//! ```no_run
//! use blenders::InstallManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut manager = InstallManager::open_default()?;
//!
//! for entry in manager.catalog(false)? {
//!     let marker = if entry.installed { "*" } else { " " };
//!     println!("{} {}", marker, entry.descriptor.version);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`catalog`] - Known releases and the remote release index
//! - [`config`] - The persisted installation records
//! - [`download`] - Streaming downloads on a worker thread
//! - [`installer`] - Unpacking artifacts per platform
//! - [`launcher`] - Starting installed versions
//! - [`lifecycle`] - The install state machine and everything that mutates state
//! - [`platform`] - OS and architecture detection, artifact naming
//! - [`version`] - Version parsing and ordering
//! - [`error`] - Error types and result handling

pub mod catalog;
pub mod config;
pub mod download;
pub mod error;
pub mod installer;
pub mod launcher;
pub mod lifecycle;
pub mod logging;
pub mod platform;
pub mod version;

pub use catalog::{
    curated_versions, merge_versions, parse_listing, sort_newest_first, CatalogClient,
    VersionDescriptor, CURATED_RELEASES, RELEASE_INDEX_ENV, RELEASE_INDEX_URL,
};
pub use config::{Config, ConfigStore, CONFIG_DIR_ENV};
pub use download::{DownloadEvent, DownloadHandle, Downloader};
pub use error::{Error, Result};
pub use installer::{
    installer_for, ArchiveFormat, ArchiveInstaller, DiskImageInstaller, NoopInstaller,
    PlatformInstaller, SystemTools, ToolRunner,
};
pub use launcher::launch;
pub use lifecycle::{
    verify_artifact, CatalogEntry, InstallManager, InstallPhase, InstalledVersion,
    LifecycleEvent, LifecycleObserver,
};
pub use platform::{version_dir_name, Arch, Os, Platform};
pub use version::{normalize_version, BlenderVersion};
