//! Platform installers
//!
//! Turning a downloaded artifact into a runnable Blender is platform specific:
//!
//! - macOS ships a disk image; it is mounted with `hdiutil`, `Blender.app` is
//!   copied out and the image is detached ([`DiskImageInstaller`]).
//! - Windows and Linux ship `.zip` / `.tar.xz` archives that are unpacked in
//!   place ([`ArchiveInstaller`]).
//! - Anything else gets [`NoopInstaller`], which refuses to install.
//!
//! The installer is picked once per process with [`installer_for`].
//!
//! # Examples
//!
//! ```no_run
//! use blenders::{installer_for, Platform};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let installer = installer_for(&Platform::detect());
//! let entry_point = installer.install(
//!     Path::new("/tmp/blender-4.2.0-linux-x64.tar.xz"),
//!     Path::new("/tmp/versions/Blender 4.2"),
//! )?;
//! println!("Installed to {}", entry_point.display());
//! # Ok(())
//! # }
//! ```

use crate::platform::{Os, Platform};
use crate::{Error, Result};
use std::ffi::OsStr;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use xz2::read::XzDecoder;
use zip::ZipArchive;

/// Default mount point used for Blender disk images
pub const DEFAULT_MOUNT_POINT: &str = "/Volumes/Blender";

/// Application bundle name inside the disk image
pub const APP_BUNDLE_NAME: &str = "Blender.app";

/// Installs a downloaded artifact into a per-version directory
pub trait PlatformInstaller: Send + Sync {
    fn name(&self) -> &'static str;

    /// Install `artifact` into `target_dir` and return the runnable entry point
    ///
    /// On success the artifact has been consumed (deleted). On failure the
    /// caller is responsible for removing `target_dir`.
    fn install(&self, artifact: &Path, target_dir: &Path) -> Result<PathBuf>;

    /// Best-effort release of anything left behind by a failed install
    fn cleanup(&self) {}
}

/// Pick the installer for `platform`
pub fn installer_for(platform: &Platform) -> Box<dyn PlatformInstaller> {
    match &platform.os {
        Os::MacOs => Box::new(DiskImageInstaller::default()),
        Os::Windows => Box::new(ArchiveInstaller::new(
            ArchiveFormat::Zip,
            platform.executable_name(),
        )),
        Os::Linux => Box::new(ArchiveInstaller::new(
            ArchiveFormat::TarXz,
            platform.executable_name(),
        )),
        Os::Other(name) => Box::new(NoopInstaller::new(name)),
    }
}

// ============================================================================
// macOS disk images
// ============================================================================

/// Runs the command-line tools a disk image install shells out to
pub trait ToolRunner: Send + Sync {
    /// Run `program` with `args`, returning stdout or an error carrying stderr
    fn run(&self, program: &str, args: &[&OsStr]) -> Result<String>;
}

/// Runs tools from `PATH`
pub struct SystemTools;

impl ToolRunner for SystemTools {
    fn run(&self, program: &str, args: &[&OsStr]) -> Result<String> {
        run_tool(program, args)
    }
}

/// Mounts a `.dmg` with `hdiutil` and copies `Blender.app` out of it
pub struct DiskImageInstaller {
    mount_point: PathBuf,
    bundle_name: String,
    tools: Box<dyn ToolRunner>,
}

impl Default for DiskImageInstaller {
    fn default() -> Self {
        Self::new(DEFAULT_MOUNT_POINT)
    }
}

impl DiskImageInstaller {
    pub fn new<P: Into<PathBuf>>(mount_point: P) -> Self {
        Self {
            mount_point: mount_point.into(),
            bundle_name: APP_BUNDLE_NAME.to_string(),
            tools: Box::new(SystemTools),
        }
    }

    /// Use `tools` instead of the system `hdiutil` and `cp`
    pub fn with_tools(mut self, tools: Box<dyn ToolRunner>) -> Self {
        self.tools = tools;
        self
    }

    fn detach(&self) -> Result<String> {
        self.tools.run(
            "hdiutil",
            &[OsStr::new("detach"), self.mount_point.as_os_str()],
        )
    }
}

impl PlatformInstaller for DiskImageInstaller {
    fn name(&self) -> &'static str {
        "disk image"
    }

    fn install(&self, artifact: &Path, target_dir: &Path) -> Result<PathBuf> {
        if !artifact.exists() {
            return Err(Error::Other(format!(
                "Disk image not found at {}",
                artifact.display()
            )));
        }

        // A previous run may have left the image mounted
        if let Err(e) = self.detach() {
            tracing::debug!("stale mount not detached: {}", e);
        }

        let output = self.tools.run(
            "hdiutil",
            &[
                OsStr::new("attach"),
                OsStr::new("-nobrowse"),
                OsStr::new("-mountpoint"),
                self.mount_point.as_os_str(),
                artifact.as_os_str(),
            ],
        )?;
        tracing::debug!(output = %output.trim(), "disk image mounted");

        fs::create_dir_all(target_dir)?;

        let bundle = self.mount_point.join(&self.bundle_name);
        if !bundle.exists() {
            return Err(Error::Other(format!(
                "{} not found in {}",
                self.bundle_name,
                self.mount_point.display()
            )));
        }

        self.tools.run(
            "cp",
            &[OsStr::new("-R"), bundle.as_os_str(), target_dir.as_os_str()],
        )?;
        self.detach()?;

        fs::remove_file(artifact)?;
        Ok(target_dir.join(&self.bundle_name))
    }

    fn cleanup(&self) {
        let _ = self.detach();
    }
}

/// Run an external tool, returning stdout or an error carrying its stderr
fn run_tool(program: &str, args: &[&OsStr]) -> Result<String> {
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| Error::Other(format!("Failed to run {}: {}", program, e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Other(format!(
            "{} {} failed: {}",
            program,
            args.first()
                .map(|a| a.to_string_lossy().to_string())
                .unwrap_or_default(),
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

// ============================================================================
// Windows / Linux archives
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    TarXz,
}

/// Unpacks a `.zip` or `.tar.xz` release archive
pub struct ArchiveInstaller {
    format: ArchiveFormat,
    executable: String,
}

impl ArchiveInstaller {
    pub fn new(format: ArchiveFormat, executable: &str) -> Self {
        Self {
            format,
            executable: executable.to_string(),
        }
    }

    fn extract(&self, artifact: &Path, target_dir: &Path) -> Result<()> {
        match self.format {
            ArchiveFormat::TarXz => extract_tar_xz(artifact, target_dir),
            ArchiveFormat::Zip => extract_zip(artifact, target_dir),
        }
    }
}

impl PlatformInstaller for ArchiveInstaller {
    fn name(&self) -> &'static str {
        match self.format {
            ArchiveFormat::Zip => "zip archive",
            ArchiveFormat::TarXz => "tar.xz archive",
        }
    }

    fn install(&self, artifact: &Path, target_dir: &Path) -> Result<PathBuf> {
        if !artifact.exists() {
            return Err(Error::Other(format!(
                "Archive not found at {}",
                artifact.display()
            )));
        }

        fs::create_dir_all(target_dir)?;
        self.extract(artifact, target_dir)?;

        let entry_point = find_entry_point(target_dir, &self.executable)?;
        fs::remove_file(artifact)?;
        Ok(entry_point)
    }
}

fn extract_tar_xz(artifact: &Path, target_dir: &Path) -> Result<()> {
    let file = File::open(artifact)?;
    let mut archive = tar::Archive::new(XzDecoder::new(file));
    archive.set_preserve_permissions(true);

    for entry in archive.entries()? {
        let mut entry = entry?;
        if !entry.unpack_in(target_dir)? {
            return Err(Error::Other(format!(
                "Archive entry escapes install directory: {}",
                entry.path()?.display()
            )));
        }
    }
    Ok(())
}

fn extract_zip(artifact: &Path, target_dir: &Path) -> Result<()> {
    let file = File::open(artifact)?;
    let mut archive =
        ZipArchive::new(file).map_err(|e| Error::Other(format!("Invalid zip archive: {}", e)))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| Error::Other(format!("Invalid zip entry: {}", e)))?;
        let out_path = match entry.enclosed_name() {
            Some(path) => target_dir.join(path),
            None => {
                return Err(Error::Other(format!(
                    "Archive entry escapes install directory: {}",
                    entry.name()
                )))
            }
        };

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out_file = File::create(&out_path)?;
        io::copy(&mut entry, &mut out_file)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                fs::set_permissions(&out_path, fs::Permissions::from_mode(mode))?;
            }
        }
    }
    Ok(())
}

/// Directory holding `executable`: the install directory itself or its
/// top-level folder (official archives unpack into `blender-{version}-{os}-x64/`)
fn find_entry_point(target_dir: &Path, executable: &str) -> Result<PathBuf> {
    if target_dir.join(executable).is_file() {
        return Ok(target_dir.to_path_buf());
    }

    for entry in fs::read_dir(target_dir)?.flatten() {
        let path = entry.path();
        if path.is_dir() && path.join(executable).is_file() {
            return Ok(path);
        }
    }

    Err(Error::Other(format!(
        "{} not found in extracted archive at {}",
        executable,
        target_dir.display()
    )))
}

// ============================================================================
// Unsupported platforms
// ============================================================================

/// Installer for platforms without Blender builds; always fails
pub struct NoopInstaller {
    platform: String,
}

impl NoopInstaller {
    pub fn new(platform: &str) -> Self {
        Self {
            platform: platform.to_string(),
        }
    }
}

impl PlatformInstaller for NoopInstaller {
    fn name(&self) -> &'static str {
        "unsupported"
    }

    fn install(&self, _artifact: &Path, _target_dir: &Path) -> Result<PathBuf> {
        Err(Error::UnsupportedPlatform(self.platform.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::Arch;
    use std::io::Write;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Build a .tar.xz laid out like an official Linux build
    fn create_test_tar_xz(dir: &Path, top_level: &str) -> PathBuf {
        let path = dir.join(format!("{}.tar.xz", top_level));
        let encoder = xz2::write::XzEncoder::new(File::create(&path).unwrap(), 6);
        let mut builder = tar::Builder::new(encoder);

        let files: [(&str, &[u8], u32); 2] = [
            ("blender", b"#!/bin/sh\necho blender\n", 0o755),
            ("readme.html", b"<html></html>", 0o644),
        ];
        for (name, content, mode) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(mode);
            header.set_cksum();
            builder
                .append_data(&mut header, format!("{}/{}", top_level, name), content)
                .unwrap();
        }

        builder.into_inner().unwrap().finish().unwrap();
        path
    }

    fn create_test_zip(dir: &Path, entries: &[(&str, &[u8])]) -> PathBuf {
        let path = dir.join("blender.zip");
        let mut writer = zip::ZipWriter::new(File::create(&path).unwrap());
        let options = zip::write::FileOptions::default();
        for (name, content) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content).unwrap();
        }
        writer.finish().unwrap();
        path
    }

    #[test]
    fn test_installer_selection() {
        assert_eq!(
            installer_for(&Platform::new(Os::MacOs, Arch::Arm64)).name(),
            "disk image"
        );
        assert_eq!(
            installer_for(&Platform::new(Os::Windows, Arch::X64)).name(),
            "zip archive"
        );
        assert_eq!(
            installer_for(&Platform::new(Os::Linux, Arch::X64)).name(),
            "tar.xz archive"
        );
        assert_eq!(
            installer_for(&Platform::new(Os::Other("haiku".to_string()), Arch::X64)).name(),
            "unsupported"
        );
    }

    #[test]
    fn test_tar_xz_install() {
        let temp_dir = TempDir::new().unwrap();
        let artifact = create_test_tar_xz(temp_dir.path(), "blender-4.2.0-linux-x64");
        let target = temp_dir.path().join("versions").join("Blender 4.2");

        let installer = ArchiveInstaller::new(ArchiveFormat::TarXz, "blender");
        let entry_point = installer.install(&artifact, &target).unwrap();

        assert_eq!(entry_point, target.join("blender-4.2.0-linux-x64"));
        assert!(entry_point.join("blender").is_file());
        assert!(!artifact.exists(), "archive should be deleted after install");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(entry_point.join("blender"))
                .unwrap()
                .permissions()
                .mode();
            assert!(mode & 0o111 != 0, "executable bit should survive extraction");
        }
    }

    #[test]
    fn test_zip_install_flat_layout() {
        let temp_dir = TempDir::new().unwrap();
        let artifact = create_test_zip(
            temp_dir.path(),
            &[("blender.exe", b"MZ"), ("config/startup.blend", b"data")],
        );
        let target = temp_dir.path().join("Blender 3.6.5");

        let installer = ArchiveInstaller::new(ArchiveFormat::Zip, "blender.exe");
        let entry_point = installer.install(&artifact, &target).unwrap();

        assert_eq!(entry_point, target);
        assert!(target.join("config/startup.blend").is_file());
    }

    #[test]
    fn test_zip_rejects_escaping_entries() {
        let temp_dir = TempDir::new().unwrap();
        let artifact = create_test_zip(temp_dir.path(), &[("../evil.exe", b"MZ")]);
        let target = temp_dir.path().join("target");

        let installer = ArchiveInstaller::new(ArchiveFormat::Zip, "blender.exe");
        let result = installer.install(&artifact, &target);
        assert!(result.is_err());
        assert!(!temp_dir.path().join("evil.exe").exists());
    }

    #[test]
    fn test_archive_without_executable_fails() {
        let temp_dir = TempDir::new().unwrap();
        let artifact = create_test_zip(temp_dir.path(), &[("notes.txt", b"hello")]);
        let target = temp_dir.path().join("target");

        let installer = ArchiveInstaller::new(ArchiveFormat::Zip, "blender.exe");
        let err = installer.install(&artifact, &target).unwrap_err();
        assert!(err.to_string().contains("blender.exe not found"));
        assert!(artifact.exists(), "archive is kept when install fails");
    }

    #[test]
    fn test_missing_artifact() {
        let temp_dir = TempDir::new().unwrap();
        let installer = ArchiveInstaller::new(ArchiveFormat::TarXz, "blender");
        let result = installer.install(&temp_dir.path().join("nope.tar.xz"), temp_dir.path());
        assert!(result.unwrap_err().to_string().contains("Archive not found"));
    }

    #[test]
    fn test_noop_installer_refuses() {
        let temp_dir = TempDir::new().unwrap();
        let installer = NoopInstaller::new("freebsd");
        let result = installer.install(temp_dir.path(), temp_dir.path());
        assert!(matches!(result, Err(Error::UnsupportedPlatform(p)) if p == "freebsd"));
    }

    #[test]
    fn test_disk_image_missing_artifact() {
        let temp_dir = TempDir::new().unwrap();
        let installer = DiskImageInstaller::new(temp_dir.path().join("mnt"));
        let result = installer.install(&temp_dir.path().join("missing.dmg"), temp_dir.path());
        assert!(result.unwrap_err().to_string().contains("Disk image not found"));

        // Cleanup never fails, even without hdiutil on the machine
        installer.cleanup();
    }

    // ========================================================================
    // Disk images with recorded tool calls
    // ========================================================================

    /// Stands in for `hdiutil`; `cp` runs for real
    #[derive(Clone, Default)]
    struct RecordingTools {
        calls: Arc<Mutex<Vec<String>>>,
        mount_point: PathBuf,
        bundle_in_image: bool,
        attach_stderr: Option<String>,
    }

    impl RecordingTools {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ToolRunner for RecordingTools {
        fn run(&self, program: &str, args: &[&OsStr]) -> Result<String> {
            let argv: Vec<String> = args.iter().map(|a| a.to_string_lossy().to_string()).collect();
            self.calls
                .lock()
                .unwrap()
                .push(format!("{} {}", program, argv.join(" ")));

            match (program, argv.first().map(String::as_str)) {
                ("hdiutil", Some("attach")) => {
                    if let Some(stderr) = &self.attach_stderr {
                        return Err(Error::Other(format!("hdiutil attach failed: {}", stderr)));
                    }
                    let macos = self.mount_point.join(APP_BUNDLE_NAME).join("Contents/MacOS");
                    fs::create_dir_all(&self.mount_point)?;
                    if self.bundle_in_image {
                        fs::create_dir_all(&macos)?;
                        fs::write(macos.join("Blender"), b"binary")?;
                    }
                    Ok(format!("/dev/disk4s1\t{}\n", self.mount_point.display()))
                }
                ("hdiutil", _) => Ok(String::new()),
                _ => SystemTools.run(program, args),
            }
        }
    }

    struct DiskImageFixture {
        temp_dir: TempDir,
        tools: RecordingTools,
        artifact: PathBuf,
        target: PathBuf,
    }

    impl DiskImageFixture {
        fn new(bundle_in_image: bool, attach_stderr: Option<&str>) -> Self {
            let temp_dir = TempDir::new().unwrap();
            let artifact = temp_dir.path().join("blender-4.2.0-macos-arm64.dmg");
            fs::write(&artifact, b"dmg").unwrap();

            let tools = RecordingTools {
                mount_point: temp_dir.path().join("Volumes").join("Blender"),
                bundle_in_image,
                attach_stderr: attach_stderr.map(str::to_string),
                ..Default::default()
            };
            let target = temp_dir.path().join("versions").join("Blender 4.2");

            Self {
                temp_dir,
                tools,
                artifact,
                target,
            }
        }

        fn installer(&self) -> DiskImageInstaller {
            DiskImageInstaller::new(&self.tools.mount_point)
                .with_tools(Box::new(self.tools.clone()))
        }

        fn detach_call(&self) -> String {
            format!("hdiutil detach {}", self.tools.mount_point.display())
        }

        fn attach_call(&self) -> String {
            format!(
                "hdiutil attach -nobrowse -mountpoint {} {}",
                self.tools.mount_point.display(),
                self.artifact.display()
            )
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_disk_image_install_copies_bundle() {
        let fixture = DiskImageFixture::new(true, None);
        let installer = fixture.installer();

        let entry_point = installer.install(&fixture.artifact, &fixture.target).unwrap();

        assert_eq!(entry_point, fixture.target.join(APP_BUNDLE_NAME));
        assert!(entry_point.join("Contents/MacOS/Blender").is_file());
        assert!(!fixture.artifact.exists(), "image should be deleted after install");
        assert!(fixture.temp_dir.path().join("versions").is_dir());

        let bundle = fixture.tools.mount_point.join(APP_BUNDLE_NAME);
        assert_eq!(
            fixture.tools.calls(),
            vec![
                fixture.detach_call(),
                fixture.attach_call(),
                format!("cp -R {} {}", bundle.display(), fixture.target.display()),
                fixture.detach_call(),
            ]
        );
    }

    #[test]
    fn test_disk_image_without_bundle_fails_and_cleanup_detaches() {
        let fixture = DiskImageFixture::new(false, None);
        let installer = fixture.installer();

        let err = installer.install(&fixture.artifact, &fixture.target).unwrap_err();
        assert!(err.to_string().contains("Blender.app not found"));
        assert!(!fixture.target.join(APP_BUNDLE_NAME).exists());
        assert!(fixture.artifact.exists(), "image is kept when install fails");

        installer.cleanup();
        let calls = fixture.tools.calls();
        assert_eq!(calls[..2], [fixture.detach_call(), fixture.attach_call()]);
        assert!(!calls.iter().any(|c| c.starts_with("cp ")));
        assert_eq!(calls.last(), Some(&fixture.detach_call()));
    }

    #[test]
    fn test_disk_image_attach_failure_carries_stderr() {
        let fixture = DiskImageFixture::new(true, Some("no mountable file systems"));
        let installer = fixture.installer();

        let err = installer.install(&fixture.artifact, &fixture.target).unwrap_err();
        assert!(err.to_string().contains("no mountable file systems"));
        assert!(!fixture.target.exists());
        assert_eq!(
            fixture.tools.calls(),
            vec![fixture.detach_call(), fixture.attach_call()]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_run_tool_reports_stderr() {
        let err = run_tool(
            "sh",
            &[
                OsStr::new("-c"),
                OsStr::new("echo 'hdiutil: attach failed' >&2; exit 1"),
            ],
        )
        .unwrap_err();

        assert!(err.to_string().contains("hdiutil: attach failed"));
        assert!(err.to_string().starts_with("sh -c failed"));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_tool_returns_stdout() {
        let output = run_tool("sh", &[OsStr::new("-c"), OsStr::new("echo mounted")]).unwrap();
        assert_eq!(output.trim(), "mounted");
    }
}
