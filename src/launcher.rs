//! Starting installed Blender versions
//!
//! Blender is started as a detached process: nothing waits for it to exit and
//! its output is not captured.

use crate::platform::{Os, Platform};
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// The command that starts the installation at `install_path`
///
/// macOS bundles are handed to `open`; on Windows and Linux the executable
/// inside the install directory is run directly.
pub fn launch_command(
    platform: &Platform,
    install_path: &Path,
) -> Result<(PathBuf, Vec<PathBuf>)> {
    match &platform.os {
        Os::MacOs => Ok((PathBuf::from("open"), vec![install_path.to_path_buf()])),
        Os::Windows | Os::Linux => Ok((
            install_path.join(platform.executable_name()),
            Vec::new(),
        )),
        Os::Other(name) => Err(Error::UnsupportedPlatform(name.clone())),
    }
}

/// Start Blender from `install_path` without waiting for it
pub fn launch(platform: &Platform, install_path: &Path) -> Result<()> {
    if !install_path.exists() {
        return Err(Error::LaunchFailed(format!(
            "{} does not exist",
            install_path.display()
        )));
    }

    let (program, args) = launch_command(platform, install_path)?;
    if program.is_absolute() && !program.is_file() {
        return Err(Error::LaunchFailed(format!(
            "executable not found at {}",
            program.display()
        )));
    }

    let child = Command::new(&program)
        .args(&args)
        .current_dir(install_path.parent().unwrap_or(install_path))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| Error::LaunchFailed(format!("{}: {}", program.display(), e)))?;

    tracing::info!(pid = child.id(), program = %program.display(), "launched Blender");
    Ok(())
}
