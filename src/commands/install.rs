use anyhow::Result;
use blenders::{InstallManager, InstallPhase, LifecycleEvent, LifecycleObserver};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;

/// Progress bar fed by lifecycle events
fn create_progress_observer(bar: ProgressBar) -> LifecycleObserver {
    Arc::new(move |event: &LifecycleEvent| match event {
        LifecycleEvent::Progress { percent, .. } => bar.set_position(u64::from(*percent)),
        LifecycleEvent::Phase { phase, .. } => match phase {
            InstallPhase::Downloading => bar.set_message("Downloading"),
            InstallPhase::Verifying => bar.set_message("Verifying"),
            InstallPhase::Installing => bar.set_message("Installing"),
            InstallPhase::Registered => bar.finish_with_message("✓ Installed"),
            InstallPhase::Failed => bar.abandon_with_message("✗ Failed"),
            InstallPhase::Idle => {}
        },
    })
}

pub fn run(version: String, offline: bool) -> Result<()> {
    let mut manager = InstallManager::open_default()?;

    if manager.is_installed(&version) {
        println!("Blender {} is already installed.", version);
        return Ok(());
    }

    let descriptor = manager.resolve_descriptor(&version, offline)?;

    println!("Installing Blender {}", version);
    println!("  Source: {}", descriptor.source_url);
    println!();

    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{msg:12} [{bar:40.cyan/blue}] {pos:>3}%")?
            .progress_chars("=> "),
    );
    manager.set_observer(Some(create_progress_observer(bar)));

    let entry_point = manager.install(&descriptor)?;

    println!();
    println!("✓ Blender {} installed at {}", version, entry_point.display());
    println!();
    println!("Start it with: blenders launch {}", version);

    Ok(())
}
