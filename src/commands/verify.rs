use anyhow::Result;
use blenders::InstallManager;

pub fn run() -> Result<()> {
    // Opening the manager reconciles the records with the disk
    let mut manager = InstallManager::open_default()?;
    let mut purged = manager.purged_at_open().to_vec();
    purged.extend(manager.verify_installations()?);

    if purged.is_empty() {
        println!("✓ All installations present");
    } else {
        for version in &purged {
            println!("  Removed stale record: Blender {}", version);
        }
        println!(
            "✓ Removed {} stale record{}",
            purged.len(),
            if purged.len() == 1 { "" } else { "s" }
        );
    }

    let installed = &manager.config().installed_versions;
    if !installed.is_empty() {
        println!();
        println!("Installed:");
        for (version, path) in installed {
            println!("  {} → {}", version, path.display());
        }
    }

    Ok(())
}
