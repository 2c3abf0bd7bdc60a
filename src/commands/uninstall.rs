use anyhow::Result;
use blenders::InstallManager;
use std::io::{self, Write};

pub fn run(version: String, yes: bool) -> Result<()> {
    let mut manager = InstallManager::open_default()?;

    if !manager.config().installed_versions.contains_key(&version) {
        println!("⚠ Blender {} is not installed", version);
        return Ok(());
    }

    if !yes {
        print!("Remove Blender {}? (yes/no): ", version);
        io::stdout().flush()?;

        let mut confirmation = String::new();
        io::stdin().read_line(&mut confirmation)?;
        let confirmation = confirmation.trim().to_lowercase();

        if confirmation != "yes" && confirmation != "y" {
            println!("Uninstall cancelled.");
            return Ok(());
        }
    }

    if manager.uninstall(&version)? {
        println!("✓ Uninstalled Blender {}", version);
    }

    Ok(())
}
