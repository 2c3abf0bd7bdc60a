use anyhow::Result;
use blenders::InstallManager;

pub fn run(offline: bool) -> Result<()> {
    let mut manager = InstallManager::open_default()?;
    let entries = manager.catalog(offline)?;

    if entries.is_empty() {
        println!("No Blender versions found.");
        return Ok(());
    }

    println!("Blender versions:");
    for entry in &entries {
        let status = if entry.installed { "✓ installed" } else { "" };
        let active = if entry.active { "*" } else { " " };
        let year = entry.descriptor.release_year.as_deref().unwrap_or("");
        println!(
            "  {} {:<8} {:<6} {}",
            active, entry.descriptor.version, year, status
        );
    }
    println!();

    let installed = entries.iter().filter(|e| e.installed).count();
    println!(
        "{} version{}, {} installed",
        entries.len(),
        if entries.len() == 1 { "" } else { "s" },
        installed
    );

    if let Some(last_check) = manager.config().last_check {
        println!("Last checked: {}", last_check.format("%Y-%m-%d %H:%M:%S UTC"));
    }

    Ok(())
}
