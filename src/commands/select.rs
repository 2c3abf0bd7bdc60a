use anyhow::Result;
use blenders::InstallManager;

pub fn run(version: String) -> Result<()> {
    let mut manager = InstallManager::open_default()?;

    if !manager.is_installed(&version) {
        println!("⚠ Blender {} is not installed", version);
    }
    manager.select(&version)?;

    println!("✓ Active version: {}", version);
    Ok(())
}
