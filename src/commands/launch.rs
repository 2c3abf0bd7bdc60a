use anyhow::Result;
use blenders::InstallManager;

pub fn run(version: String) -> Result<()> {
    let mut manager = InstallManager::open_default()?;
    manager.launch(&version)?;

    println!("✓ Started Blender {}", version);
    Ok(())
}
