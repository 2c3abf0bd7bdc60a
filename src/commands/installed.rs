use anyhow::Result;
use blenders::InstallManager;

fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}

pub fn run() -> Result<()> {
    let mut manager = InstallManager::open_default()?;
    let installed = manager.installed()?;

    if installed.is_empty() {
        println!("No Blender versions installed.");
        println!();
        println!("Install one with: blenders install <version>");
        return Ok(());
    }

    let active = manager.config().active_version.clone();

    println!("Installed versions:");
    let mut total = 0;
    for version in &installed {
        let marker = if active.as_deref() == Some(version.version.as_str()) {
            "*"
        } else {
            " "
        };
        println!(
            "  {} {:<8} {:>10}  {}",
            marker,
            version.version,
            format_size(version.size_bytes),
            version.path.display()
        );
        total += version.size_bytes;
    }
    println!();
    println!("Total: {}", format_size(total));

    Ok(())
}
