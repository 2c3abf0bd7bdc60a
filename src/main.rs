use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};

mod commands;

/// blenders - Install, launch and manage multiple Blender versions
#[derive(Parser)]
#[command(name = "blenders")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Show debug logs (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List known Blender versions and their install status
    List {
        /// Only show the built-in release list, skip the release index
        #[arg(long)]
        offline: bool,
    },

    /// Download and install a Blender version
    Install {
        /// Version to install (e.g., 4.2.1 or 4.2)
        version: String,

        /// Resolve the download location without fetching the release index
        #[arg(long)]
        offline: bool,
    },

    /// Remove an installed Blender version
    Uninstall {
        /// Version to remove
        version: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Start an installed Blender version
    Launch {
        /// Version to start
        version: String,
    },

    /// List installed versions with their size on disk
    Installed,

    /// Mark a version as the active one
    Select {
        /// Version to mark
        version: String,
    },

    /// Remove records of installations that no longer exist on disk
    Verify,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    let cli = Cli::parse();

    // A second subscriber is only possible in tests; nothing to report
    let _ = blenders::logging::init(cli.verbose);

    let result = match cli.command {
        Commands::List { offline } => commands::list::run(offline),
        Commands::Install { version, offline } => commands::install::run(version, offline),
        Commands::Uninstall { version, yes } => commands::uninstall::run(version, yes),
        Commands::Launch { version } => commands::launch::run(version),
        Commands::Installed => commands::installed::run(),
        Commands::Select { version } => commands::select::run(version),
        Commands::Verify => commands::verify::run(),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "blenders", &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
