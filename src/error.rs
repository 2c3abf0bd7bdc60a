use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error(
        "Invalid version '{0}': expected two or three dot-separated numbers (e.g. 4.2 or 4.2.1)"
    )]
    InvalidVersion(String),

    #[error("Blender {0} is not installed\n\n\
             Hint: Run 'blenders installed' to see the versions managed on this machine.")]
    VersionNotInstalled(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Download verification failed: {0}")]
    VerificationFailed(String),

    #[error("Installation of Blender {version} failed: {reason}")]
    InstallFailed { version: String, reason: String },

    #[error("Unsupported platform: {0}\n\n\
             Hint: Blender builds are published for macOS, Windows and Linux only.")]
    UnsupportedPlatform(String),

    #[error("Another download is already in progress\n\n\
             Hint: Wait for the current installation to finish before starting a new one.")]
    DownloadInProgress,

    #[error("Failed to launch Blender: {0}")]
    LaunchFailed(String),

    #[error("{0}")]
    Other(String),
}
