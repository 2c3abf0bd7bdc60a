//! Streaming artifact downloads
//!
//! A download runs on its own worker thread and reports back over a channel.
//! The worker is the only producer, so events arrive in the order chunks were
//! written, and exactly one terminal event ([`DownloadEvent::Completed`] or
//! [`DownloadEvent::Failed`]) ends the stream.
//!
//! # Examples
//!
//! ```no_run
//! use blenders::{DownloadEvent, Downloader};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let downloader = Downloader::new()?;
//! let url = url::Url::parse(
//!     "https://download.blender.org/release/Blender4.2/blender-4.2.0-linux-x64.tar.xz",
//! )?;
//! let handle = downloader.start(&url, Path::new("/tmp/blender.tar.xz"))?;
//!
//! for event in handle {
//!     match event {
//!         DownloadEvent::Progress(percent) => println!("{}%", percent),
//!         DownloadEvent::Completed { bytes, .. } => println!("done, {} bytes", bytes),
//!         DownloadEvent::Failed(reason) => eprintln!("{}", reason),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use crate::{Error, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use url::Url;

/// Bytes read from the response per iteration
pub const CHUNK_SIZE: usize = 1024;

const EVENT_BUFFER: usize = 64;

static PROCESS_SLOT: OnceLock<Arc<AtomicBool>> = OnceLock::new();

/// Something that happened to a running download
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadEvent {
    /// Percent complete, only sent when the server reports a content length
    Progress(u8),

    /// Non-empty file written to `path`
    Completed { path: PathBuf, bytes: u64 },

    /// Transport, filesystem or empty-result failure
    Failed(String),
}

impl DownloadEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DownloadEvent::Progress(_))
    }
}

/// Downloads one artifact at a time
///
/// Downloaders created with [`Downloader::process_wide`] share one slot, so at
/// most one of them runs a download at any time in the process. A downloader
/// from [`Downloader::new`] has a slot of its own.
pub struct Downloader {
    client: reqwest::blocking::Client,
    busy: Arc<AtomicBool>,
}

impl Downloader {
    pub fn new() -> Result<Self> {
        Self::with_slot(Arc::new(AtomicBool::new(false)))
    }

    /// Downloader sharing the single slot of this process
    pub fn process_wide() -> Result<Self> {
        let slot = PROCESS_SLOT.get_or_init(|| Arc::new(AtomicBool::new(false)));
        Self::with_slot(slot.clone())
    }

    fn with_slot(busy: Arc<AtomicBool>) -> Result<Self> {
        // No overall timeout: release archives are several hundred megabytes
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(None)
            .build()?;

        Ok(Self { client, busy })
    }

    /// True while a download started by this downloader is running
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Start downloading `url` into `destination` on a worker thread
    ///
    /// Fails with [`Error::DownloadInProgress`] if a previous download has not
    /// finished yet. A partially written file is left in place on failure.
    pub fn start(&self, url: &Url, destination: &Path) -> Result<DownloadHandle> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::DownloadInProgress);
        }
        let guard = BusyGuard(self.busy.clone());

        let (sender, receiver) = bounded(EVENT_BUFFER);
        let client = self.client.clone();
        let url = url.clone();
        let destination = destination.to_path_buf();

        tracing::info!(%url, destination = %destination.display(), "starting download");

        let worker = thread::Builder::new()
            .name("blenders-download".to_string())
            .spawn(move || {
                let outcome = fetch(&client, &url, &destination, &sender);
                let terminal = match outcome {
                    Ok(bytes) => {
                        tracing::info!(bytes, "download completed");
                        DownloadEvent::Completed {
                            path: destination,
                            bytes,
                        }
                    }
                    Err(reason) => {
                        tracing::warn!(%url, "download failed: {}", reason);
                        DownloadEvent::Failed(reason)
                    }
                };
                // Free the slot before the terminal event so the receiver can
                // start the next job as soon as it sees it.
                drop(guard);
                let _ = sender.send(terminal);
            })?;

        Ok(DownloadHandle {
            events: receiver,
            worker: Some(worker),
            finished: false,
        })
    }
}

struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Receiving end of a running download
pub struct DownloadHandle {
    events: Receiver<DownloadEvent>,
    worker: Option<JoinHandle<()>>,
    finished: bool,
}

impl DownloadHandle {
    /// Block for the next event; `None` once the terminal event was delivered
    pub fn recv(&mut self) -> Option<DownloadEvent> {
        if self.finished {
            return None;
        }

        let event = match self.events.recv() {
            Ok(event) => event,
            // Worker went away without a terminal event (it panicked)
            Err(_) => DownloadEvent::Failed("Download worker stopped unexpectedly".to_string()),
        };

        if event.is_terminal() {
            self.finished = true;
            if let Some(worker) = self.worker.take() {
                let _ = worker.join();
            }
        }
        Some(event)
    }

    /// Drain the remaining events and return the terminal one
    pub fn wait(mut self) -> DownloadEvent {
        let mut last = None;
        while let Some(event) = self.recv() {
            last = Some(event);
        }
        last.unwrap_or_else(|| DownloadEvent::Failed("Download already finished".to_string()))
    }
}

impl Iterator for DownloadHandle {
    type Item = DownloadEvent;

    fn next(&mut self) -> Option<DownloadEvent> {
        self.recv()
    }
}

fn fetch(
    client: &reqwest::blocking::Client,
    url: &Url,
    destination: &Path,
    events: &Sender<DownloadEvent>,
) -> std::result::Result<u64, String> {
    let mut response = client
        .get(url.clone())
        .send()
        .map_err(|e| describe_request_error(url, &e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(format!("HTTP {} for {}", status.as_u16(), url));
    }

    // A zero length is as good as unknown
    let total = response.content_length().filter(|&n| n > 0);
    tracing::debug!(?total, "response headers received");

    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create {}: {}", parent.display(), e))?;
    }
    let mut file = File::create(destination)
        .map_err(|e| format!("Failed to create {}: {}", destination.display(), e))?;

    let mut buffer = [0u8; CHUNK_SIZE];
    let mut downloaded: u64 = 0;
    let mut last_percent: u8 = 0;

    loop {
        let read = match response.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(format!("Connection error while downloading: {}", e)),
        };

        file.write_all(&buffer[..read])
            .map_err(|e| format!("Failed to write {}: {}", destination.display(), e))?;
        downloaded += read as u64;

        if let Some(total) = total {
            let percent = ((downloaded * 100) / total).min(100) as u8;
            last_percent = last_percent.max(percent);
            // Keep writing even if nobody listens any more
            let _ = events.send(DownloadEvent::Progress(last_percent));
        }
    }

    file.flush()
        .and_then(|_| file.sync_all())
        .map_err(|e| format!("Failed to write {}: {}", destination.display(), e))?;
    drop(file);

    let size = fs::metadata(destination)
        .map_err(|e| format!("Downloaded file missing: {}", e))?
        .len();
    if size == 0 {
        return Err("Downloaded file is empty".to_string());
    }

    Ok(size)
}

fn describe_request_error(url: &Url, e: &reqwest::Error) -> String {
    if e.is_connect() {
        format!(
            "Cannot connect to {}. Check your internet connection.",
            url.host_str().unwrap_or("download server")
        )
    } else if e.is_timeout() {
        "Download request timed out. Please try again.".to_string()
    } else {
        format!("Request failed: {}", e)
    }
}
