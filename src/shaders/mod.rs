//! Shader management and hot-reload system
//!
//! The YUV to RGB program is embedded at build time. With hot reload
//! enabled, the same file is read from disk at runtime and rebuilt whenever
//! it changes, without restarting playback.

use std::path::{Path, PathBuf};

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::sync::mpsc::{channel, Receiver, TryRecvError};
use std::time::{Duration, Instant};

/// The embedded YUV to RGB shader
pub const YUV_TO_RGB_SHADER: &str = include_str!("yuv_to_rgb.wgsl");

/// Get the path to the shaders directory
pub fn shaders_dir() -> PathBuf {
    // In development, this is relative to the cargo manifest directory
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    PathBuf::from(manifest_dir).join("src").join("shaders")
}

/// Get the path to the YUV to RGB shader file
pub fn yuv_to_rgb_path() -> PathBuf {
    shaders_dir().join("yuv_to_rgb.wgsl")
}

/// Load a shader source from disk
pub fn load_shader(path: &Path) -> Result<String, std::io::Error> {
    std::fs::read_to_string(path)
}

/// Watches one shader file for changes and signals when reloading is needed
pub struct ShaderWatcher {
    /// The file watcher (kept alive to maintain watch)
    _watcher: RecommendedWatcher,
    /// Receiver for file change events
    receiver: Receiver<Result<Event, notify::Error>>,
    /// File being watched
    path: PathBuf,
    /// Last time we detected a change (for debouncing)
    last_change: Option<Instant>,
    /// Debounce duration (ignore rapid successive changes)
    debounce_duration: Duration,
    /// Whether a change is waiting for the debounce to pass
    pending: bool,
}

impl ShaderWatcher {
    /// Watch `path` for modifications
    ///
    /// The parent directory is watched so editors that replace the file
    /// instead of writing it in place are still picked up.
    pub fn new(path: &Path) -> Result<Self, notify::Error> {
        let (tx, rx) = channel();

        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.send(res);
            },
            Config::default(),
        )?;

        let directory = path.parent().unwrap_or_else(|| Path::new("."));
        log::info!("Shader hot-reload enabled, watching: {}", path.display());
        watcher.watch(directory, RecursiveMode::NonRecursive)?;

        Ok(Self {
            _watcher: watcher,
            receiver: rx,
            path: path.to_path_buf(),
            last_change: None,
            debounce_duration: Duration::from_millis(100),
            pending: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Poll for shader changes
    ///
    /// Returns `true` once the watched file changed and the debounce period
    /// has passed since the last change.
    pub fn poll(&mut self) -> bool {
        // Drain all pending events
        loop {
            match self.receiver.try_recv() {
                Ok(Ok(event)) => {
                    if event.paths.iter().any(|p| p.file_name() == self.path.file_name()) {
                        self.last_change = Some(Instant::now());
                        self.pending = true;
                    }
                }
                Ok(Err(e)) => {
                    log::warn!("Shader watcher error: {:?}", e);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    log::error!("Shader watcher channel disconnected");
                    break;
                }
            }
        }

        match self.last_change {
            Some(last) if self.pending && last.elapsed() >= self.debounce_duration => {
                self.pending = false;
                self.last_change = None;
                log::info!("Shader changed: {}", self.path.display());
                true
            }
            _ => false,
        }
    }
}
