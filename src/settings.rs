//! Settings management for the relay player
//!
//! Handles loading/saving of the player's XML settings file.

use quick_xml::de::from_str;
use quick_xml::se::to_string;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::network::{ForwardConfig, SocketKind, DEFAULT_ENDPOINT};
use crate::video::DecodeConfig;

/// Bounds for the decoder queue timeouts, in milliseconds
const MIN_TIMEOUT_MS: u64 = 1;
const MAX_TIMEOUT_MS: u64 = 1000;

/// Player settings (stored as XML)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename = "RelayPlayer")]
pub struct PlayerSettings {
    /// Video file played when none is given on the command line
    #[serde(rename = "sourcePath", default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<PathBuf>,

    /// Filesystem path of the frame consumer's socket
    #[serde(rename = "forwardEndpoint", default = "default_forward_endpoint")]
    pub forward_endpoint: PathBuf,

    /// Socket type of the forward channel
    #[serde(rename = "socketKind", default)]
    pub socket_kind: SocketKind,

    /// Restart from the beginning at end of stream
    #[serde(rename = "loopPlayback", default = "default_true")]
    pub loop_playback: bool,

    /// Bounded wait for a free decoder input slot (1-1000 ms)
    ///
    /// Only decoders with their own input/output queues wait. The FFmpeg
    /// backend decodes synchronously and answers at once, so both timeouts
    /// have no effect there.
    #[serde(rename = "inputTimeoutMs", default = "default_timeout_ms")]
    pub input_timeout_ms: u64,

    /// Bounded wait for decoder output (1-1000 ms); see `input_timeout_ms`
    #[serde(rename = "outputTimeoutMs", default = "default_timeout_ms")]
    pub output_timeout_ms: u64,

    /// Try a platform hardware decoder before falling back to software
    #[serde(rename = "hardwareAcceleration", default = "default_true")]
    pub hardware_acceleration: bool,

    /// Window width
    #[serde(rename = "windowWidth", default = "default_window_width")]
    pub window_width: u32,

    /// Window height
    #[serde(rename = "windowHeight", default = "default_window_height")]
    pub window_height: u32,

    /// Present with vsync (Fifo) instead of the lowest-latency mode available
    #[serde(rename = "vsyncEnabled", default = "default_true")]
    pub vsync_enabled: bool,

    /// Rebuild the YUV shader when its source file changes
    #[serde(rename = "shaderHotReload", default)]
    pub shader_hot_reload: bool,
}

fn default_forward_endpoint() -> PathBuf {
    PathBuf::from(DEFAULT_ENDPOINT)
}

fn default_true() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    10
}

fn default_window_width() -> u32 {
    1280
}

fn default_window_height() -> u32 {
    720
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            source_path: None,
            forward_endpoint: default_forward_endpoint(),
            socket_kind: SocketKind::default(),
            loop_playback: true,
            input_timeout_ms: default_timeout_ms(),
            output_timeout_ms: default_timeout_ms(),
            hardware_acceleration: true,
            window_width: default_window_width(),
            window_height: default_window_height(),
            vsync_enabled: true,
            shader_hot_reload: false,
        }
    }
}

impl PlayerSettings {
    /// Default settings file: `<config_dir>/RelayPlayer/settings.xml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut p| {
            p.push("RelayPlayer");
            p.push("settings.xml");
            p
        })
    }

    /// Clamp values to their valid ranges
    pub fn sanitize(&mut self) {
        self.input_timeout_ms = self.input_timeout_ms.clamp(MIN_TIMEOUT_MS, MAX_TIMEOUT_MS);
        self.output_timeout_ms = self.output_timeout_ms.clamp(MIN_TIMEOUT_MS, MAX_TIMEOUT_MS);
        self.window_width = self.window_width.max(1);
        self.window_height = self.window_height.max(1);
    }

    /// Load settings from an XML file
    pub fn load_from_file(path: &Path) -> Result<Self, SettingsError> {
        let contents = fs::read_to_string(path)?;
        let mut settings: Self = from_str(&contents)?;
        settings.sanitize();
        Ok(settings)
    }

    /// Load settings from the config directory, falling back to defaults
    ///
    /// A missing file is not an error. A file that fails to parse is logged
    /// and ignored.
    pub fn load_default() -> Self {
        let Some(path) = Self::default_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match Self::load_from_file(&path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable settings file");
                Self::default()
            }
        }
    }

    /// Save settings to an XML file
    pub fn save_to_file(&self, path: &Path) -> Result<(), SettingsError> {
        let xml = to_string(self)?;

        // Add XML declaration
        let formatted = format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{}", xml);

        fs::write(path, formatted)?;
        Ok(())
    }

    /// Save settings to the config directory
    pub fn save(&self) -> Result<(), SettingsError> {
        let path = Self::default_path().ok_or(SettingsError::NoConfigDir)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        self.save_to_file(&path)
    }

    /// Decode loop configuration derived from these settings
    pub fn decode_config(&self) -> DecodeConfig {
        DecodeConfig {
            loop_playback: self.loop_playback,
            input_timeout: Duration::from_millis(self.input_timeout_ms),
            output_timeout: Duration::from_millis(self.output_timeout_ms),
        }
    }

    /// Forward channel configuration derived from these settings
    pub fn forward_config(&self) -> ForwardConfig {
        ForwardConfig {
            endpoint: self.forward_endpoint.clone(),
            kind: self.socket_kind,
        }
    }
}

/// Settings error types
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("XML parse error: {0}")]
    XmlParse(#[from] quick_xml::DeError),
    #[error("XML write error: {0}")]
    XmlWrite(#[from] quick_xml::SeError),
    #[error("Could not find config directory")]
    NoConfigDir,
}
