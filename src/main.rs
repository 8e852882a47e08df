//! Relay Player - Main Entry Point
//!
//! Plays a video file in a window, looping by default, while relaying every
//! decoded frame as raw YUV 4:2:0 to a local socket consumer.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use relay_player::gpu_context::GpuContext;
use relay_player::settings::PlayerSettings;
use relay_player::shaders::{load_shader, yuv_to_rgb_path, ShaderWatcher};
use relay_player::telemetry::{init_logging, FrameProfiler, LogConfig};
use relay_player::video::{FfmpegBackend, PlayerConfig, VideoPlayer, YuvRenderer};
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowAttributes, WindowId};

const WINDOW_TITLE: &str = "Relay Player";

/// How often pipeline statistics are logged
const STATS_INTERVAL: Duration = Duration::from_secs(5);

/// Hardware-decoding video player with raw frame relay
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Video file to play (defaults to the settings' source path)
    path: Option<PathBuf>,

    /// Unix socket path of the frame consumer
    #[arg(long)]
    endpoint: Option<PathBuf>,

    /// Stop at end of stream instead of looping
    #[arg(long)]
    no_loop: bool,

    /// Settings file (defaults to the config directory)
    #[arg(long, value_name = "FILE")]
    settings: Option<PathBuf>,

    /// Disable hardware decoding
    #[arg(long)]
    software_decode: bool,

    /// Log as JSON
    #[arg(long)]
    log_json: bool,

    /// Also log to this file
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,
}

impl Cli {
    /// Apply command line overrides on top of loaded settings
    fn apply(&self, mut settings: PlayerSettings) -> PlayerSettings {
        if let Some(path) = &self.path {
            settings.source_path = Some(path.clone());
        }
        if let Some(endpoint) = &self.endpoint {
            settings.forward_endpoint = endpoint.clone();
        }
        if self.no_loop {
            settings.loop_playback = false;
        }
        if self.software_decode {
            settings.hardware_acceleration = false;
        }
        settings
    }

    fn log_config(&self) -> LogConfig {
        LogConfig {
            file_enabled: self.log_file.is_some(),
            file_path: self.log_file.clone(),
            json_format: self.log_json,
            ..Default::default()
        }
    }
}

/// Everything that exists once the window is up
struct Running {
    window: Arc<Window>,
    gpu: GpuContext,
    renderer: YuvRenderer,
    player: VideoPlayer<FfmpegBackend>,
    profiler: FrameProfiler,
    shader_watcher: Option<ShaderWatcher>,
    last_stats_log: Instant,
    finish_logged: bool,
}

enum AppState {
    Uninitialized,
    Running(Box<Running>),
    Exiting,
}

struct RelayApp {
    settings: PlayerSettings,
    source: PathBuf,
    state: AppState,
}

impl RelayApp {
    fn new(settings: PlayerSettings, source: PathBuf) -> Self {
        Self {
            settings,
            source,
            state: AppState::Uninitialized,
        }
    }

    fn initialize(&self, event_loop: &ActiveEventLoop) -> Result<Running, Box<dyn std::error::Error>> {
        let window_attributes = WindowAttributes::default()
            .with_title(WINDOW_TITLE)
            .with_inner_size(LogicalSize::new(self.settings.window_width, self.settings.window_height));
        let window = Arc::new(event_loop.create_window(window_attributes)?);

        let size = window.inner_size();
        tracing::info!(
            width = size.width,
            height = size.height,
            scale_factor = window.scale_factor(),
            "Window created"
        );

        let gpu = pollster::block_on(GpuContext::new(Arc::clone(&window), self.settings.vsync_enabled))?;
        let mut renderer = YuvRenderer::new(&gpu.device, gpu.surface_format(), gpu.size());

        let shader_watcher = if self.settings.shader_hot_reload {
            let path = yuv_to_rgb_path();
            // Start from the on-disk source so edits made before launch apply
            match load_shader(&path) {
                Ok(source) => {
                    if let Err(e) = renderer.rebuild_program(&gpu.device, &source) {
                        tracing::error!("{}", e);
                    }
                }
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Using embedded shader"),
            }
            match ShaderWatcher::new(&path) {
                Ok(watcher) => Some(watcher),
                Err(e) => {
                    tracing::warn!(error = %e, "Shader hot-reload unavailable");
                    None
                }
            }
        } else {
            None
        };

        let backend = FfmpegBackend {
            hardware_acceleration: self.settings.hardware_acceleration,
        };
        let mut player = VideoPlayer::new(
            backend,
            PlayerConfig {
                decode: self.settings.decode_config(),
                forward: self.settings.forward_config(),
            },
        );
        player.start(&self.source)?;

        tracing::info!("Relay Player ready. Press ESC to exit");

        Ok(Running {
            window,
            gpu,
            renderer,
            player,
            profiler: FrameProfiler::new(),
            shader_watcher,
            last_stats_log: Instant::now(),
            finish_logged: false,
        })
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if let AppState::Running(running) = &mut self.state {
            running.player.stop();
            let stats = running.player.stats().snapshot();
            tracing::info!(?stats, "Player stopped");
        }
        self.state = AppState::Exiting;
        event_loop.exit();
    }
}

impl Running {
    fn render(&mut self) {
        if let Some(watcher) = &mut self.shader_watcher {
            if watcher.poll() {
                match load_shader(watcher.path()) {
                    Ok(source) => match self.renderer.rebuild_program(&self.gpu.device, &source) {
                        Ok(()) => tracing::info!("Shader rebuilt"),
                        Err(e) => tracing::error!("{}", e),
                    },
                    Err(e) => tracing::warn!(error = %e, "Failed to read shader"),
                }
            }
        }

        let frame = match self.gpu.acquire_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => return,
            Err(e) => {
                tracing::error!("{}", e);
                return;
            }
        };
        let view = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());

        let slot = self.player.frame_slot();
        self.renderer
            .draw_frame(&self.gpu.device, &self.gpu.queue, &slot, &view);

        self.window.pre_present_notify();
        frame.present();
        self.profiler.begin_frame();

        if self.player.is_finished() && !self.finish_logged {
            self.finish_logged = true;
            tracing::info!(finish_count = self.player.finish_count(), "Playback finished; showing last frame");
        }

        if self.last_stats_log.elapsed() >= STATS_INTERVAL {
            self.last_stats_log = Instant::now();
            let frame_stats = self.profiler.stats();
            let stats = self.player.stats().snapshot();
            tracing::info!(
                fps = self.profiler.fps(),
                p95_ms = frame_stats.p95_ms,
                decoded = stats.frames_decoded,
                forwarded = stats.frames_forwarded,
                forward_failures = stats.forward_failures,
                uploaded = self.renderer.frames_uploaded(),
                "Pipeline stats"
            );
        }
    }
}

impl ApplicationHandler for RelayApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if !matches!(self.state, AppState::Uninitialized) {
            return;
        }

        match self.initialize(event_loop) {
            Ok(running) => self.state = AppState::Running(Box::new(running)),
            Err(e) => {
                tracing::error!("Failed to start: {}", e);
                self.state = AppState::Exiting;
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested
            | WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(KeyCode::Escape),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => {
                tracing::info!("Exit requested");
                self.shutdown(event_loop);
            }
            WindowEvent::Resized(size) => {
                if let AppState::Running(running) = &mut self.state {
                    running.gpu.resize(size.width, size.height);
                    let (width, height) = running.gpu.size();
                    running.renderer.resize(width, height);
                }
            }
            WindowEvent::RedrawRequested => {
                if let AppState::Running(running) = &mut self.state {
                    running.render();
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        match &self.state {
            // VSYNC or not, presentation paces the loop
            AppState::Running(running) => {
                running.window.request_redraw();
                event_loop.set_control_flow(ControlFlow::Poll);
            }
            _ => event_loop.set_control_flow(ControlFlow::Wait),
        }
    }
}

fn main() {
    let cli = Cli::parse();

    // Keep the guard alive for the program duration
    let _log_guard = match init_logging(&cli.log_config()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            None
        }
    };

    tracing::info!("Relay Player v{}", env!("CARGO_PKG_VERSION"));

    let settings = match &cli.settings {
        Some(path) => match PlayerSettings::load_from_file(path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::error!(path = %path.display(), "Failed to load settings: {}", e);
                std::process::exit(1);
            }
        },
        None => PlayerSettings::load_default(),
    };
    let settings = cli.apply(settings);

    let Some(source) = settings.source_path.clone() else {
        tracing::error!("No video file given and no sourcePath in settings");
        std::process::exit(2);
    };

    let event_loop = match EventLoop::new() {
        Ok(event_loop) => event_loop,
        Err(e) => {
            tracing::error!("Failed to create event loop: {}", e);
            std::process::exit(1);
        }
    };
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut app = RelayApp::new(settings, source);
    if let Err(e) = event_loop.run_app(&mut app) {
        tracing::error!("Event loop error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_settings() {
        let cli = Cli::try_parse_from([
            "relay-player",
            "clip.mp4",
            "--endpoint",
            "/tmp/consumer.sock",
            "--no-loop",
            "--software-decode",
        ])
        .unwrap();

        let settings = cli.apply(PlayerSettings::default());
        assert_eq!(settings.source_path, Some(PathBuf::from("clip.mp4")));
        assert_eq!(settings.forward_endpoint, PathBuf::from("/tmp/consumer.sock"));
        assert!(!settings.loop_playback);
        assert!(!settings.hardware_acceleration);
    }

    #[test]
    fn test_cli_keeps_settings_without_flags() {
        let cli = Cli::try_parse_from(["relay-player"]).unwrap();
        let loaded = PlayerSettings {
            source_path: Some(PathBuf::from("/media/loop.mkv")),
            loop_playback: true,
            ..Default::default()
        };
        let settings = cli.apply(loaded.clone());
        assert_eq!(settings, loaded);
    }

    #[test]
    fn test_log_flags() {
        let cli = Cli::try_parse_from(["relay-player", "--log-json", "--log-file", "out.log"]).unwrap();
        let config = cli.log_config();
        assert!(config.json_format);
        assert!(config.file_enabled);
        assert_eq!(config.file_path, Some(PathBuf::from("out.log")));
    }
}
