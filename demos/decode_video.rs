//! Example: Decode a video file headless and report pipeline statistics
//!
//! Usage: cargo run --example decode_video <video_file> [socket_path]
//!
//! Plays the file once without a window. Frames are still relayed to the
//! socket (default `/dev/socket/video0`); start a consumer there to see them
//! delivered, e.g. `socat UNIX-LISTEN:/tmp/frames.sock - > /dev/null`.

use std::env;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use relay_player::network::{ForwardConfig, DEFAULT_ENDPOINT};
use relay_player::telemetry::{init_logging, LogConfig};
use relay_player::video::{DecodeConfig, FfmpegBackend, PlayerConfig, VideoPlayer};

fn main() {
    let _guard = init_logging(&LogConfig::default()).ok().flatten();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <video_file> [socket_path]", args[0]);
        std::process::exit(1);
    }

    let video_path = Path::new(&args[1]);
    let endpoint = args
        .get(2)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ENDPOINT));

    let config = PlayerConfig {
        decode: DecodeConfig {
            loop_playback: false,
            ..Default::default()
        },
        forward: ForwardConfig {
            endpoint,
            ..Default::default()
        },
    };

    let mut player = VideoPlayer::new(FfmpegBackend::default(), config);
    if let Err(e) = player.start(video_path) {
        eprintln!("Failed to open video: {}", e);
        std::process::exit(1);
    }

    println!("\n=== Video Information ===");
    if let Some(geometry) = player.geometry() {
        println!("Geometry: {}", geometry);
        println!("Packed frame size: {} bytes", geometry.packed_len());
    }

    let started = Instant::now();
    let slot = player.frame_slot();
    while !player.is_finished() {
        if let Some(frame) = slot.take_frame() {
            println!("Frame pts={}us ({} bytes)", frame.pts_us, frame.data.len());
        }
        thread::sleep(Duration::from_millis(5));
    }
    let elapsed = started.elapsed();
    player.stop();

    let stats = player.stats().snapshot();
    println!("\n=== Pipeline ===");
    if let Some(format) = player.output_format() {
        println!("Decoder output: {:?}", format);
    }
    println!("Decoded:   {}", stats.frames_decoded);
    println!("Repacked:  {} ({} failed)", stats.frames_repacked, stats.repack_failures);
    println!(
        "Forwarded: {} of {} ({} failed)",
        stats.frames_forwarded, stats.forward_attempts, stats.forward_failures
    );
    println!("Elapsed:   {:.2}s", elapsed.as_secs_f64());
    if elapsed.as_secs_f64() > 0.0 {
        println!("Decode rate: {:.1} fps", stats.frames_decoded as f64 / elapsed.as_secs_f64());
    }
}
