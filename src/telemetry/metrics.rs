//! Pipeline counters and frame timing
//!
//! `PipelineStats` is shared between the decode thread and the coordinator;
//! `FrameProfiler` measures the render callback cadence.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Counters updated by the decode loop
#[derive(Debug, Default)]
pub struct PipelineStats {
    frames_decoded: AtomicU64,
    frames_repacked: AtomicU64,
    repack_failures: AtomicU64,
    forward_attempts: AtomicU64,
    frames_forwarded: AtomicU64,
    forward_failures: AtomicU64,
    frames_rendered: AtomicU64,
    loop_restarts: AtomicU64,
    format_changes: AtomicU64,
}

/// Point-in-time copy of `PipelineStats`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub frames_decoded: u64,
    pub frames_repacked: u64,
    pub repack_failures: u64,
    pub forward_attempts: u64,
    pub frames_forwarded: u64,
    pub forward_failures: u64,
    /// Frames delivered to the renderer's staging slot
    pub frames_rendered: u64,
    pub loop_restarts: u64,
    pub format_changes: u64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_decoded(&self) {
        self.frames_decoded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_repacked(&self) {
        self.frames_repacked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_repack_failure(&self) {
        self.repack_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_forward(&self, delivered: bool) {
        self.forward_attempts.fetch_add(1, Ordering::Relaxed);
        if delivered {
            self.frames_forwarded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.forward_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_rendered(&self) {
        self.frames_rendered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_loop_restart(&self) {
        self.loop_restarts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_format_change(&self) {
        self.format_changes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_decoded: self.frames_decoded.load(Ordering::Relaxed),
            frames_repacked: self.frames_repacked.load(Ordering::Relaxed),
            repack_failures: self.repack_failures.load(Ordering::Relaxed),
            forward_attempts: self.forward_attempts.load(Ordering::Relaxed),
            frames_forwarded: self.frames_forwarded.load(Ordering::Relaxed),
            forward_failures: self.forward_failures.load(Ordering::Relaxed),
            frames_rendered: self.frames_rendered.load(Ordering::Relaxed),
            loop_restarts: self.loop_restarts.load(Ordering::Relaxed),
            format_changes: self.format_changes.load(Ordering::Relaxed),
        }
    }
}

/// Frame timing statistics
#[derive(Debug, Clone, Default)]
pub struct FrameStats {
    /// Average frame time in milliseconds
    pub avg_ms: f64,
    /// Minimum frame time in milliseconds
    pub min_ms: f64,
    /// Maximum frame time in milliseconds
    pub max_ms: f64,
    /// 50th percentile (median) frame time
    pub p50_ms: f64,
    /// 95th percentile frame time
    pub p95_ms: f64,
    /// 99th percentile frame time
    pub p99_ms: f64,
    /// Number of samples in the statistics
    pub sample_count: usize,
}

/// Frame profiler for the render callback
pub struct FrameProfiler {
    /// Frame durations
    frame_times: VecDeque<Duration>,
    /// Maximum samples to keep (5 seconds at 60fps)
    max_samples: usize,
    last_frame_start: Option<Instant>,
    frame_starts: VecDeque<Instant>,
}

impl Default for FrameProfiler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameProfiler {
    pub fn new() -> Self {
        Self {
            frame_times: VecDeque::with_capacity(300),
            max_samples: 300,
            last_frame_start: None,
            frame_starts: VecDeque::with_capacity(300),
        }
    }

    /// Mark the beginning of a frame
    pub fn begin_frame(&mut self) {
        let now = Instant::now();

        if let Some(start) = self.last_frame_start {
            self.frame_times.push_back(now.duration_since(start));
            if self.frame_times.len() > self.max_samples {
                self.frame_times.pop_front();
            }
        }
        self.last_frame_start = Some(now);

        self.frame_starts.push_back(now);
        if self.frame_starts.len() > self.max_samples {
            self.frame_starts.pop_front();
        }
    }

    pub fn stats(&self) -> FrameStats {
        if self.frame_times.is_empty() {
            return FrameStats::default();
        }

        let mut times: Vec<f64> = self
            .frame_times
            .iter()
            .map(|d| d.as_secs_f64() * 1000.0)
            .collect();
        times.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let sum: f64 = times.iter().sum();

        FrameStats {
            avg_ms: sum / times.len() as f64,
            min_ms: times.first().copied().unwrap_or(0.0),
            max_ms: times.last().copied().unwrap_or(0.0),
            p50_ms: percentile(&times, 0.50),
            p95_ms: percentile(&times, 0.95),
            p99_ms: percentile(&times, 0.99),
            sample_count: times.len(),
        }
    }

    /// Current FPS from the recorded frame starts
    pub fn fps(&self) -> f64 {
        let (Some(first), Some(last)) = (self.frame_starts.front(), self.frame_starts.back()) else {
            return 0.0;
        };
        let duration = last.duration_since(*first).as_secs_f64();
        if self.frame_starts.len() < 2 || duration <= 0.0 {
            return 0.0;
        }
        (self.frame_starts.len() - 1) as f64 / duration
    }
}

/// Calculate percentile from sorted array
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() - 1) as f64 * p) as usize;
    sorted[idx]
}
