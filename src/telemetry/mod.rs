//! Telemetry and logging infrastructure
//!
//! Structured logging with tracing, pipeline counters, and render cadence
//! profiling.

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogConfig, LogGuard, LoggingError};
pub use metrics::{FrameProfiler, FrameStats, PipelineStats, StatsSnapshot};
