use std::collections::HashMap;
use std::time::Instant;

/// Observer for per-frame events of the streaming loop.
///
/// Use cases report into this trait and stay unaware of where the numbers
/// end up.
pub trait PipelineLogger: Send {
    /// Called once per presented frame with the running frame count.
    fn progress(&mut self, frames: usize);

    /// How long a named stage took for one frame.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// A point-in-time measurement such as faces or in-flight workers.
    fn metric(&mut self, name: &str, value: f64);

    fn info(&mut self, message: &str);

    /// End-of-run report. Default: no-op.
    fn summary(&self) {}
}

/// Discards everything. Used by tests and single-shot runs.
pub struct NullPipelineLogger;

impl PipelineLogger for NullPipelineLogger {
    fn progress(&mut self, _frames: usize) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
    fn info(&mut self, _message: &str) {}
}

#[derive(Default)]
struct Series {
    count: usize,
    total: f64,
    peak: f64,
}

impl Series {
    fn push(&mut self, value: f64) {
        self.count += 1;
        self.total += value;
        self.peak = if self.count == 1 { value } else { self.peak.max(value) };
    }

    fn avg(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total / self.count as f64
        }
    }
}

/// Aggregates stage timings and metrics and reports a summary with
/// throughput when the stream ends.
///
/// A running frame rate is logged every `throttle_frames` frames.
pub struct StdoutPipelineLogger {
    throttle_frames: usize,
    timings: HashMap<String, Series>,
    metrics: HashMap<String, Series>,
    start_time: Instant,
    frames: usize,
}

impl StdoutPipelineLogger {
    pub fn new(throttle_frames: usize) -> Self {
        Self {
            throttle_frames: throttle_frames.max(1),
            timings: HashMap::new(),
            metrics: HashMap::new(),
            start_time: Instant::now(),
            frames: 0,
        }
    }

    /// Returns the formatted summary, or `None` if nothing was recorded.
    pub fn summary_string(&self) -> Option<String> {
        if self.timings.is_empty() && self.metrics.is_empty() {
            return None;
        }

        let elapsed_ms = self.start_time.elapsed().as_secs_f64() * 1000.0;
        let mut lines = vec![format!(
            "Stream summary ({} frames, {:.1}s):",
            self.frames,
            elapsed_ms / 1000.0
        )];

        let mut stages: Vec<_> = self.timings.iter().collect();
        stages.sort_by(|a, b| a.0.cmp(b.0));
        for (stage, series) in stages {
            let pct = if elapsed_ms > 0.0 {
                series.total / elapsed_ms * 100.0
            } else {
                0.0
            };
            lines.push(format!(
                "  {stage:10}: avg {:6.1}ms  total {:7.0}ms  ({pct:4.1}%)",
                series.avg(),
                series.total
            ));
        }

        let mut metrics: Vec<_> = self.metrics.iter().collect();
        metrics.sort_by(|a, b| a.0.cmp(b.0));
        for (name, series) in metrics {
            lines.push(format!(
                "  {name}: avg {:.1}  peak {:.0}",
                series.avg(),
                series.peak
            ));
        }

        if self.frames > 0 && elapsed_ms > 0.0 {
            let fps = self.frames as f64 / (elapsed_ms / 1000.0);
            lines.push(format!("  Throughput: {fps:.1} fps"));
        }

        Some(lines.join("\n"))
    }

    pub fn timing_avg(&self, stage: &str) -> Option<f64> {
        self.timings.get(stage).map(Series::avg)
    }

    pub fn metric_peak(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).map(|s| s.peak)
    }
}

impl Default for StdoutPipelineLogger {
    fn default() -> Self {
        Self::new(100)
    }
}

impl PipelineLogger for StdoutPipelineLogger {
    fn progress(&mut self, frames: usize) {
        self.frames = frames;
        if frames % self.throttle_frames == 0 {
            let secs = self.start_time.elapsed().as_secs_f64();
            let fps = if secs > 0.0 { frames as f64 / secs } else { 0.0 };
            log::info!("Streaming: {frames} frames ({fps:.1} fps)");
        }
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.timings
            .entry(stage.to_string())
            .or_default()
            .push(duration_ms);
    }

    fn metric(&mut self, name: &str, value: f64) {
        self.metrics.entry(name.to_string()).or_default().push(value);
    }

    fn info(&mut self, message: &str) {
        log::info!("{message}");
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}
