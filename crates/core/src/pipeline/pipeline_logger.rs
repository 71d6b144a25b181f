use std::collections::BTreeMap;
use std::time::Instant;

/// Telemetry sink the pipeline loop reports to once per tick.
pub trait PipelineLogger: Send {
    /// `tick` frames are now fully persisted.
    fn tick(&mut self, tick: usize);

    /// Milliseconds a named stage spent on the current frame.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// A per-frame count such as faces found.
    fn metric(&mut self, name: &str, value: f64);

    fn info(&mut self, message: &str);

    /// Called once when the run ends, successfully or not.
    fn summary(&self) {}
}

/// Discards everything.
pub struct NullPipelineLogger;

impl PipelineLogger for NullPipelineLogger {
    fn tick(&mut self, _tick: usize) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
    fn info(&mut self, _message: &str) {}
}

/// Running count, sum and peak of one reported quantity. Constant size, so
/// an unbounded live run does not grow memory.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Stat {
    count: u64,
    total: f64,
    max: f64,
}

impl Stat {
    fn record(&mut self, value: f64) {
        self.count += 1;
        self.total += value;
        self.max = self.max.max(value);
    }

    fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total / self.count as f64
        }
    }
}

/// Logs throttled progress and, at the end, per-stage latency and
/// faces-per-frame statistics through `log`.
///
/// A live stream has no known length, so progress is a running tick count
/// reported every `throttle_ticks` ticks.
pub struct StdoutPipelineLogger {
    throttle_ticks: usize,
    stages: BTreeMap<String, Stat>,
    metrics: BTreeMap<String, Stat>,
    start_time: Instant,
    ticks: usize,
}

impl StdoutPipelineLogger {
    pub fn new(throttle_ticks: usize) -> Self {
        Self {
            throttle_ticks: throttle_ticks.max(1),
            stages: BTreeMap::new(),
            metrics: BTreeMap::new(),
            start_time: Instant::now(),
            ticks: 0,
        }
    }

    /// End-of-run report, or `None` if nothing was recorded.
    pub fn summary_string(&self) -> Option<String> {
        if self.stages.is_empty() && self.metrics.is_empty() {
            return None;
        }

        let secs = self.start_time.elapsed().as_secs_f64();
        let mut lines = vec![format!("Run summary: {} frames in {secs:.1}s", self.ticks)];
        for (stage, stat) in &self.stages {
            lines.push(format!(
                "  {stage:<10} {:6.1} ms/frame (peak {:.1} ms)",
                stat.mean(),
                stat.max
            ));
        }
        for (name, stat) in &self.metrics {
            lines.push(format!("  {name:<10} {:6.1} per frame (peak {:.0})", stat.mean(), stat.max));
        }
        if self.ticks > 0 && secs > 0.0 {
            lines.push(format!("  rate       {:6.1} fps", self.ticks as f64 / secs));
        }
        Some(lines.join("\n"))
    }
}

impl Default for StdoutPipelineLogger {
    fn default() -> Self {
        Self::new(100)
    }
}

impl PipelineLogger for StdoutPipelineLogger {
    fn tick(&mut self, tick: usize) {
        self.ticks = tick;
        if tick % self.throttle_ticks == 0 {
            let secs = self.start_time.elapsed().as_secs_f64();
            log::info!("Processed {tick} frames ({secs:.0}s)");
        }
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.stages.entry(stage.to_string()).or_default().record(duration_ms);
    }

    fn metric(&mut self, name: &str, value: f64) {
        self.metrics.entry(name.to_string()).or_default().record(value);
    }

    fn info(&mut self, message: &str) {
        log::info!("{message}");
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("{text}");
        }
    }
}
