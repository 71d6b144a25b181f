use std::time::Instant;

use crate::annotation::annotator::Annotator;
use crate::detection::domain::detector::Detector;
use crate::detection::domain::face_eye_detection::detect_faces_and_eyes;
use crate::events::domain::detection_event::DetectionEvent;
use crate::events::domain::event_log::EventLog;
use crate::preprocessing::preprocessor::normalize;
use crate::shared::clock::{format_timestamp, Clock, SystemClock};
use crate::shared::frame::Frame;
use crate::video::domain::display::{Display, PreviewControl};
use crate::video::domain::frame_source::{FrameSource, FrameTimeout};
use crate::video::domain::video_sink::VideoSink;

use super::pipeline_config::PipelineConfig;
use super::pipeline_error::{PipelineError, ResourceKind, TransientDetectionError};
use super::pipeline_logger::{NullPipelineLogger, PipelineLogger};
use super::stop_signal::StopSignal;

/// Lifecycle of a pipeline run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Init,
    Running,
    Stopping,
    Stopped,
    Failed,
}

/// Why a successful run ended.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StopReason {
    /// The source had no more frames.
    #[default]
    EndOfStream,
    /// The stop signal was raised.
    StopRequested,
    /// The preview asked to stop.
    PreviewClosed,
}

/// Counters reported at the end of a successful run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: usize,
    pub frames_written: usize,
    pub events_logged: usize,
    /// Frames whose detection failed and were persisted without outlines.
    pub dropped_annotations: usize,
    pub stop_reason: StopReason,
}

/// Collaborators a pipeline is built from.
pub struct PipelineComponents {
    pub source: Box<dyn FrameSource>,
    pub event_log: Box<dyn EventLog>,
    pub sink: Box<dyn VideoSink>,
    pub display: Box<dyn Display>,
    pub face_detector: Box<dyn Detector>,
    pub eye_detector: Box<dyn Detector>,
}

/// Drives capture → normalize → detect → annotate → persist → preview, one
/// frame per tick, and owns the acquisition and release of every resource.
///
/// Resources are acquired in the order frame source, event log, video sink
/// and released in reverse, exactly once, whether the run ends normally,
/// on a stop request, on a fatal error, or by dropping the loop mid-run.
/// A loop runs once; afterwards `run` returns
/// [`PipelineError::AlreadyFinished`].
pub struct PipelineLoop {
    config: PipelineConfig,
    source: Box<dyn FrameSource>,
    event_log: Box<dyn EventLog>,
    sink: Box<dyn VideoSink>,
    display: Box<dyn Display>,
    face_detector: Box<dyn Detector>,
    eye_detector: Box<dyn Detector>,
    annotator: Annotator,
    clock: Box<dyn Clock>,
    logger: Box<dyn PipelineLogger>,
    stop: StopSignal,
    state: PipelineState,
    history: Vec<PipelineState>,
    acquired: Vec<ResourceKind>,
}

impl PipelineLoop {
    pub fn new(config: PipelineConfig, components: PipelineComponents) -> Self {
        Self {
            config,
            source: components.source,
            event_log: components.event_log,
            sink: components.sink,
            display: components.display,
            face_detector: components.face_detector,
            eye_detector: components.eye_detector,
            annotator: Annotator::default(),
            clock: Box::new(SystemClock),
            logger: Box::new(NullPipelineLogger),
            stop: StopSignal::new(),
            state: PipelineState::Init,
            history: vec![PipelineState::Init],
            acquired: Vec::new(),
        }
    }

    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_logger(mut self, logger: Box<dyn PipelineLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Every state entered so far, starting with `Init`.
    pub fn history(&self) -> &[PipelineState] {
        &self.history
    }

    /// Runs until end of stream, a stop request, or a fatal error.
    pub fn run(&mut self) -> Result<RunSummary, PipelineError> {
        if self.state != PipelineState::Init {
            return Err(PipelineError::AlreadyFinished);
        }

        if let Err(error) = self.acquire() {
            self.release_after_failure();
            self.enter(PipelineState::Failed);
            return Err(error);
        }

        self.enter(PipelineState::Running);
        let mut summary = RunSummary::default();
        match self.run_ticks(&mut summary) {
            Ok(reason) => {
                summary.stop_reason = reason;
                self.enter(PipelineState::Stopping);
                if let Err(error) = self.release_all() {
                    self.enter(PipelineState::Failed);
                    return Err(error);
                }
                self.enter(PipelineState::Stopped);
                self.logger.info(&format!(
                    "Stopped after {} frames ({:?}): {} events logged, {} frames without annotations",
                    summary.ticks, reason, summary.events_logged, summary.dropped_annotations
                ));
                self.logger.summary();
                Ok(summary)
            }
            Err(error) => {
                log::error!("Pipeline failed: {error}");
                self.release_after_failure();
                self.enter(PipelineState::Failed);
                self.logger.summary();
                Err(error)
            }
        }
    }

    fn enter(&mut self, state: PipelineState) {
        log::debug!("Pipeline {:?} -> {:?}", self.state, state);
        self.state = state;
        self.history.push(state);
    }

    fn acquire(&mut self) -> Result<(), PipelineError> {
        let requested = self.config.stream_metadata();

        let actual = self
            .source
            .open(&requested)
            .map_err(|e| PipelineError::acquisition(ResourceKind::FrameSource, e))?;
        self.acquired.push(ResourceKind::FrameSource);
        if (actual.width, actual.height) != (requested.width, requested.height) {
            log::warn!(
                "Source delivers {}x{}, output is fixed at {}x{}",
                actual.width,
                actual.height,
                requested.width,
                requested.height
            );
        }

        self.event_log
            .open(&self.config.log_path)
            .map_err(|e| PipelineError::acquisition(ResourceKind::EventLog, e))?;
        self.acquired.push(ResourceKind::EventLog);

        self.sink
            .open(&self.config.video_path, &requested)
            .map_err(|e| PipelineError::acquisition(ResourceKind::VideoSink, e))?;
        self.acquired.push(ResourceKind::VideoSink);

        self.logger.info(&format!(
            "Recording {}x{} @ {} fps to {}, events to {}",
            requested.width,
            requested.height,
            self.config.fps,
            self.config.video_path.display(),
            self.config.log_path.display()
        ));
        Ok(())
    }

    /// Closes one resource. Called only for kinds popped off the stack.
    fn close(&mut self, kind: ResourceKind) -> Result<(), Box<dyn std::error::Error>> {
        match kind {
            ResourceKind::FrameSource => self.source.close(),
            ResourceKind::EventLog => self.event_log.close(),
            ResourceKind::VideoSink => self.sink.close(),
        }
    }

    /// Releases everything in reverse acquisition order. Every resource is
    /// closed even if an earlier close fails; the first failure is returned.
    fn release_all(&mut self) -> Result<(), PipelineError> {
        let mut first_error = None;
        while let Some(kind) = self.acquired.pop() {
            if let Err(e) = self.close(kind) {
                log::error!("Failed to release {kind}: {e}");
                first_error.get_or_insert(PipelineError::io(kind, e));
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Release path when an error is already being reported; release
    /// failures are only logged.
    fn release_after_failure(&mut self) {
        while let Some(kind) = self.acquired.pop() {
            if let Err(e) = self.close(kind) {
                log::warn!("Failed to release {kind} after error: {e}");
            }
        }
    }

    fn run_ticks(&mut self, summary: &mut RunSummary) -> Result<StopReason, PipelineError> {
        loop {
            if self.stop.is_requested() {
                return Ok(StopReason::StopRequested);
            }
            let frame = match self.source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => return Ok(StopReason::EndOfStream),
                Err(e) => return Err(source_failure(e)),
            };
            summary.ticks += 1;
            if self.tick(frame, summary)? == PreviewControl::Stop {
                return Ok(StopReason::PreviewClosed);
            }
            self.logger.tick(summary.ticks);
        }
    }

    fn tick(
        &mut self,
        frame: Frame,
        summary: &mut RunSummary,
    ) -> Result<PreviewControl, PipelineError> {
        let captured_at = self.clock.now();
        let stamp = format_timestamp(&captured_at);
        let index = frame.index();

        let started = Instant::now();
        let gray = normalize(&frame);
        self.logger.timing("normalize", elapsed_ms(started));

        let started = Instant::now();
        let detections = match detect_faces_and_eyes(
            self.face_detector.as_mut(),
            self.eye_detector.as_mut(),
            &gray,
        ) {
            Ok(detections) => detections,
            Err(e) => {
                let error = TransientDetectionError::new(index, e);
                log::warn!("{error}; saving the frame without outlines");
                summary.dropped_annotations += 1;
                Vec::new()
            }
        };
        self.logger.timing("detect", elapsed_ms(started));
        self.logger.metric("faces", detections.len() as f64);

        let started = Instant::now();
        let annotated = self.annotator.annotate(frame, &detections, &stamp);
        self.logger.timing("annotate", elapsed_ms(started));

        let events = DetectionEvent::from_detections(
            &detections,
            captured_at,
            self.config.unmatched_face_policy,
        );
        let log_io = |e| PipelineError::io(ResourceKind::EventLog, e);
        for event in &events {
            self.event_log.append(event).map_err(log_io)?;
        }
        self.event_log.flush().map_err(log_io)?;
        summary.events_logged += events.len();

        let started = Instant::now();
        self.sink
            .write(&annotated)
            .map_err(|e| PipelineError::io(ResourceKind::VideoSink, e))?;
        summary.frames_written += 1;
        self.logger.timing("encode", elapsed_ms(started));

        match self.display.show(&annotated) {
            Ok(control) => Ok(control),
            Err(e) => {
                log::warn!("Frame {index}: preview failed: {e}");
                Ok(PreviewControl::Continue)
            }
        }
    }
}

impl Drop for PipelineLoop {
    fn drop(&mut self) {
        if !self.acquired.is_empty() {
            log::warn!("Pipeline dropped while running; releasing resources");
            self.release_after_failure();
        }
    }
}

fn source_failure(error: Box<dyn std::error::Error>) -> PipelineError {
    if let Some(timeout) = error.downcast_ref::<FrameTimeout>() {
        return PipelineError::SourceTimeout {
            timeout: timeout.waited,
        };
    }
    PipelineError::io(ResourceKind::FrameSource, error)
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}
