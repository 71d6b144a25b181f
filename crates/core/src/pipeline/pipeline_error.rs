use std::fmt;
use std::time::Duration;

/// Resources the pipeline acquires at start and must release at the end.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    FrameSource,
    EventLog,
    VideoSink,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResourceKind::FrameSource => "frame source",
            ResourceKind::EventLog => "event log",
            ResourceKind::VideoSink => "video sink",
        })
    }
}

type Source = Box<dyn std::error::Error + Send + Sync>;

/// Fatal outcomes of a pipeline run.
///
/// Per-frame detection failures never surface here; the loop absorbs them
/// and counts them in the run summary.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("failed to acquire {resource}: {source}")]
    Acquisition {
        resource: ResourceKind,
        #[source]
        source: Source,
    },

    #[error("{resource} I/O failed: {source}")]
    ResourceIo {
        resource: ResourceKind,
        #[source]
        source: Source,
    },

    #[error("frame source delivered nothing for {timeout:?}")]
    SourceTimeout { timeout: Duration },

    #[error("pipeline already ran to completion")]
    AlreadyFinished,
}

impl PipelineError {
    /// The resource the failure is attributed to, if any.
    pub fn resource(&self) -> Option<ResourceKind> {
        match self {
            PipelineError::Acquisition { resource, .. } | PipelineError::ResourceIo { resource, .. } => {
                Some(*resource)
            }
            PipelineError::SourceTimeout { .. } => Some(ResourceKind::FrameSource),
            PipelineError::AlreadyFinished => None,
        }
    }

    /// Process exit status for this failure: 2 when a resource could not be
    /// acquired, 3 when one failed mid-run, 1 for misuse.
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Acquisition { .. } => 2,
            PipelineError::ResourceIo { .. } | PipelineError::SourceTimeout { .. } => 3,
            PipelineError::AlreadyFinished => 1,
        }
    }

    pub(crate) fn acquisition(resource: ResourceKind, source: Box<dyn std::error::Error>) -> Self {
        PipelineError::Acquisition {
            resource,
            source: detach(source),
        }
    }

    pub(crate) fn io(resource: ResourceKind, source: Box<dyn std::error::Error>) -> Self {
        PipelineError::ResourceIo {
            resource,
            source: detach(source),
        }
    }
}

/// Detection failed on a single frame. Never fatal: the frame is still
/// persisted, only without outlines.
#[derive(Debug, thiserror::Error)]
#[error("detection failed on frame {frame}: {source}")]
pub struct TransientDetectionError {
    pub frame: usize,
    #[source]
    pub source: Source,
}

impl TransientDetectionError {
    pub(crate) fn new(frame: usize, source: Box<dyn std::error::Error>) -> Self {
        Self {
            frame,
            source: detach(source),
        }
    }
}

/// Collaborator ports return plain `Box<dyn Error>`; keep the message so
/// the pipeline error stays `Send + Sync`.
fn detach(error: Box<dyn std::error::Error>) -> Source {
    error.to_string().into()
}
