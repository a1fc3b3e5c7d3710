//! Crate-wide error types.

use thiserror::Error;

use std::fmt;

pub type ProflowResult<T> = Result<T, ProflowError>;

#[derive(Debug, Error)]
pub enum ProflowError {
    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("build failed: {0}")]
    Build(StageFailure),

    #[error("profiler failed: {0}")]
    Profiler(StageFailure),

    #[error("transform failed: {0}")]
    Transform(StageFailure),
}

impl ProflowError {
    /// Wraps a stage failure in the variant matching the stage's kind.
    pub fn stage(failure: StageFailure) -> Self {
        match failure.stage.kind() {
            FailureKind::Build => Self::Build(failure),
            FailureKind::Profiler => Self::Profiler(failure),
            FailureKind::Transform => Self::Transform(failure),
        }
    }

    pub fn stage_failure(&self) -> Option<&StageFailure> {
        match self {
            Self::Build(f) | Self::Profiler(f) | Self::Transform(f) => Some(f),
            _ => None,
        }
    }

    /// Process exit status for this error. Subprocess failures propagate the
    /// child's status.
    pub fn exit_code(&self) -> i32 {
        match self.stage_failure() {
            Some(f) => f.exit.exit_code(),
            None => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Build,
    Profiler,
    Transform,
}

/// One external-tool invocation inside a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Build,
    Record,
    ReadTrace,
    Fold,
    Render,
    Instrument,
    Annotate,
}

impl Stage {
    pub fn kind(self) -> FailureKind {
        match self {
            Self::Build => FailureKind::Build,
            Self::Record | Self::Instrument => FailureKind::Profiler,
            Self::ReadTrace | Self::Fold | Self::Render | Self::Annotate => FailureKind::Transform,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Build => "build",
            Self::Record => "record",
            Self::ReadTrace => "read-trace",
            Self::Fold => "fold",
            Self::Render => "render",
            Self::Instrument => "instrument",
            Self::Annotate => "annotate",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageExit {
    Code(i32),
    Signal(i32),
    Interrupted,
    Launch(String),
}

impl StageExit {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Code(0) => 1,
            Self::Code(code) => *code,
            Self::Signal(sig) => 128 + sig,
            Self::Interrupted => 130,
            Self::Launch(_) => 127,
        }
    }
}

impl fmt::Display for StageExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code(code) => write!(f, "exited with status {code}"),
            Self::Signal(sig) => write!(f, "terminated by signal {sig}"),
            Self::Interrupted => f.write_str("interrupted"),
            Self::Launch(reason) => write!(f, "could not be started: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageFailure {
    pub stage: Stage,
    pub tool: String,
    pub exit: StageExit,
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} stage: {} {}", self.stage, self.tool, self.exit)
    }
}
