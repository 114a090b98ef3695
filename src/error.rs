use std::path::PathBuf;

use thiserror::Error;

/// Faults of the elevated command session. Never crosses `CommandChannel::execute`;
/// callers only ever see `None`.
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("failed to spawn elevated shell '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("elevated shell command line is empty")]
    NoProgram,

    #[error("failed to capture {0} of elevated shell")]
    MissingPipe(&'static str),

    #[error("write to elevated shell failed: {0}")]
    Write(#[source] std::io::Error),

    #[error("elevated shell closed its output before the end marker")]
    SessionDied,

    #[error("no end marker within {0:?}")]
    Timeout(std::time::Duration),

    #[error("command channel is closed")]
    Closed,
}

/// Why a launch request did not reach the platform.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LaunchError {
    #[error("External display not connected.")]
    NotConnected,

    #[error("'{0}' is not a valid package name")]
    InvalidPackage(String),

    #[error("Could not resolve activity for {0}")]
    ResolutionFailed(String),

    #[error("Could not start {0}: privileged command failed")]
    Channel(String),
}

/// Failures of the overlay window group.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OverlayError {
    #[error("display {0} is the primary display")]
    PrimaryDisplay(u32),

    #[error("display {0} is not available")]
    DisplayUnavailable(u32),

    #[error("attaching overlay to display {display_id} failed: {reason}")]
    AttachFailed { display_id: u32, reason: String },

    #[error("window operation failed: {0}")]
    Window(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
