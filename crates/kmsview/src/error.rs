use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Setup failures. Both variants are fatal to opening a display.
#[derive(Debug, Error)]
pub enum DisplayError {
    #[error("{}: {reason}", describe_path(.path))]
    Unavailable {
        path: Option<PathBuf>,
        reason: String,
    },

    #[error("{}: {reason}", .path.display())]
    Configuration { path: PathBuf, reason: String },

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn describe_path(path: &Option<PathBuf>) -> String {
    match path {
        Some(path) => path.display().to_string(),
        None => "DRM".to_string(),
    }
}

impl DisplayError {
    pub fn unavailable(path: Option<PathBuf>, reason: impl Into<String>) -> Self {
        DisplayError::Unavailable {
            path,
            reason: reason.into(),
        }
    }

    pub fn configuration(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        DisplayError::Configuration {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Mode and output selection failures, before a device path is attached.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("Cannot find an active connector")]
    NoConnector,

    #[error("Mode index {index} out of range ({count} modes available)")]
    IndexOutOfRange { index: usize, count: usize },

    #[error("Mode index {index} ({width}x{height}) exceeds the maximum size {max_width}x{max_height}")]
    IndexExceedsMaximum {
        index: usize,
        width: u16,
        height: u16,
        max_width: u16,
        max_height: u16,
    },

    #[error("No mode matches the requested constraints")]
    NoModeMatches,

    #[error("Cannot find active connection encoder")]
    NoEncoder,

    #[error("Encoder {0} is not attached to a CRTC")]
    NoCrtc(u32),
}

/// Per-frame failure to turn a producer buffer into a framebuffer.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("buffer object import failed: {0}")]
    Allocator(#[source] io::Error),

    #[error("framebuffer creation failed: {0}")]
    Framebuffer(#[source] io::Error),

    #[error("kernel returned framebuffer id 0")]
    InvalidFramebuffer,

    #[error("unsupported pixel format {0:#010x}")]
    UnsupportedFormat(u32),

    #[error("invalid buffer descriptor: {0}")]
    InvalidDescriptor(String),
}

/// Per-frame failure to put a framebuffer on screen.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("a page flip is already in flight")]
    Busy,

    #[error("mode set failed: {0}")]
    ModeSet(#[source] io::Error),

    #[error("page flip failed: {0}")]
    PageFlip(#[source] io::Error),

    #[error("no framebuffer for the committed resource")]
    UnknownResource,
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error(transparent)]
    Import(#[from] ImportError),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}

impl FrameError {
    /// Only a failed mode set leaves nothing on screen to recover to. Every
    /// other failure drops the frame and the producer renders the next one.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FrameError::Schedule(ScheduleError::ModeSet(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_error_messages_carry_path() {
        let err = DisplayError::configuration("/dev/dri/card1", "Cannot find an active connector");
        assert_eq!(
            err.to_string(),
            "/dev/dri/card1: Cannot find an active connector"
        );

        let err = DisplayError::unavailable(None, "no device");
        assert_eq!(err.to_string(), "DRM: no device");
    }

    #[test]
    fn test_frame_error_from() {
        let err: FrameError = ScheduleError::Busy.into();
        assert!(matches!(err, FrameError::Schedule(ScheduleError::Busy)));

        let err: FrameError = ImportError::InvalidFramebuffer.into();
        assert_eq!(err.to_string(), "kernel returned framebuffer id 0");
    }

    #[test]
    fn test_only_mode_set_failure_is_fatal() {
        let mode_set: FrameError = ScheduleError::ModeSet(io::Error::other("EINVAL")).into();
        assert!(mode_set.is_fatal());

        let page_flip: FrameError = ScheduleError::PageFlip(io::Error::other("EBUSY")).into();
        assert!(!page_flip.is_fatal());
        assert!(!FrameError::from(ScheduleError::Busy).is_fatal());
        assert!(!FrameError::from(ImportError::InvalidFramebuffer).is_fatal());
    }
}
