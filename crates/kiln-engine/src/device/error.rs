use std::path::PathBuf;

use thiserror::Error;

/// High-level response after a surface or frame error.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SurfaceErrorAction {
    /// Surface was reconfigured; rendering may resume next frame.
    Reconfigured,
    /// Transient error; skip the current frame.
    SkipFrame,
    /// Fatal error (commonly OOM); terminate gracefully.
    Fatal,
}

/// Failure of a single backend primitive.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("out of device memory")]
    OutOfMemory,

    #[error("unknown or released {kind} handle")]
    InvalidHandle { kind: &'static str },

    #[error("surface unavailable: {reason}")]
    Surface {
        action: SurfaceErrorAction,
        reason: String,
    },

    #[error("unsupported by the {backend} backend: {what}")]
    Unsupported { backend: &'static str, what: String },

    #[error("shader `{label}` failed to compile: {message}")]
    Shader { label: String, message: String },

    #[error("pipeline `{label}` failed to build: {message}")]
    Pipeline { label: String, message: String },

    #[error("{0}")]
    Platform(String),
}

impl BackendError {
    pub(crate) fn invalid(kind: &'static str) -> Self {
        Self::InvalidHandle { kind }
    }
}

/// Failure to create a GPU resource through the uploader or a render object.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("cannot create `{0}` from empty data")]
    EmptyData(&'static str),

    #[error("failed to allocate `{what}`")]
    Allocation {
        what: &'static str,
        #[source]
        source: BackendError,
    },

    #[error("failed to transfer `{what}` to the device")]
    Transfer {
        what: &'static str,
        #[source]
        source: BackendError,
    },

    #[error("failed to read `{}`", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode image")]
    Decode(#[from] image::ImageError),

    #[error("failed to load shader `{}`", path.display())]
    Shader {
        path: PathBuf,
        #[source]
        source: BackendError,
    },

    #[error("failed to build pipeline `{label}`")]
    Pipeline {
        label: &'static str,
        #[source]
        source: BackendError,
    },

    #[error("render object was already destroyed")]
    Destroyed,

    #[error("render object belongs to another device")]
    DeviceMismatch,

    #[error("device has been shut down")]
    TornDown,
}

/// Failure to open or close a frame.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("failed to acquire command buffer")]
    CommandBuffer(#[source] BackendError),

    #[error("failed to acquire swapchain texture")]
    Swapchain(#[source] BackendError),

    #[error("failed to begin render pass")]
    RenderPass(#[source] BackendError),

    #[error("failed to submit frame")]
    Submit(#[source] BackendError),

    #[error("a frame is already in flight")]
    FrameInFlight,

    #[error("device has been shut down")]
    TornDown,
}

impl FrameError {
    /// Converts the error into what the frame loop should do next.
    pub fn action(&self) -> SurfaceErrorAction {
        let source = match self {
            FrameError::TornDown => return SurfaceErrorAction::Fatal,
            FrameError::FrameInFlight => return SurfaceErrorAction::SkipFrame,
            FrameError::CommandBuffer(e)
            | FrameError::Swapchain(e)
            | FrameError::RenderPass(e)
            | FrameError::Submit(e) => e,
        };

        match source {
            BackendError::Surface { action, .. } => *action,
            BackendError::OutOfMemory => SurfaceErrorAction::Fatal,
            _ => SurfaceErrorAction::SkipFrame,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_error_actions() {
        let lost = FrameError::Swapchain(BackendError::Surface {
            action: SurfaceErrorAction::Reconfigured,
            reason: "lost".into(),
        });
        assert_eq!(lost.action(), SurfaceErrorAction::Reconfigured);

        let oom = FrameError::CommandBuffer(BackendError::OutOfMemory);
        assert_eq!(oom.action(), SurfaceErrorAction::Fatal);

        assert_eq!(FrameError::TornDown.action(), SurfaceErrorAction::Fatal);
        assert_eq!(FrameError::FrameInFlight.action(), SurfaceErrorAction::SkipFrame);
        assert_eq!(
            FrameError::RenderPass(BackendError::Platform("x".into())).action(),
            SurfaceErrorAction::SkipFrame
        );
    }
}
